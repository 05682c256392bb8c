// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Printer facade: bind a connection to a typed printer capability.
//
// Language detection probes the device through the command channel; an
// explicit language skips the probe entirely and the caller asserts
// correctness.  Once bound, the language is immutable for the handle's
// lifetime — re-detection means a fresh handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use labelwire_core::error::{LabelwireError, Result};
use labelwire_core::types::{CommandLanguage, PrinterStatus};

use crate::channel;
use crate::transport::Connection;

/// Settings key the vendor exposes the dialect under.
const LANGUAGE_KEY: &str = "device.languages";

/// Settings key for the coarse device condition on non-ZPL dialects.
const STATUS_KEY: &str = "device.status";

/// ZPL host-status query.
const HOST_STATUS_QUERY: &str = "~HS";

/// Status strings `~HS` answers with; both are needed for the flags.
/// Devices often write each one separately, so the exchange must not
/// stop at the first.
const HOST_STATUS_STRINGS: usize = 2;

/// Probe the device for the command language it speaks.
///
/// A non-responsive or unrecognized device yields `Unknown` — a valid
/// terminal value, never an error — so callers can fall back to a default
/// dialect.
#[instrument(skip(conn), fields(conn = %conn.id()))]
pub async fn detect_language(conn: &Connection, timeout: Duration) -> CommandLanguage {
    match channel::get_setting(LANGUAGE_KEY, conn, timeout).await {
        Ok(report) => {
            let language = CommandLanguage::from_device_report(&report);
            debug!(%report, %language, "language probe answered");
            language
        }
        Err(e) => {
            warn!(error = %e, "language probe failed, falling back to unknown");
            CommandLanguage::Unknown
        }
    }
}

/// A capability handle bound to exactly one connection and one language.
///
/// Invalid once the underlying connection is closed: every operation then
/// fails with `Disconnected`.
pub struct PrinterHandle {
    connection: Arc<Connection>,
    language: CommandLanguage,
    /// Bound on the status exchange round trip.
    status_timeout: Duration,
}

impl PrinterHandle {
    /// Detect the language, then bind.  One probe per call.
    pub async fn detect_and_bind(connection: Arc<Connection>, timeout: Duration) -> Self {
        let language = detect_language(&connection, timeout).await;
        Self::bind(connection, language, timeout)
    }

    /// Bind with an explicitly chosen language.  Never probes; an
    /// incorrect choice is not detected here and surfaces later as
    /// malformed-command errors on the device.
    pub fn bind(
        connection: Arc<Connection>,
        language: CommandLanguage,
        status_timeout: Duration,
    ) -> Self {
        debug!(conn = %connection.id(), %language, "printer handle bound");
        Self {
            connection,
            language,
            status_timeout,
        }
    }

    pub fn language(&self) -> CommandLanguage {
        self.language
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Send a print-ready command stream to the device.
    pub async fn print(&self, data: &[u8]) -> Result<()> {
        if !self.connection.is_open().await {
            return Err(LabelwireError::Disconnected);
        }
        if self.connection.send(data).await {
            Ok(())
        } else {
            Err(LabelwireError::Disconnected)
        }
    }

    /// Query the coarse device condition.
    ///
    /// ZPL devices answer the `~HS` host status; other dialects are asked
    /// for `device.status`.  A device that does not answer reports the
    /// not-ready default rather than an error.
    #[instrument(skip(self), fields(conn = %self.connection.id(), language = %self.language))]
    pub async fn status(&self) -> Result<PrinterStatus> {
        if !self.connection.is_open().await {
            return Err(LabelwireError::Disconnected);
        }

        let status = match self.language {
            CommandLanguage::Zpl => {
                match channel::send_and_read_frames(
                    HOST_STATUS_QUERY,
                    &self.connection,
                    self.status_timeout,
                    HOST_STATUS_STRINGS,
                )
                .await
                {
                    Ok(reply) => parse_host_status(&reply),
                    Err(LabelwireError::Disconnected) => return Err(LabelwireError::Disconnected),
                    Err(_) => PrinterStatus::unresponsive(),
                }
            }
            CommandLanguage::Cpcl | CommandLanguage::Unknown => {
                match channel::get_setting(STATUS_KEY, &self.connection, self.status_timeout).await
                {
                    Ok(reply) => PrinterStatus {
                        is_ready: reply.eq_ignore_ascii_case("ready"),
                        is_paused: reply.eq_ignore_ascii_case("paused"),
                        is_paper_out: reply.eq_ignore_ascii_case("paper out"),
                        is_head_open: reply.eq_ignore_ascii_case("head open"),
                    },
                    Err(LabelwireError::Disconnected) => return Err(LabelwireError::Disconnected),
                    Err(_) => PrinterStatus::unresponsive(),
                }
            }
        };
        Ok(status)
    }
}

impl std::fmt::Debug for PrinterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterHandle")
            .field("connection", &self.connection.id())
            .field("language", &self.language)
            .finish()
    }
}

/// Parse the two `~HS` status strings into coarse flags.
///
/// Each string is STX-framed and comma-separated.  Within the first
/// string, field 2 is the paper-out flag and field 3 the pause flag;
/// within the second, field 3 is the head-open flag.
fn parse_host_status(reply: &str) -> PrinterStatus {
    let lines: Vec<Vec<&str>> = reply
        .lines()
        .map(|l| l.trim_matches(['\u{2}', '\u{3}', '\r', ' ']).split(',').collect())
        .collect();

    let flag = |line: usize, field: usize| -> bool {
        lines
            .get(line)
            .and_then(|f| f.get(field))
            .map(|v| *v == "1")
            .unwrap_or(false)
    };

    let is_paper_out = flag(0, 1);
    let is_paused = flag(0, 2);
    let is_head_open = flag(1, 2);
    PrinterStatus {
        is_ready: !is_paper_out && !is_paused && !is_head_open,
        is_paused,
        is_paper_out,
        is_head_open,
    }
}

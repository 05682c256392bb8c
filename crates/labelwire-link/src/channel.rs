// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The command channel: a synchronous request/response primitive layered
// over a byte-stream connection, and the settings operations built on it.
//
// The stream has no inherent message framing.  Settings-style replies are
// double-quoted tokens (`"ready"`), complete at the closing quote; other
// line replies complete at CR/LF or ETX.  Status replies are a known
// count of STX/ETX control strings and are only complete once every
// string has arrived, even when the device writes them one at a time.
// A read that never reaches the boundary before the deadline is a
// timeout, never a partial success.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use labelwire_core::error::{LabelwireError, Result};
use labelwire_core::types::ConnectionState;

use crate::transport::{Connection, ConnectionIo};

/// Read buffer granularity for responses.
const READ_CHUNK: usize = 256;

/// ETX, terminating each control-framed status string.
const ETX: u8 = 0x03;

/// How long to wait for stale input before deciding the stream is quiet.
const DRAIN_WINDOW: Duration = Duration::from_millis(1);

/// How a reply is delimited on the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ReplyFraming {
    /// A quoted settings token, or a single terminated line.
    Line,
    /// A fixed number of STX/ETX-framed control strings.
    ControlFrames(usize),
}

/// Write `command` and block until a complete reply arrives or `timeout`
/// elapses.  The per-connection exchange lock is held for the whole round
/// trip, so overlapping callers are serialized rather than interleaved.
///
/// On timeout the connection stays open and the caller decides whether to
/// retry or disconnect.  A peer hang-up mid-read surfaces as
/// `Disconnected` and marks the connection broken.
#[instrument(skip(conn), fields(conn = %conn.id(), len = command.len()))]
pub async fn send_and_read_response(
    command: &str,
    conn: &Connection,
    timeout: Duration,
) -> Result<String> {
    exchange(command, conn, timeout, ReplyFraming::Line).await
}

/// Exchange whose reply is a fixed count of ETX-terminated control
/// strings (the ZPL host-status shape).  The reply is complete only once
/// every expected string has its terminator, however the device chunks
/// its writes.
pub(crate) async fn send_and_read_frames(
    command: &str,
    conn: &Connection,
    timeout: Duration,
    frames: usize,
) -> Result<String> {
    exchange(command, conn, timeout, ReplyFraming::ControlFrames(frames)).await
}

async fn exchange(
    command: &str,
    conn: &Connection,
    timeout: Duration,
    framing: ReplyFraming,
) -> Result<String> {
    let mut io = conn.exchange_lock().await;
    drain_stale_input(&mut io).await;
    io.write_all(command.as_bytes()).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut response: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            debug!(partial = response.len(), "response deadline reached");
            return Err(LabelwireError::Timeout);
        }

        let stream = io.stream.as_mut().ok_or(LabelwireError::Disconnected)?;
        match tokio::time::timeout(remaining, stream.read(&mut chunk)).await {
            Err(_) => {
                debug!(partial = response.len(), "response deadline reached");
                return Err(LabelwireError::Timeout);
            }
            Ok(Err(e)) => {
                io.state = ConnectionState::Broken;
                warn!(error = %e, "response read failed");
                return Err(LabelwireError::Io(e));
            }
            Ok(Ok(0)) => {
                io.state = ConnectionState::Broken;
                return Err(LabelwireError::Disconnected);
            }
            Ok(Ok(n)) => {
                response.extend_from_slice(&chunk[..n]);
                if response_complete(&response, framing) {
                    let text = String::from_utf8_lossy(&response).trim().to_owned();
                    debug!(len = text.len(), "response complete");
                    return Ok(text);
                }
            }
        }
    }
}

/// Query one device-resident setting.
///
/// Keys follow the printer configuration-language naming convention
/// (`device.languages`, `media.type`, …) and are validated locally before
/// any I/O.  The value is returned unquoted, as reported by the device.
#[instrument(skip(conn), fields(conn = %conn.id()))]
pub async fn get_setting(key: &str, conn: &Connection, timeout: Duration) -> Result<String> {
    validate_key(key)?;
    let reply = send_and_read_response(&getvar_command(key), conn, timeout).await?;
    Ok(unquote(&reply))
}

/// Mutate one device-resident setting.  The device is not read back;
/// `Ok(true)` means the transport accepted the full command, `Ok(false)`
/// that the write failed.  No local persistence — every call round-trips
/// to the device.
#[instrument(skip(conn), fields(conn = %conn.id()))]
pub async fn set_setting(key: &str, value: &str, conn: &Connection) -> Result<bool> {
    validate_key(key)?;
    if value.contains('"') {
        return Err(LabelwireError::InvalidArgument(format!(
            "setting value must not contain quotes: '{value}'"
        )));
    }

    let mut io = conn.exchange_lock().await;
    match io.write_all(setvar_command(key, value).as_bytes()).await {
        Ok(()) => Ok(true),
        Err(LabelwireError::Disconnected) => Err(LabelwireError::Disconnected),
        Err(e) => {
            warn!(key, error = %e, "setvar write failed");
            Ok(false)
        }
    }
}

/// Discard bytes left over from an earlier exchange, such as trailing
/// status strings nobody consumed, so they cannot masquerade as the
/// reply to the command about to be written.
async fn drain_stale_input(io: &mut ConnectionIo) {
    let Some(stream) = io.stream.as_mut() else {
        return;
    };
    let mut scratch = [0u8; READ_CHUNK];
    while let Ok(Ok(n)) = tokio::time::timeout(DRAIN_WINDOW, stream.read(&mut scratch)).await {
        if n == 0 {
            return;
        }
        debug!(discarded = n, "dropped stale bytes before exchange");
    }
}

/// Whether the accumulated bytes form a complete reply.
fn response_complete(buf: &[u8], framing: ReplyFraming) -> bool {
    if let ReplyFraming::ControlFrames(frames) = framing {
        return buf.iter().filter(|&&b| b == ETX).count() >= frames;
    }
    let trimmed = trim_start(buf);
    match trimmed.first().copied() {
        None => false,
        // Quoted settings token: complete at the closing quote.
        Some(b'"') => trimmed[1..].contains(&b'"'),
        // Anything else: a terminated line.
        Some(_) => buf.ends_with(b"\n") || buf.ends_with(b"\r") || buf.ends_with(&[ETX]),
    }
}

fn trim_start(buf: &[u8]) -> &[u8] {
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    &buf[start..]
}

/// Reject malformed settings keys before any I/O.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('"') || key.chars().any(char::is_whitespace) {
        return Err(LabelwireError::InvalidArgument(format!(
            "malformed setting key '{key}'"
        )));
    }
    Ok(())
}

/// The vendor getvar template.
fn getvar_command(key: &str) -> String {
    format!("! U1 getvar \"{key}\"\r\n")
}

/// The vendor setvar template.
fn setvar_command(key: &str, value: &str) -> String {
    format!("! U1 setvar \"{key}\" \"{value}\"\r\n")
}

fn unquote(reply: &str) -> String {
    reply.trim().trim_matches('"').to_owned()
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The connectivity service: single entry point composing discovery,
// transport connections, the command channel, and the printer facade.
//
// Everything here is a thin delegation layer — the service owns the
// config, one discovery session per transport, and the wireless
// collaborator seams, and otherwise hands work to the modules below it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use labelwire_core::config::LinkConfig;
use labelwire_core::error::{LabelwireError, Result};
use labelwire_core::types::{CommandLanguage, DiscoveredDevice, TransportKind};

use crate::channel;
use crate::discovery::{
    DiscoverySession, PairedDeviceSource, PairedEnumerationBackend, UdpProbeBackend,
};
use crate::printer::{self, PrinterHandle};
use crate::transport::{Connection, WirelessBackend};

/// Transport-agnostic entry point for printer connectivity.
///
/// The wireless transport and the paired-device registry are optional
/// collaborators; without them, wireless discovery reports an error
/// through the callback and wireless connects fail with `ConnectFailed`.
pub struct ConnectivityService {
    config: LinkConfig,
    network_scan: Mutex<DiscoverySession>,
    wireless_scan: Mutex<DiscoverySession>,
    wireless_backend: Option<Arc<dyn WirelessBackend>>,
    paired_source: Option<Arc<dyn PairedDeviceSource>>,
}

impl ConnectivityService {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            network_scan: Mutex::new(DiscoverySession::new()),
            wireless_scan: Mutex::new(DiscoverySession::new()),
            wireless_backend: None,
            paired_source: None,
        }
    }

    /// Register the pairing-transport collaborators.
    pub fn with_wireless(
        mut self,
        backend: Arc<dyn WirelessBackend>,
        paired: Arc<dyn PairedDeviceSource>,
    ) -> Self {
        self.wireless_backend = Some(backend);
        self.paired_source = Some(paired);
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // -- discovery ----------------------------------------------------------

    /// Scan the local network for printers.  Non-blocking; exactly one of
    /// the callbacks fires unless the scan is stopped first.  A start
    /// while a network scan is in flight replaces it.
    pub fn start_network_discovery<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<DiscoveredDevice>) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        info!("starting network discovery");
        self.network_scan.lock().expect("scan lock poisoned").start(
            UdpProbeBackend::new(&self.config),
            on_success,
            on_error,
        );
    }

    /// Enumerate paired wireless printers.  Same callback contract as the
    /// network scan; the two transports are independent and unordered
    /// relative to each other.
    pub fn start_wireless_discovery<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<DiscoveredDevice>) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let Some(source) = self.paired_source.clone() else {
            on_error("no wireless transport registered".into());
            return;
        };
        info!("starting wireless discovery");
        self.wireless_scan
            .lock()
            .expect("scan lock poisoned")
            .start(PairedEnumerationBackend::new(source), on_success, on_error);
    }

    /// Cancel any in-flight scan on either transport.  Idempotent; a
    /// cancelled scan never fires its callbacks.
    pub fn stop_discovery(&self) {
        self.network_scan.lock().expect("scan lock poisoned").stop();
        self.wireless_scan.lock().expect("scan lock poisoned").stop();
    }

    // -- connection lifecycle ------------------------------------------------

    /// Open a session to `address` over the given transport.
    pub async fn connect(&self, address: &str, kind: TransportKind) -> Result<Arc<Connection>> {
        let conn = match kind {
            TransportKind::Network => Connection::open_network(address, &self.config).await?,
            TransportKind::Wireless => {
                let backend = self.wireless_backend.as_deref().ok_or_else(|| {
                    LabelwireError::ConnectFailed("no wireless transport registered".into())
                })?;
                Connection::open_wireless(address, backend).await?
            }
        };
        Ok(Arc::new(conn))
    }

    /// Close the connection.  Idempotent, always succeeds from the
    /// caller's point of view.
    pub async fn disconnect(&self, conn: &Connection) {
        conn.close().await;
    }

    /// Liveness check that tolerates an absent connection.
    pub async fn is_connected(&self, conn: Option<&Connection>) -> bool {
        match conn {
            Some(conn) => conn.is_open().await,
            None => false,
        }
    }

    /// Push raw print data through unmodified.  `false` on any failure.
    pub async fn send_data(&self, bytes: &[u8], conn: &Connection) -> bool {
        conn.send(bytes).await
    }

    // -- command channel -----------------------------------------------------

    /// One bounded request/response exchange.  See [`channel::send_and_read_response`].
    pub async fn send_and_read_response(
        &self,
        command: &str,
        conn: &Connection,
        timeout: Duration,
    ) -> Result<String> {
        channel::send_and_read_response(command, conn, timeout).await
    }

    pub async fn get_setting(&self, key: &str, conn: &Connection) -> Result<String> {
        channel::get_setting(key, conn, self.config.settings_timeout).await
    }

    pub async fn set_setting(&self, key: &str, value: &str, conn: &Connection) -> Result<bool> {
        channel::set_setting(key, value, conn).await
    }

    // -- printer facade ------------------------------------------------------

    /// Probe the device for its command language.  `Unknown` on an
    /// unrecognized or non-responsive device, never an error.
    pub async fn detect_language(&self, conn: &Connection) -> CommandLanguage {
        printer::detect_language(conn, self.config.settings_timeout).await
    }

    /// Detect the language and bind a printer handle to it.
    pub async fn printer_instance(&self, conn: Arc<Connection>) -> PrinterHandle {
        PrinterHandle::detect_and_bind(conn, self.config.settings_timeout).await
    }

    /// Bind a printer handle with an explicitly chosen language; no probe
    /// is performed and the caller asserts correctness.
    pub fn printer_instance_with_language(
        &self,
        conn: Arc<Connection>,
        language: CommandLanguage,
    ) -> PrinterHandle {
        PrinterHandle::bind(conn, language, self.config.settings_timeout)
    }
}

impl Drop for ConnectivityService {
    fn drop(&mut self) {
        self.stop_discovery();
    }
}

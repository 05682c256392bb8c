// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Printer discovery: one shared session engine, two transport strategies.
//
// The network strategy broadcasts the vendor discovery datagram over UDP
// and collects replies for a bounded window; the wireless strategy
// enumerates already-paired devices through a platform collaborator, so no
// pairing prompts appear at discovery time.  Both report through the same
// contract: exactly one success *or* error callback per start.

use std::collections::HashSet;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use labelwire_core::config::LinkConfig;
use labelwire_core::error::{LabelwireError, Result};
use labelwire_core::types::{DiscoveredDevice, TransportKind};

/// Vendor discovery beacon request, broadcast on UDP 4201.  Devices on the
/// subnet answer with a datagram carrying their system name.
const PROBE_PACKET: &[u8] = b".ZBR;QUERY\r\n";

/// One transport-specific scan strategy.
///
/// `scan` is one-shot: it runs the whole enumeration and resolves with the
/// devices found, in discovery order.  An empty list is a successful scan.
pub trait DiscoveryBackend: Send + 'static {
    fn scan(self) -> impl Future<Output = Result<Vec<DiscoveredDevice>>> + Send;
}

/// Collaborator seam for the pairing transport: the platform layer owns the
/// paired-device registry and surfaces it here on demand.
pub trait PairedDeviceSource: Send + Sync + 'static {
    fn paired_devices(&self) -> Result<Vec<DiscoveredDevice>>;
}

/// An in-flight (or idle) scan on one transport.
///
/// Owned by the connectivity service, one per transport kind, replacing the
/// hidden process-wide scan state the vendor SDK keeps.
pub struct DiscoverySession {
    task: Option<JoinHandle<()>>,
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self { task: None }
    }

    /// Start a scan.  Non-blocking: the backend runs on a spawned task and
    /// exactly one of the two callbacks fires when it resolves — the
    /// success callback with the ordered device list (possibly empty), or
    /// the error callback with a human-readable message.
    ///
    /// Policy for a start while a scan is already in flight: the new scan
    /// **replaces** the old one.  The old task is cancelled and its
    /// callbacks never fire, matching the latest-request-wins behavior a
    /// refresh action expects.
    ///
    /// Callbacks run on a runtime worker, not the caller's context; do not
    /// re-enter discovery APIs assuming same-thread delivery.  Must be
    /// called from within a Tokio runtime.
    pub fn start<B, S, E>(&mut self, backend: B, on_success: S, on_error: E)
    where
        B: DiscoveryBackend,
        S: FnOnce(Vec<DiscoveredDevice>) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        self.stop();
        self.task = Some(tokio::spawn(async move {
            match backend.scan().await {
                Ok(devices) => {
                    info!(count = devices.len(), "discovery scan complete");
                    on_success(devices);
                }
                Err(e) => {
                    warn!(error = %e, "discovery scan failed");
                    on_error(e.to_string());
                }
            }
        }));
    }

    /// Cancel any in-flight scan.  Idempotent; safe when no scan is
    /// active.  A cancelled scan never fires its callbacks — cancellation
    /// takes effect at the scan's next suspension point.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("discovery scan cancelled");
        }
    }

    /// Whether a scan is currently in flight.
    pub fn is_scanning(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Default for DiscoverySession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Network scan: UDP broadcast probe, bounded collection window.
pub struct UdpProbeBackend {
    /// Where the probe is sent.  The subnet broadcast address in
    /// production; tests point it at a local fake device.
    target: SocketAddr,
    window: std::time::Duration,
    /// Port reported in discovered addresses (the raw command channel).
    device_port: u16,
}

impl UdpProbeBackend {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            target: SocketAddr::from((Ipv4Addr::BROADCAST, config.discovery_port)),
            window: config.discovery_window,
            device_port: config.default_network_port,
        }
    }

    /// Point the probe at a specific address instead of the broadcast one.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }
}

impl DiscoveryBackend for UdpProbeBackend {
    async fn scan(self) -> Result<Vec<DiscoveredDevice>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| LabelwireError::Discovery(format!("bind probe socket: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| LabelwireError::Discovery(format!("enable broadcast: {e}")))?;
        socket
            .send_to(PROBE_PACKET, self.target)
            .await
            .map_err(|e| LabelwireError::Discovery(format!("send probe to {}: {e}", self.target)))?;
        debug!(target = %self.target, "discovery probe sent");

        let mut devices = Vec::new();
        let mut seen = HashSet::new();
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Instant::now() + self.window;

        // Collect replies in arrival order until the window closes.
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    return Err(LabelwireError::Discovery(format!("probe recv: {e}")));
                }
                Ok(Ok((len, src))) => {
                    if !seen.insert(src.ip()) {
                        continue;
                    }
                    let address = format!("{}:{}", src.ip(), self.device_port);
                    let mut device = DiscoveredDevice::new(address, TransportKind::Network);
                    if let Some(name) = beacon_system_name(&buf[..len]) {
                        device = device.with_name(name);
                    }
                    debug!(address = %device.address, "printer replied to probe");
                    devices.push(device);
                }
            }
        }

        Ok(devices)
    }
}

/// Wireless scan: surface the platform's paired-device registry.
pub struct PairedEnumerationBackend {
    source: Arc<dyn PairedDeviceSource>,
}

impl PairedEnumerationBackend {
    pub fn new(source: Arc<dyn PairedDeviceSource>) -> Self {
        Self { source }
    }
}

impl DiscoveryBackend for PairedEnumerationBackend {
    async fn scan(self) -> Result<Vec<DiscoveredDevice>> {
        let mut devices = self.source.paired_devices()?;
        // The registry owns the addresses; the transport tag is ours.
        for device in &mut devices {
            device.kind = TransportKind::Wireless;
        }
        Ok(devices)
    }
}

/// Extract the printable system name from a beacon reply, if any.
fn beacon_system_name(payload: &[u8]) -> Option<String> {
    let text = payload.split(|&b| b == 0).next()?;
    let name: String = String::from_utf8_lossy(text)
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let name = name.trim().to_owned();
    if name.is_empty() { None } else { Some(name) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted backend: optional delay, then a fixed outcome.
    struct FakeBackend {
        delay: Duration,
        outcome: Result<Vec<DiscoveredDevice>>,
    }

    impl DiscoveryBackend for FakeBackend {
        async fn scan(self) -> Result<Vec<DiscoveredDevice>> {
            tokio::time::sleep(self.delay).await;
            self.outcome
        }
    }

    fn two_devices() -> Vec<DiscoveredDevice> {
        vec![
            DiscoveredDevice::new("10.0.0.5:9100", TransportKind::Network),
            DiscoveredDevice::new("10.0.0.9:9100", TransportKind::Network),
        ]
    }

    #[tokio::test]
    async fn success_callback_fires_once_in_discovery_order() {
        let results: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&results);

        let mut session = DiscoverySession::new();
        session.start(
            FakeBackend {
                delay: Duration::ZERO,
                outcome: Ok(two_devices()),
            },
            move |devices| {
                captured
                    .lock()
                    .unwrap()
                    .push(devices.into_iter().map(|d| d.address).collect());
            },
            |_| panic!("error callback must not fire on success"),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], vec!["10.0.0.5:9100", "10.0.0.9:9100"]);
        assert!(!session.is_scanning());
    }

    #[tokio::test]
    async fn empty_result_is_a_success() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let mut session = DiscoverySession::new();
        session.start(
            FakeBackend {
                delay: Duration::ZERO,
                outcome: Ok(Vec::new()),
            },
            move |devices| {
                assert!(devices.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| panic!("error callback must not fire"),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_reports_through_error_callback_only() {
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&messages);

        let mut session = DiscoverySession::new();
        session.start(
            FakeBackend {
                delay: Duration::ZERO,
                outcome: Err(LabelwireError::Discovery("no network interface".into())),
            },
            |_| panic!("success callback must not fire on error"),
            move |msg| captured.lock().unwrap().push(msg),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("no network interface"));
    }

    #[tokio::test]
    async fn stop_before_completion_means_no_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let on_success = Arc::clone(&fired);
        let on_error = Arc::clone(&fired);

        let mut session = DiscoverySession::new();
        session.start(
            FakeBackend {
                delay: Duration::from_millis(100),
                outcome: Ok(two_devices()),
            },
            move |_| {
                on_success.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                on_error.fetch_add(1, Ordering::SeqCst);
            },
        );
        session.stop();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!session.is_scanning());

        // Stop with nothing in flight is fine.
        session.stop();
    }

    #[tokio::test]
    async fn restart_replaces_inflight_scan() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&first);
        let second_counter = Arc::clone(&second);

        let mut session = DiscoverySession::new();
        session.start(
            FakeBackend {
                delay: Duration::from_millis(100),
                outcome: Ok(two_devices()),
            },
            move |_| {
                first_counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );
        // Second start while the first is still sleeping: the first scan's
        // callbacks must never fire.
        session.start(
            FakeBackend {
                delay: Duration::ZERO,
                outcome: Ok(Vec::new()),
            },
            move |_| {
                second_counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn udp_probe_collects_beacon_replies() {
        // Fake device: answer the first probe datagram with a named beacon.
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_addr = device.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, src) = device.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], PROBE_PACKET);
            device.send_to(b"DOCK-PRINTER-01\0fw89.1", src).await.unwrap();
        });

        let config = LinkConfig {
            discovery_window: Duration::from_millis(250),
            ..LinkConfig::default()
        };
        let backend = UdpProbeBackend::new(&config).with_target(device_addr);
        let devices = backend.scan().await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "127.0.0.1:6101");
        assert_eq!(devices[0].kind, TransportKind::Network);
        assert_eq!(devices[0].friendly_name.as_deref(), Some("DOCK-PRINTER-01"));
    }

    #[tokio::test]
    async fn paired_enumeration_tags_wireless_kind() {
        struct Registry;
        impl PairedDeviceSource for Registry {
            fn paired_devices(&self) -> Result<Vec<DiscoveredDevice>> {
                // A registry that forgot to tag the transport.
                Ok(vec![
                    DiscoveredDevice::new("AC:3F:A4:00:00:01", TransportKind::Network)
                        .with_name("Belt printer"),
                ])
            }
        }

        let backend = PairedEnumerationBackend::new(Arc::new(Registry));
        let devices = backend.scan().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].kind, TransportKind::Wireless);
        assert_eq!(devices[0].address, "AC:3F:A4:00:00:01");
    }

    #[test]
    fn beacon_name_parsing() {
        assert_eq!(
            beacon_system_name(b"PRINTER-7\0extra").as_deref(),
            Some("PRINTER-7")
        );
        assert_eq!(beacon_system_name(b"\0\0").as_deref(), None);
        assert_eq!(beacon_system_name(b"  \r\n").as_deref(), None);
    }
}

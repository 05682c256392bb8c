// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Core domain types for the Labelwire connectivity layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The link-layer channel a printer is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Local-area network, TCP socket.
    Network,
    /// Short-range wireless pairing (Bluetooth, incl. MFi accessories).
    Wireless,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Wireless => write!(f, "wireless"),
        }
    }
}

/// Lifecycle states of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never opened, or explicitly closed.
    Closed,
    /// Usable byte-stream session.
    Open,
    /// A read or write failed; the session is unusable but not yet closed.
    Broken,
}

/// A printer found by a discovery scan.
///
/// Immutable snapshot — ownership transfers to the caller once delivered.
/// The `address` format is transport-specific: `host:port` (or bare host)
/// for network devices, an opaque pairing identifier for wireless ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub kind: TransportKind,
    pub friendly_name: Option<String>,
    /// When the scan saw this device.
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn new(address: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            address: address.into(),
            kind,
            friendly_name: None,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }
}

/// Printer control-language dialects a device may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandLanguage {
    /// Comtec Printer Control Language (mobile/receipt printers).
    Cpcl,
    /// Zebra Programming Language.
    Zpl,
    /// Detection was inconclusive. A valid terminal value, not an error —
    /// callers fall back to a default dialect.
    Unknown,
}

impl CommandLanguage {
    /// Classify the device's `device.languages` answer.
    ///
    /// Real devices report values like `"zpl"`, `"hybrid_xml_zpl"`,
    /// `"line_print"`, or `"cpcl"`; anything unrecognized maps to `Unknown`.
    pub fn from_device_report(report: &str) -> Self {
        let report = report.trim().trim_matches('"').to_ascii_lowercase();
        if report.contains("zpl") {
            Self::Zpl
        } else if report.contains("cpcl") || report.contains("line_print") {
            Self::Cpcl
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for CommandLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpcl => write!(f, "cpcl"),
            Self::Zpl => write!(f, "zpl"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Coarse device condition reported by the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub is_ready: bool,
    pub is_paused: bool,
    pub is_paper_out: bool,
    pub is_head_open: bool,
}

impl PrinterStatus {
    /// The not-ready default reported for unresponsive devices.
    pub fn unresponsive() -> Self {
        Self {
            is_ready: false,
            is_paused: false,
            is_paper_out: false,
            is_head_open: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_report_classification() {
        assert_eq!(
            CommandLanguage::from_device_report("\"zpl\""),
            CommandLanguage::Zpl
        );
        assert_eq!(
            CommandLanguage::from_device_report("hybrid_xml_zpl"),
            CommandLanguage::Zpl
        );
        assert_eq!(
            CommandLanguage::from_device_report("line_print"),
            CommandLanguage::Cpcl
        );
        assert_eq!(
            CommandLanguage::from_device_report("\"cpcl\""),
            CommandLanguage::Cpcl
        );
        assert_eq!(
            CommandLanguage::from_device_report("epl2"),
            CommandLanguage::Unknown
        );
        assert_eq!(
            CommandLanguage::from_device_report(""),
            CommandLanguage::Unknown
        );
    }

    #[test]
    fn discovered_device_builder() {
        let dev = DiscoveredDevice::new("10.0.0.5:9100", TransportKind::Network)
            .with_name("Dock printer");
        assert_eq!(dev.address, "10.0.0.5:9100");
        assert_eq!(dev.kind, TransportKind::Network);
        assert_eq!(dev.friendly_name.as_deref(), Some("Dock printer"));
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Connectivity configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the connectivity layer.
///
/// The defaults follow the vendor conventions for label printers: the raw
/// command channel listens on 6101 (9100 on generic JetDirect-style
/// devices — explicit ports in an address always win), and discovery
/// replies arrive on UDP 4201.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Port appended to bare-host network addresses.
    pub default_network_port: u16,
    /// UDP port the network discovery probe is broadcast on.
    pub discovery_port: u16,
    /// How long a network scan collects replies before reporting.
    pub discovery_window: Duration,
    /// Upper bound on TCP session establishment.
    pub connect_timeout: Duration,
    /// Default bound for settings exchanges (`get_setting` et al.).
    pub settings_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            default_network_port: 6101,
            discovery_port: 4201,
            discovery_window: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            settings_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_vendor_conventions() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.default_network_port, 6101);
        assert_eq!(cfg.discovery_port, 4201);
        assert_eq!(cfg.settings_timeout, Duration::from_secs(5));
    }
}

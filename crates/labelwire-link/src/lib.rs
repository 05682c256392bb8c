// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Labelwire Link — printer discovery, transport connections, the synchronous
// command/response channel, and the printer facade.  This crate bridges
// between the domain types defined in `labelwire-core` and the actual
// device I/O, behind one transport-agnostic entry point
// (`ConnectivityService`).

pub mod channel;
pub mod discovery;
pub mod printer;
pub mod service;
pub mod transport;

pub use discovery::{
    DiscoveryBackend, DiscoverySession, PairedDeviceSource, PairedEnumerationBackend,
    UdpProbeBackend,
};
pub use printer::PrinterHandle;
pub use service::ConnectivityService;
pub use transport::{BoxFuture, Connection, LinkStream, WirelessBackend};

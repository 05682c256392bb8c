// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Transport connections: one open byte-stream session to a single printer.
//
// The network transport is plain TCP (the raw label-printer channel, port
// 6101 by default).  The wireless transport is supplied by a platform
// collaborator through the `WirelessBackend` trait — this crate never
// contains Bluetooth code itself.  Both end up as the same `Connection`
// type, so everything above this module is transport-agnostic.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use labelwire_core::config::LinkConfig;
use labelwire_core::error::{LabelwireError, Result};
use labelwire_core::types::{ConnectionId, ConnectionState, TransportKind};

/// Write chunk size for raw payloads (progress granularity).
const SEND_CHUNK: usize = 8192;

/// Anything that can carry bytes to a printer.
///
/// TCP supplies `TcpStream`, wireless backends supply their own boxed
/// stream, tests supply `tokio::io::duplex` halves.
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

/// Boxed future used to keep collaborator traits dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Collaborator seam for the short-range pairing transport.
///
/// The platform layer (MFi accessory session, RFCOMM socket, …) implements
/// this and hands back a byte stream for a pairing identifier.  Addresses
/// are opaque to Labelwire and passed through verbatim.
pub trait WirelessBackend: Send + Sync {
    fn open<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Box<dyn LinkStream>>>;
}

/// Stream and liveness state, guarded together so that one command/response
/// exchange holds the stream exclusively from first write to last read.
pub(crate) struct ConnectionIo {
    pub(crate) state: ConnectionState,
    pub(crate) stream: Option<Box<dyn LinkStream>>,
}

impl ConnectionIo {
    /// Write the full buffer, marking the connection broken on failure.
    pub(crate) async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(LabelwireError::Disconnected);
        }
        let stream = self.stream.as_mut().ok_or(LabelwireError::Disconnected)?;
        for chunk in bytes.chunks(SEND_CHUNK) {
            if let Err(e) = stream.write_all(chunk).await {
                self.state = ConnectionState::Broken;
                return Err(LabelwireError::Io(e));
            }
        }
        if let Err(e) = stream.flush().await {
            self.state = ConnectionState::Broken;
            return Err(LabelwireError::Io(e));
        }
        Ok(())
    }
}

/// One open byte-stream session to a single printer over one transport.
///
/// Exclusively owned by whichever component opened it until closed.
/// Closing is idempotent and always safe, including on a connection that
/// has gone broken.  The core does not deduplicate connections per
/// (address, transport) pair — that is the caller's contract.
pub struct Connection {
    id: ConnectionId,
    kind: TransportKind,
    remote: String,
    io: Mutex<ConnectionIo>,
}

impl Connection {
    /// Open a TCP session to a network printer.
    ///
    /// `address` is `host:port` or a bare host, in which case the
    /// configured default port is appended.  Malformed addresses are
    /// rejected before any I/O; unreachable hosts and connect timeouts
    /// surface as `ConnectFailed`.
    pub async fn open_network(address: &str, config: &LinkConfig) -> Result<Self> {
        let addr = normalize_network_address(address, config.default_network_port)?;

        debug!(addr = %addr, "opening TCP connection");
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                LabelwireError::ConnectFailed(format!(
                    "connect to {addr} timed out after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| LabelwireError::ConnectFailed(format!("connect to {addr}: {e}")))?;

        let conn = Self::from_stream(TransportKind::Network, addr, Box::new(stream));
        info!(id = %conn.id, remote = %conn.remote, "network connection open");
        Ok(conn)
    }

    /// Open a session over the pairing transport via the given backend.
    pub async fn open_wireless(address: &str, backend: &dyn WirelessBackend) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(LabelwireError::InvalidArgument(
                "wireless address must not be empty".into(),
            ));
        }

        debug!(address, "opening wireless connection");
        let stream = backend.open(address).await?;
        let conn = Self::from_stream(TransportKind::Wireless, address.to_owned(), stream);
        info!(id = %conn.id, remote = %conn.remote, "wireless connection open");
        Ok(conn)
    }

    pub(crate) fn from_stream(
        kind: TransportKind,
        remote: String,
        stream: Box<dyn LinkStream>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            kind,
            remote,
            io: Mutex::new(ConnectionIo {
                state: ConnectionState::Open,
                stream: Some(stream),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The address this connection was opened against.
    pub fn remote_address(&self) -> &str {
        &self.remote
    }

    pub async fn state(&self) -> ConnectionState {
        self.io.lock().await.state
    }

    /// Current liveness.  False once closed or broken.
    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Close the underlying transport.  Idempotent, best-effort: shutdown
    /// failures are logged and swallowed.  If an exchange is in flight the
    /// close takes effect once that exchange releases the stream.
    pub async fn close(&self) {
        let mut io = self.io.lock().await;
        if let Some(mut stream) = io.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(id = %self.id, error = %e, "shutdown during close");
            }
        }
        if io.state != ConnectionState::Closed {
            info!(id = %self.id, remote = %self.remote, "connection closed");
        }
        io.state = ConnectionState::Closed;
    }

    /// Write raw bytes (a print-ready command stream) to the printer.
    ///
    /// Returns `false` on any failure — including a connection that has
    /// gone broken since the last check — never an error or panic.
    pub async fn send(&self, bytes: &[u8]) -> bool {
        let mut io = self.io.lock().await;
        match io.write_all(bytes).await {
            Ok(()) => {
                debug!(id = %self.id, len = bytes.len(), "raw data sent");
                true
            }
            Err(e) => {
                warn!(id = %self.id, error = %e, "raw send failed");
                false
            }
        }
    }

    /// Take the exchange lock.  Held by the command channel for the full
    /// duration of one request/response round trip, so concurrent callers
    /// queue instead of interleaving bytes on the stream.
    pub(crate) async fn exchange_lock(&self) -> MutexGuard<'_, ConnectionIo> {
        self.io.lock().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Validate a network address and fill in the default port for bare hosts.
fn normalize_network_address(address: &str, default_port: u16) -> Result<String> {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return Err(LabelwireError::InvalidArgument(format!(
            "malformed network address '{address}'"
        )));
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            port.parse::<u16>().map_err(|_| {
                LabelwireError::InvalidArgument(format!("invalid port in address '{address}'"))
            })?;
            Ok(address.to_owned())
        }
        Some(_) => Err(LabelwireError::InvalidArgument(format!(
            "malformed network address '{address}'"
        ))),
        None => Ok(format!("{address}:{default_port}")),
    }
}

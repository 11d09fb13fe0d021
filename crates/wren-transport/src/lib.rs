//! Socket abstraction layer for wren.
//!
//! Provides the [`Connector`] and [`Connection`] traits that the session
//! engine consumes. A connection is split into a blocking byte reader and
//! a blocking byte writer; closing the connection is the only way to
//! interrupt a read that is blocked on the socket.
//!
//! # Feature Flags
//!
//! - `tcp` (default): plaintext TCP via `std::net::TcpStream`
//!
//! The [`memory`] module is always available: it replays a scripted
//! server byte stream and records what the client wrote.

mod error;
pub mod memory;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryConnector, SentLog};
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpConnector};

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default XMPP client-to-server port.
pub const DEFAULT_PORT: u16 = 5222;

/// Boxed blocking byte source handed to the tokenizer.
pub type ByteReader = Box<dyn Read + Send>;

/// Boxed blocking byte sink handed to the writer.
pub type ByteWriter = Box<dyn Write + Send>;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Identifies one socket in logs, e.g. `tcp#3`.
///
/// Sequence numbers come from one process-wide counter, so ids of
/// different transports never collide. The session records it on its
/// tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    transport: &'static str,
    seq: u64,
}

impl ConnectionId {
    pub(crate) fn next(transport: &'static str) -> Self {
        Self {
            transport,
            seq: NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Name of the transport that opened the connection.
    pub fn transport(self) -> &'static str {
        self.transport
    }

    pub fn seq(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transport, self.seq)
    }
}

/// Opens outgoing connections to an XMPP server.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection to `host:port`. Never retried by the caller.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, TransportError>;
}

/// A single open socket that can be split into read and write halves.
///
/// `close` must be callable from any thread while another thread is
/// blocked in a read on the same connection.
pub trait Connection: Send + Sync + 'static {
    /// Returns the byte source for incoming traffic.
    ///
    /// Called once per connection by the session engine.
    fn reader(&self) -> Result<ByteReader, TransportError>;

    /// Returns the byte sink for outgoing traffic.
    ///
    /// Called once per connection by the session engine.
    fn writer(&self) -> Result<ByteWriter, TransportError>;

    /// Shuts the socket down in both directions.
    fn close(&self) -> Result<(), TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

//! Plaintext TCP transport using `std::net::TcpStream`.

use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};

use crate::{
    ByteReader, ByteWriter, Connection, ConnectionId, Connector,
    TransportError, DEFAULT_PORT,
};

/// A [`Connector`] that opens blocking TCP sockets.
///
/// No TLS: XMPP traffic goes over the socket in the clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, TransportError> {
        let port = if port == 0 { DEFAULT_PORT } else { port };
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr).map_err(|source| {
            TransportError::ConnectFailed {
                addr: addr.clone(),
                source,
            }
        })?;
        // Stanzas are small and flushed explicitly.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "could not disable Nagle");
        }

        let id = ConnectionId::next("tcp");
        tracing::debug!(%id, %addr, "opened TCP connection");

        Ok(TcpConnection { id, stream })
    }
}

/// A single TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
}

impl TcpConnection {
    /// Returns the remote address of the socket.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Connection for TcpConnection {
    fn reader(&self) -> Result<ByteReader, TransportError> {
        let half = self
            .stream
            .try_clone()
            .map_err(TransportError::StreamSetup)?;
        Ok(Box::new(half))
    }

    fn writer(&self) -> Result<ByteWriter, TransportError> {
        let half = self
            .stream
            .try_clone()
            .map_err(TransportError::StreamSetup)?;
        Ok(Box::new(BufWriter::new(half)))
    }

    fn close(&self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already shut down by the peer.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::CloseFailed(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

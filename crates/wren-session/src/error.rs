//! Error types for the session layer.

use wren_protocol::ProtocolError;
use wren_transport::TransportError;

/// Errors that can end (or abort part of) a session.
///
/// The engine never hands these to callers of outbound operations.
/// Instead the session thread maps them onto listener events when it
/// shuts down: I/O trouble becomes `on_conn_failed`, a rejected login
/// becomes `on_auth_failed`, and so on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Opening or tearing down the socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading or writing the XML stream failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server rejected the credentials. Carries the server's error
    /// code or condition.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server rejected in-band registration.
    #[error("registration failed: {0}")]
    RegisterFailed(String),

    /// A stanza lacked something the engine cannot do without, such as
    /// an `iq` with no `type`.
    #[error("malformed stanza: {0}")]
    Malformed(String),

    /// The server sent `<stream:error>`.
    #[error("stream error: {0}")]
    Stream(String),

    /// The session has no live connection.
    #[error("session is not connected")]
    NotConnected,

    /// A module failed while handling an IQ or command.
    #[error("module {module} failed: {reason}")]
    Module {
        module: &'static str,
        reason: String,
    },
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Protocol(ProtocolError::Io(e))
    }
}

impl SessionError {
    /// Returns `true` for faults of the connection itself, as opposed to
    /// a server verdict or a bad stanza.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Protocol(_) | Self::Stream(_) | Self::NotConnected
        )
    }
}

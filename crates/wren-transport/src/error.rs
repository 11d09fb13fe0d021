/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the socket failed (DNS, refused, unreachable).
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Splitting the socket into read/write halves failed.
    #[error("stream setup failed: {0}")]
    StreamSetup(#[source] std::io::Error),

    /// Closing the socket failed.
    #[error("close failed: {0}")]
    CloseFailed(#[source] std::io::Error),

    /// The connector can hand out only one connection and already did.
    #[error("connection already taken")]
    AlreadyTaken,
}

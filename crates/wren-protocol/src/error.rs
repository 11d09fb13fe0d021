//! Error types for the protocol layer.
//!
//! Everything that can go wrong while turning bytes into tokens (or
//! tokens into bytes) surfaces as a [`ProtocolError`]. Socket faults are
//! wrapped unchanged so the session can tell them apart from malformed
//! input.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Reading from or writing to the underlying stream failed.
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of an element the caller was
    /// consuming (for example while draining an ignored subtree).
    #[error("stream ended inside <{0}>")]
    UnexpectedEof(String),

    /// A SASL payload was not valid Base64 or not valid UTF-8.
    #[error("invalid sasl payload: {0}")]
    InvalidSasl(String),
}

//! Unified error type for the wren facade.

use std::path::PathBuf;

use wren_protocol::ProtocolError;
use wren_session::SessionError;
use wren_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// Callers of the `wren` crate deal with this single type. The `#[from]`
/// variants let `?` lift a sub-crate error without a manual `map_err`.
///
/// Note that a running session never returns errors here: once a session
/// thread is up, failures arrive as listener events. `WrenError` covers
/// what can go wrong *before* that point (loading account files,
/// validating configs, spawning threads).
#[derive(Debug, thiserror::Error)]
pub enum WrenError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The accounts file could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The accounts file is not valid TOML or has wrongly typed fields.
    #[error("invalid accounts file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An account is missing something a login cannot do without.
    #[error("invalid account {index}: {reason}")]
    InvalidAccount { index: usize, reason: String },

    /// The OS refused to start a session or keepalive thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

//! # wren
//!
//! Blocking, thread-per-account XMPP client engine.
//!
//! wren connects to an XMPP server, negotiates the stream, logs in with
//! SASL DIGEST-MD5 (or legacy `jabber:iq:auth`) and turns the incoming
//! stanza stream into [`Listener`](wren_session::Listener) callbacks.
//! Applications implement `Listener`, start sessions with a
//! [`ClientBuilder`], and act through each session's
//! [`SessionHandle`](wren_session::SessionHandle).
//!
//! ## Architecture
//!
//! ```text
//! wren (this crate)   ← builder, accounts file, ClientInfo, keepalive
//!     ↕
//! wren-session        ← state machine, stanza dispatch, listeners, modules
//!     ↕
//! wren-protocol       ← XML pull reader, XML writer, SASL, JIDs
//!     ↕
//! wren-transport      ← TCP and scripted in-memory connections
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wren::prelude::*;
//!
//! let file = AccountsFile::load("accounts.toml")?;
//! let clients = ClientBuilder::from_accounts_file(&file).connect_all(file.accounts.clone())?;
//! for client in &clients {
//!     client.join();
//! }
//! # Ok::<(), WrenError>(())
//! ```

mod client;
mod client_info;
pub mod config;
mod error;
pub mod keepalive;
pub mod telemetry;

pub use client::{Client, ClientBuilder};
pub use client_info::ClientInfo;
pub use error::WrenError;

pub use wren_protocol as protocol;
pub use wren_session as session;
pub use wren_transport as transport;

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::config::{AccountsFile, ClientSettings};
    pub use crate::keepalive::KeepaliveConfig;
    pub use crate::{Client, ClientBuilder, ClientInfo, WrenError};

    pub use wren_session::{
        Bookmark, CommandOutcome, Contact, IncomingMessage, IqContext, IqFailure, Listener,
        Module, ModuleEvent, OutgoingMessage, Outbound, Phase, Presence, SessionConfig,
        SessionError, SessionHandle, XmlDirection,
    };
}

//! XMPP session engine for wren.
//!
//! This crate runs one account's connection from socket to stanzas:
//!
//! 1. **Negotiation**: opening the stream, SASL DIGEST-MD5 (or legacy
//!    `jabber:iq:auth`), stream restart, resource binding ([`Phase`])
//! 2. **Dispatch**: turning `message`, `presence` and `iq` stanzas into
//!    [`Listener`] events, and offering unknown IQ namespaces to
//!    [`Module`]s
//! 3. **Outbound**: stanzas sent on behalf of the owning layer through
//!    a [`SessionHandle`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)  ← builds sessions, bundles modules, loads account files
//!     ↕
//! Session Layer (this crate)  ← state machine, dispatch, listeners
//!     ↕
//! Protocol Layer (below)  ← XmlReader / XmlWriter / SASL
//! ```
//!
//! Each session owns one thread. Listener callbacks run on that thread;
//! see [`Listener`] for the synchronization contract.

mod auth;
mod config;
mod engine;
mod error;
mod handle;
mod listener;
mod module;
mod outbound;
mod phase;
mod stanza;

pub use config::SessionConfig;
pub use engine::Session;
pub use error::SessionError;
pub use handle::{OutgoingMessage, Presence, SessionHandle};
pub use listener::{
    Bookmark, Contact, IncomingMessage, IqFailure, Listener, Listeners, XmlDirection,
};
pub use module::{
    CommandOutcome, IqContext, IqHeader, Module, ModuleEvent, ModuleRegistry, StreamReader,
    StreamWriter,
};
pub use outbound::Outbound;
pub use phase::Phase;

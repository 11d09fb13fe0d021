//! XML stream protocol for wren.
//!
//! This crate defines how an XMPP client reads and writes the wire:
//!
//! - **Tokens** ([`XmlReader`], [`Token`], [`StartTag`]): a pull
//!   tokenizer that turns the server's endless XML document into
//!   start tags, end tags and text, one at a time.
//! - **Writer** ([`XmlWriter`]): incremental markup output with a tag
//!   stack and escaping.
//! - **SASL** ([`sasl`]): Base64 and the DIGEST-MD5 response.
//! - **Namespaces** ([`ns`]) and JID helpers.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (the XMPP state machine). It does not know about accounts or
//! stanzas; it only knows how XML maps to and from bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Token) → Session (stanzas, events)
//! ```

mod chars;
mod error;
mod jid;
pub mod ns;
mod reader;
pub mod sasl;
mod token;
mod writer;

pub use error::ProtocolError;
pub use jid::{bare_jid, full_jid, split_jid};
pub use reader::XmlReader;
pub use token::{Attributes, StartTag, Token};
pub use writer::{escape_into, XmlWriter};

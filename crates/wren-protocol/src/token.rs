//! Token types produced by the [`XmlReader`](crate::XmlReader).
//!
//! A token is the smallest unit the session engine reacts to. Tokens are
//! produced lazily, one at a time, and are never assembled into a tree.

use std::collections::HashMap;
use std::fmt;

/// The attributes of a start tag. Keys are unique; a repeated attribute
/// keeps the last value seen.
pub type Attributes = HashMap<String, String>;

/// An opening tag with its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartTag {
    /// Qualified tag name as it appeared on the wire (e.g. `stream:features`).
    pub name: String,

    /// Attribute values, entity-decoded.
    pub attributes: Attributes,

    /// `true` for `<name/>`. The reader still emits a matching
    /// [`Token::EndTag`] right after this tag.
    pub self_closing: bool,
}

impl StartTag {
    /// Creates a tag with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the value of `name`, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns the `xmlns` attribute, if present.
    pub fn namespace(&self) -> Option<&str> {
        self.attr("xmlns")
    }

    /// Returns `true` if the tag is `name` declared in namespace `ns`.
    pub fn is(&self, name: &str, ns: &str) -> bool {
        self.name == name && self.namespace() == Some(ns)
    }
}

/// One unit of the incoming XML stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<name attr='v'>` or `<name/>`.
    StartTag(StartTag),

    /// `</name>`, or the implicit close of a self-closing tag.
    EndTag(String),

    /// A run of character data, entity-decoded.
    Text(String),

    /// The byte stream is exhausted. Never followed by another token.
    EndOfStream,
}

impl Token {
    /// Returns the start tag, if this is one.
    pub fn as_start(&self) -> Option<&StartTag> {
        match self {
            Self::StartTag(tag) => Some(tag),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartTag(tag) => write!(f, "<{}>", tag.name),
            Self::EndTag(name) => write!(f, "</{name}>"),
            Self::Text(text) => write!(f, "text({} chars)", text.chars().count()),
            Self::EndOfStream => write!(f, "end-of-stream"),
        }
    }
}

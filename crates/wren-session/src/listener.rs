//! Observer interface for session events.
//!
//! A [`Listener`] receives everything a session learns from the server:
//! connection and login outcomes, roster entries, presence, messages,
//! bookmarks and module events. Every method has a no-op default, so an
//! implementation only overrides what it cares about.
//!
//! # Threading
//!
//! Callbacks run synchronously on the session's own thread. A listener
//! shared by several sessions is called from several threads at once and
//! must synchronize its own state; the engine adds no locking around
//! callbacks.

use std::sync::Arc;

use crate::ModuleEvent;

/// One roster entry, as delivered per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Bare JID of the contact.
    pub jid: String,
    pub name: Option<String>,
    /// Roster group, or empty for an ungrouped entry.
    pub group: String,
    pub subscription: Option<String>,
}

/// A conference bookmark from private XML storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub autojoin: Option<String>,
    pub name: Option<String>,
    pub jid: Option<String>,
    pub nick: String,
}

/// A received `<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Sender without resource.
    pub from: String,
    /// Sender resource, empty when the sender had none.
    pub resource: String,
    pub kind: Option<String>,
    pub id: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// An `<iq type='error'>` that did not end the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqFailure {
    /// The `type` of the nested `<error>` (e.g. `cancel`, `modify`).
    pub error_type: String,
    pub id: Option<String>,
    pub code: String,
}

/// Direction of traced XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlDirection {
    Inbound,
    Outbound,
}

/// Receives session events. See the module docs for threading rules.
#[allow(unused_variables)]
pub trait Listener: Send + Sync + 'static {
    /// The connection could not be opened or was lost.
    fn on_conn_failed(&self, account: usize) {}

    /// Login completed.
    fn on_auth(&self, account: usize) {}

    /// The server rejected the login. `code` is the server's error code
    /// or SASL condition.
    fn on_auth_failed(&self, account: usize, code: &str) {}

    fn on_iq_failed(&self, account: usize, failure: &IqFailure) {}

    fn on_message_event(&self, account: usize, message: &IncomingMessage) {}

    /// One roster entry. Fired once per group the entry belongs to.
    fn on_contact_event(&self, account: usize, contact: &Contact) {}

    /// A roster push removed `jid`.
    fn on_contact_remove_event(&self, account: usize, jid: &str) {}

    /// Presence from `jid`. `show` is `"online"` when the server sent none.
    fn on_status_event(&self, account: usize, jid: &str, show: &str, status: &str) {}

    fn on_offline_event(&self, account: usize, jid: &str, status: &str) {}

    fn on_subscribe_event(&self, account: usize, jid: &str) {}

    fn on_unsubscribe_event(&self, account: usize, jid: &str) {}

    /// In-band registration succeeded.
    fn on_register(&self, account: usize) {}

    fn on_register_failed(&self, account: usize, code: &str) {}

    /// The account was removed from the server.
    fn on_removed(&self, account: usize) {}

    fn on_remove_failed(&self, account: usize) {}

    fn on_add_book(&self, account: usize, bookmark: &Bookmark) {}

    /// Login progress, 1 through 6.
    fn on_step(&self, account: usize, step: u8) {}

    /// Best-effort diagnostic for a malformed stanza. The session is
    /// terminated afterwards.
    fn net_panic(&self, account: usize, message: &str) {}

    /// Raw traffic, only when `trace_xml` is enabled.
    fn on_xml(&self, account: usize, direction: XmlDirection, content: &str) {}

    /// Something a module wants the owning layer to know.
    fn on_module_event(&self, account: usize, event: &ModuleEvent) {}
}

/// The listeners of one session, called in registration order.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Vec<Arc<dyn Listener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. Registering the same `Arc` twice is ignored.
    pub fn push(&mut self, listener: Arc<dyn Listener>) {
        if !self.inner.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            self.inner.push(listener);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Calls `f` on every listener in order.
    pub fn emit(&self, f: impl Fn(&dyn Listener)) {
        for listener in &self.inner {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}

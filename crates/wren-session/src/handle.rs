//! The owning layer's view of a running session.
//!
//! A [`SessionHandle`] is cheap to clone and safe to use from any
//! thread. Its operations write stanzas through the session's shared
//! writer and never return I/O errors: a failed write closes the
//! connection and is reported through `on_conn_failed` instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use wren_protocol::{full_jid, ns};

use crate::engine::Shared;
use crate::stanza::UNREGISTER_ID;
use crate::{CommandOutcome, Phase, SessionConfig, SessionError};

/// Outgoing `<presence>` fields. Entity capabilities come from the
/// session config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    pub to: Option<String>,
    pub kind: Option<String>,
    pub show: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i8>,
}

/// Outgoing `<message>` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Bare JID of the recipient.
    pub to: String,
    pub resource: Option<String>,
    /// Message type; `chat` when `None`.
    pub kind: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

impl OutgoingMessage {
    /// A `chat` message with just a body.
    pub fn chat(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            resource: None,
            kind: None,
            subject: None,
            body: body.into(),
        }
    }
}

/// Handle to a session thread.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<Shared>, thread: JoinHandle<()>) -> Self {
        Self {
            shared,
            thread: Arc::new(Mutex::new(Some(thread))),
        }
    }

    pub fn account(&self) -> usize {
        self.shared.config.account
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn is_ready(&self) -> bool {
        self.phase().is_ready()
    }

    /// Returns `true` once the session thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Sends a presence stanza with this session's full JID as `from`.
    pub fn send_presence(&self, presence: &Presence) {
        let config = &self.shared.config;
        let from = config.full_jid();
        let priority = presence.priority.map(|p| p.to_string());
        self.shared.out.deliver("send_presence", |w| {
            w.start_tag("presence")?;
            w.attribute("type", presence.kind.as_deref())?;
            w.attribute("to", presence.to.as_deref())?;
            w.attribute("from", from.as_str())?;
            if let Some(show) = &presence.show {
                w.text_element("show", show)?;
            }
            if let Some(status) = &presence.status {
                w.text_element("status", status)?;
            }
            if let Some(priority) = &priority {
                w.text_element("priority", priority)?;
            }
            if let Some(node) = &config.caps_node {
                w.start_tag("c")?;
                w.attribute("xmlns", ns::CAPS)?;
                w.attribute("node", node.as_str())?;
                w.attribute("ver", config.caps_version.as_deref())?;
                w.end_tag()?;
            }
            w.end_tag()
        });
    }

    /// Broadcasts availability. Empty strings count as absent, and
    /// `show = "invisible"` becomes `type='invisible'`.
    pub fn set_status(&self, show: &str, status: &str, priority: Option<i8>) {
        let show = Some(show).filter(|s| !s.is_empty());
        let status = Some(status).filter(|s| !s.is_empty());
        let presence = if show == Some("invisible") {
            Presence {
                kind: Some("invisible".into()),
                priority,
                ..Presence::default()
            }
        } else {
            Presence {
                show: show.map(str::to_owned),
                status: status.map(str::to_owned),
                priority,
                ..Presence::default()
            }
        };
        self.send_presence(&presence);
    }

    pub fn send_message(&self, message: &OutgoingMessage) {
        let to = match &message.resource {
            Some(resource) => full_jid(&message.to, resource),
            None => message.to.clone(),
        };
        self.shared.out.deliver("send_message", |w| {
            w.start_tag("message")?;
            w.attribute("type", message.kind.as_deref().unwrap_or("chat"))?;
            w.attribute("to", to.as_str())?;
            if let Some(subject) = &message.subject {
                w.text_element("subject", subject)?;
            }
            w.text_element("body", &message.body)?;
            w.end_tag()
        });
    }

    pub fn request_roster(&self) {
        self.shared.out.deliver("request_roster", |w| {
            w.start_tag("iq")?;
            w.attribute("id", "roster")?;
            w.attribute("type", "get")?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::ROSTER)?;
            w.end_tag()?;
            w.end_tag()
        });
    }

    /// Asks for conference bookmarks from private XML storage.
    pub fn request_bookmarks(&self) {
        self.shared.out.deliver("request_bookmarks", |w| {
            w.start_tag("iq")?;
            w.attribute("id", "roster")?;
            w.attribute("type", "get")?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::PRIVATE)?;
            w.start_tag("storage")?;
            w.attribute("xmlns", ns::BOOKMARKS)?;
            w.end_tag()?;
            w.end_tag()?;
            w.end_tag()
        });
    }

    /// Asks the server to delete the account. The answer arrives as
    /// `on_removed` or `on_remove_failed`.
    pub fn remove_account(&self) {
        self.shared.out.deliver("remove_account", |w| {
            w.start_tag("iq")?;
            w.attribute("type", "set")?;
            w.attribute("id", UNREGISTER_ID)?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::REGISTER)?;
            w.start_tag("remove")?;
            w.end_tag()?;
            w.end_tag()?;
            w.end_tag()
        });
    }

    /// Adds or updates a roster entry.
    pub fn save_contact(
        &self,
        jid: &str,
        name: Option<&str>,
        groups: &[&str],
        subscription: Option<&str>,
    ) {
        self.shared.out.deliver("save_contact", |w| {
            w.start_tag("iq")?;
            w.attribute("type", "set")?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::ROSTER)?;
            w.start_tag("item")?;
            w.attribute("jid", jid)?;
            w.attribute("name", name)?;
            w.attribute("subscription", subscription)?;
            for group in groups {
                w.text_element("group", group)?;
            }
            w.end_tag()?;
            w.end_tag()?;
            w.end_tag()
        });
    }

    /// Sends a cheap `jabber:iq:version` query to keep the socket busy.
    pub fn keepalive(&self, jid: &str) {
        self.shared.out.deliver("keepalive", |w| {
            w.start_tag("iq")?;
            w.attribute("to", jid)?;
            w.attribute("type", "get")?;
            w.attribute("id", "ping")?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::VERSION)?;
            w.end_tag()?;
            w.end_tag()
        });
    }

    /// Offers a command to the registered modules.
    ///
    /// A module error becomes [`CommandOutcome::Failed`]. Only a broken
    /// connection also ends the session.
    pub fn run_command(&self, name: &str, args: &[&str]) -> CommandOutcome {
        let Some(module) = self.shared.modules.for_command(name) else {
            tracing::debug!(command = name, "unknown command");
            return CommandOutcome::Unknown;
        };
        match module.handle_command(&self.shared.out, name, args) {
            Ok(outcome) => outcome,
            Err(SessionError::NotConnected) => {
                tracing::warn!(command = name, "session not connected, dropped");
                CommandOutcome::Failed(SessionError::NotConnected.to_string())
            }
            Err(e) if e.is_connection_fault() => {
                tracing::warn!(module = module.name(), command = name, error = %e, "command write failed");
                self.shared.out.fail_connection();
                CommandOutcome::Failed(e.to_string())
            }
            Err(e) => {
                tracing::warn!(module = module.name(), command = name, error = %e, "command rejected");
                CommandOutcome::Failed(e.to_string())
            }
        }
    }

    /// Goes offline: unavailable presence, `</stream:stream>`, socket
    /// closed. No `on_conn_failed` follows.
    pub fn logoff(&self) {
        let out = &self.shared.out;
        let sent = out.send(|w| {
            w.start_tag("presence")?;
            w.attribute("type", "unavailable")?;
            w.end_tag()?;
            while w.depth() > 0 {
                w.end_tag()?;
            }
            Ok(())
        });
        out.mark_logged_off();
        if let Err(e) = sent {
            tracing::debug!(error = %e, "logoff write failed");
        }
        out.shut_down();
        tracing::info!(account = self.account(), "logoff");
    }

    /// Closes the socket. The session thread sees the fault and reports
    /// `on_conn_failed`.
    pub fn close(&self) {
        self.shared.out.fail_connection();
    }

    /// Waits for the session thread to exit.
    pub fn join(&self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!(account = self.account(), "session thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("account", &self.account())
            .field("phase", &self.phase())
            .finish()
    }
}

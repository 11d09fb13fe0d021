//! Pluggable IQ and command handlers.
//!
//! The core engine understands roster, bookmark, auth and registration
//! IQs. Everything else is offered to [`Module`]s: an incoming IQ child
//! goes to the first module that owns its namespace, and an outgoing
//! command goes to the first module that owns its name. Modules are
//! registered before the session starts and never change afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use wren_protocol::{StartTag, XmlReader, XmlWriter};
use wren_transport::{ByteReader, ByteWriter};

use crate::{Listeners, Outbound, SessionError};

/// The tokenizer bound to a session's socket.
pub type StreamReader = XmlReader<ByteReader>;

/// The writer bound to a session's socket.
pub type StreamWriter = XmlWriter<ByteWriter>;

/// Attributes of the `<iq>` being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqHeader {
    /// `get`, `set`, `result` or `error`.
    pub kind: String,
    pub id: Option<String>,
    /// Sender, or the server host when the stanza had no `from`.
    pub from: String,
}

/// Everything a module may touch while handling one IQ child.
pub struct IqContext<'a> {
    pub account: usize,
    pub iq: &'a IqHeader,
    /// Positioned just after the child's start tag. The module must
    /// consume the child up to and including its end tag.
    pub reader: &'a mut StreamReader,
    pub out: &'a Outbound,
    pub listeners: &'a Listeners,
}

impl IqContext<'_> {
    /// Reports `event` to every listener.
    pub fn emit(&self, event: &ModuleEvent) {
        let account = self.account;
        self.listeners.emit(|l| l.on_module_event(account, event));
    }
}

/// Result of offering a command to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A module sent something.
    Handled,
    /// A module owns the command but the arguments were incomplete.
    Usage(String),
    /// The module refused the command or could not send it.
    Failed(String),
    /// No module owns the command.
    Unknown,
}

/// A notification from a module to the owning layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEvent {
    /// Event name, e.g. `disco-item`.
    pub kind: String,
    pub from: String,
    pub id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl ModuleEvent {
    pub fn new(kind: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: from.into(),
            id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: Option<&str>) -> Self {
        self.id = id.map(str::to_owned);
        self
    }

    /// Adds `key=value`. `None` values are left out.
    pub fn field<'v>(mut self, key: &str, value: impl Into<Option<&'v str>>) -> Self {
        if let Some(value) = value.into() {
            self.fields.insert(key.to_owned(), value.to_owned());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// A handler for IQ namespaces and outgoing commands.
///
/// Both handlers run on the caller's thread: `handle_iq` on the session
/// thread, `handle_command` on whichever thread called
/// `SessionHandle::run_command`.
pub trait Module: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn owns_namespace(&self, ns: &str) -> bool;

    fn owns_command(&self, name: &str) -> bool;

    /// Handles one child of an `<iq>` whose namespace this module owns.
    fn handle_iq(&self, ctx: &mut IqContext<'_>, child: &StartTag) -> Result<(), SessionError>;

    /// Handles a command this module owns.
    fn handle_command(
        &self,
        out: &Outbound,
        name: &str,
        args: &[&str],
    ) -> Result<CommandOutcome, SessionError>;
}

/// Modules in registration order. First match wins.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        tracing::debug!(module = module.name(), "module registered");
        self.modules.push(module);
    }

    pub fn for_namespace(&self, ns: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|m| m.owns_namespace(ns))
    }

    pub fn for_command(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|m| m.owns_command(name))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        ns: &'static str,
        command: &'static str,
    }

    impl Module for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn owns_namespace(&self, ns: &str) -> bool {
            ns == self.ns
        }

        fn owns_command(&self, name: &str) -> bool {
            name == self.command
        }

        fn handle_iq(&self, ctx: &mut IqContext<'_>, child: &StartTag) -> Result<(), SessionError> {
            ctx.reader.skip_element(&child.name)?;
            Ok(())
        }

        fn handle_command(
            &self,
            _out: &Outbound,
            _name: &str,
            _args: &[&str],
        ) -> Result<CommandOutcome, SessionError> {
            Ok(CommandOutcome::Handled)
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Named {
            name: "first",
            ns: "urn:example:shared",
            command: "ping",
        }));
        registry.register(Arc::new(Named {
            name: "second",
            ns: "urn:example:shared",
            command: "pong",
        }));
        registry
    }

    #[test]
    fn test_for_namespace_first_registered_wins() {
        let registry = registry();
        let module = registry.for_namespace("urn:example:shared").expect("owner");
        assert_eq!(module.name(), "first");
    }

    #[test]
    fn test_for_command_matches_by_name() {
        let registry = registry();
        assert_eq!(registry.for_command("pong").map(|m| m.name()), Some("second"));
        assert!(registry.for_command("nope").is_none());
        assert!(registry.for_namespace("urn:example:other").is_none());
    }

    #[test]
    fn test_module_event_skips_none_fields() {
        let event = ModuleEvent::new("version-result", "a@b")
            .with_id(Some("v1"))
            .field("name", "wren")
            .field("os", None::<&str>);
        assert_eq!(event.get("name"), Some("wren"));
        assert_eq!(event.get("os"), None);
        assert_eq!(event.id.as_deref(), Some("v1"));
    }
}

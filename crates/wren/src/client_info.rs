//! Service discovery and software version (XEP-0030, XEP-0092).
//!
//! [`ClientInfo`] answers `disco#info`, `disco#items` and
//! `jabber:iq:version` queries addressed to this client, turns the
//! results of queries this client sent into [`ModuleEvent`]s, and
//! provides three commands:
//!
//! | command       | arguments                               |
//! |---------------|-----------------------------------------|
//! | `disco`       | `<jid> [items\|info] [id]`              |
//! | `getversion`  | `<jid> [id]`                            |
//! | `sendversion` | `<to> <id> [name] [version] [os]`       |
//!
//! Events emitted: `disco-item` (fields `jid`, `name`, `node`),
//! `disco-feature` (`var`), `version-result` (`name`, `version`, `os`) and
//! `version-request` (no fields; the reply has already been sent).

use std::io;

use wren_protocol::{ns, StartTag};
use wren_session::{
    CommandOutcome, IqContext, Module, ModuleEvent, Outbound, SessionError, StreamWriter,
};

use crate::config::ClientSettings;

const DISCO_USAGE: &str = "disco <jid> [items|info] [id]";
const GETVERSION_USAGE: &str = "getversion <jid> [id]";
const SENDVERSION_USAGE: &str = "sendversion <to> <id> [name] [version] [os]";

/// Features advertised in `disco#info` replies.
const FEATURES: [&str; 3] = [ns::VERSION, ns::DISCO_ITEMS, ns::MUC];

/// The bundled discovery and version module.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    settings: ClientSettings,
}

impl ClientInfo {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn disco_items_result(&self, ctx: &mut IqContext<'_>, query: &StartTag) -> Result<(), SessionError> {
        while let Some(item) = ctx.reader.next_child(&query.name)? {
            ctx.reader.skip_element(&item.name)?;
            let Some(jid) = item.attr("jid").filter(|_| item.name == "item") else {
                continue;
            };
            ctx.emit(
                &ModuleEvent::new("disco-item", ctx.iq.from.as_str())
                    .with_id(ctx.iq.id.as_deref())
                    .field("jid", jid)
                    .field("name", item.attr("name"))
                    .field("node", item.attr("node")),
            );
        }
        Ok(())
    }

    fn disco_info_result(&self, ctx: &mut IqContext<'_>, query: &StartTag) -> Result<(), SessionError> {
        while let Some(child) = ctx.reader.next_child(&query.name)? {
            ctx.reader.skip_element(&child.name)?;
            let Some(var) = child.attr("var").filter(|_| child.name == "feature") else {
                continue;
            };
            ctx.emit(
                &ModuleEvent::new("disco-feature", ctx.iq.from.as_str())
                    .with_id(ctx.iq.id.as_deref())
                    .field("var", var),
            );
        }
        Ok(())
    }

    fn version_result(&self, ctx: &mut IqContext<'_>, query: &StartTag) -> Result<(), SessionError> {
        let mut event = ModuleEvent::new("version-result", ctx.iq.from.as_str())
            .with_id(ctx.iq.id.as_deref());
        while let Some(child) = ctx.reader.next_child(&query.name)? {
            match child.name.as_str() {
                key @ ("name" | "version" | "os") => {
                    let value = ctx.reader.element_text(&child.name)?;
                    event = event.field(key, value.as_str());
                }
                _ => ctx.reader.skip_element(&child.name)?,
            }
        }
        ctx.emit(&event);
        Ok(())
    }

    fn version_request(&self, ctx: &mut IqContext<'_>, query: &StartTag) -> Result<(), SessionError> {
        ctx.reader.skip_element(&query.name)?;
        tracing::debug!(from = %ctx.iq.from, "version requested");
        reply(ctx, ns::VERSION, |w| self.write_version(w, None, None, None))?;
        ctx.emit(
            &ModuleEvent::new("version-request", ctx.iq.from.as_str())
                .with_id(ctx.iq.id.as_deref()),
        );
        Ok(())
    }

    /// Writes `<name>`, `<version>` and `<os>`, falling back to the
    /// configured identity. Empty values are left out.
    fn write_version(
        &self,
        w: &mut StreamWriter,
        name: Option<&str>,
        version: Option<&str>,
        os: Option<&str>,
    ) -> io::Result<()> {
        let fields = [
            ("name", name.unwrap_or(&self.settings.name)),
            ("version", version.unwrap_or(&self.settings.version)),
            ("os", os.unwrap_or(&self.settings.os)),
        ];
        for (tag, value) in fields {
            if !value.is_empty() {
                w.text_element(tag, value)?;
            }
        }
        Ok(())
    }
}

/// Answers the IQ in `ctx` with `<query xmlns=namespace>` and whatever
/// `body` writes inside it.
fn reply(
    ctx: &IqContext<'_>,
    namespace: &str,
    body: impl FnOnce(&mut StreamWriter) -> io::Result<()>,
) -> Result<(), SessionError> {
    let to = ctx.iq.from.as_str();
    let id = ctx.iq.id.as_deref();
    ctx.out.send(|w| {
        w.start_tag("iq")?;
        w.attribute("type", "result")?;
        w.attribute("id", id)?;
        w.attribute("to", to)?;
        w.start_tag("query")?;
        w.attribute("xmlns", namespace)?;
        body(w)?;
        w.end_tag()?;
        w.end_tag()
    })
}

fn send_query(out: &Outbound, to: &str, id: &str, namespace: &str) -> Result<(), SessionError> {
    out.send(|w| {
        w.start_tag("iq")?;
        w.attribute("type", "get")?;
        w.attribute("to", to)?;
        w.attribute("id", id)?;
        w.start_tag("query")?;
        w.attribute("xmlns", namespace)?;
        w.end_tag()?;
        w.end_tag()
    })
}

impl Module for ClientInfo {
    fn name(&self) -> &'static str {
        "client-info"
    }

    fn owns_namespace(&self, namespace: &str) -> bool {
        matches!(namespace, ns::DISCO_INFO | ns::DISCO_ITEMS | ns::VERSION)
    }

    fn owns_command(&self, name: &str) -> bool {
        matches!(name, "disco" | "getversion" | "sendversion")
    }

    fn handle_iq(&self, ctx: &mut IqContext<'_>, child: &StartTag) -> Result<(), SessionError> {
        let iq = ctx.iq;
        let namespace = child.namespace().unwrap_or_default();
        match (iq.kind.as_str(), namespace) {
            ("result", ns::DISCO_ITEMS) => self.disco_items_result(ctx, child),
            ("result", ns::DISCO_INFO) => self.disco_info_result(ctx, child),
            ("result", ns::VERSION) => self.version_result(ctx, child),
            ("get", ns::DISCO_ITEMS) => {
                ctx.reader.skip_element(&child.name)?;
                reply(ctx, ns::DISCO_ITEMS, |_| Ok(()))
            }
            ("get", ns::DISCO_INFO) => {
                ctx.reader.skip_element(&child.name)?;
                reply(ctx, ns::DISCO_INFO, |w| {
                    for feature in FEATURES {
                        w.start_tag("feature")?;
                        w.attribute("var", feature)?;
                        w.end_tag()?;
                    }
                    Ok(())
                })
            }
            ("get", ns::VERSION) => self.version_request(ctx, child),
            (kind, namespace) => {
                tracing::debug!(kind, namespace, "client-info ignores iq");
                Ok(ctx.reader.skip_element(&child.name)?)
            }
        }
    }

    fn handle_command(
        &self,
        out: &Outbound,
        name: &str,
        args: &[&str],
    ) -> Result<CommandOutcome, SessionError> {
        let arg = |i: usize| args.get(i).copied().filter(|a| !a.is_empty());

        match name {
            "disco" => {
                let Some(jid) = arg(0) else {
                    return Ok(CommandOutcome::Usage(DISCO_USAGE.into()));
                };
                let namespace = match arg(1) {
                    None | Some("items") => ns::DISCO_ITEMS,
                    Some("info") => ns::DISCO_INFO,
                    Some(other) => {
                        return Err(SessionError::Module {
                            module: self.name(),
                            reason: format!("unknown disco kind '{other}'"),
                        });
                    }
                };
                send_query(out, jid, arg(2).unwrap_or(jid), namespace)?;
            }
            "getversion" => {
                let Some(jid) = arg(0) else {
                    return Ok(CommandOutcome::Usage(GETVERSION_USAGE.into()));
                };
                send_query(out, jid, arg(1).unwrap_or(jid), ns::VERSION)?;
            }
            "sendversion" => {
                let (Some(to), Some(id)) = (arg(0), arg(1)) else {
                    return Ok(CommandOutcome::Usage(SENDVERSION_USAGE.into()));
                };
                out.send(|w| {
                    w.start_tag("iq")?;
                    w.attribute("type", "result")?;
                    w.attribute("id", id)?;
                    w.attribute("to", to)?;
                    w.start_tag("query")?;
                    w.attribute("xmlns", ns::VERSION)?;
                    self.write_version(w, arg(2), arg(3), arg(4))?;
                    w.end_tag()?;
                    w.end_tag()
                })?;
            }
            _ => return Ok(CommandOutcome::Unknown),
        }
        Ok(CommandOutcome::Handled)
    }
}

//! Dispatch of `message`, `presence` and `iq` stanzas.

use wren_protocol::{bare_jid, ns, split_jid, StartTag};

use crate::auth::{AUTH_ID, BIND_ID};
use crate::engine::Engine;
use crate::{
    Bookmark, Contact, IncomingMessage, IqContext, IqFailure, IqHeader, Phase,
    SessionError,
};

/// IQ id used for account removal.
pub(crate) const UNREGISTER_ID: &str = "unreg";

impl Engine {
    /// Sender of a stanza. A missing `from` means the server itself.
    fn sender(&self, tag: &StartTag) -> String {
        tag.attr("from")
            .map_or_else(|| self.shared.config.host.clone(), str::to_owned)
    }

    /// Drains a stanza that arrived before login completed.
    fn drop_early(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        tracing::debug!(tag = %tag.name, phase = %self.phase(), "stanza before ready dropped");
        Ok(self.reader.skip_element(&tag.name)?)
    }

    pub(crate) fn handle_message(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        if !self.phase().is_ready() {
            return self.drop_early(tag);
        }
        let from = self.sender(tag);
        let id = tag.attr("id").map(str::to_owned);
        let mut subject = None;
        let mut body = None;

        while let Some(child) = self.reader.next_child(&tag.name)? {
            match child.name.as_str() {
                "body" => body = Some(self.reader.element_text(&child.name)?),
                "subject" => subject = Some(self.reader.element_text(&child.name)?),
                "request" if child.namespace() == Some(ns::RECEIPTS) => {
                    self.reader.skip_element(&child.name)?;
                    self.send(|w| {
                        w.start_tag("message")?;
                        w.attribute("to", from.as_str())?;
                        w.attribute("id", id.as_deref())?;
                        w.start_tag("received")?;
                        w.attribute("xmlns", ns::RECEIPTS)?;
                        w.end_tag()?;
                        w.end_tag()
                    })?;
                }
                _ => self.reader.skip_element(&child.name)?,
            }
        }

        let (bare, resource) = split_jid(&from);
        let message = IncomingMessage {
            from: bare.to_owned(),
            resource: resource.to_owned(),
            kind: tag.attr("type").map(str::to_owned),
            id,
            subject,
            body,
        };
        let account = self.account();
        self.listeners().emit(|l| l.on_message_event(account, &message));
        Ok(())
    }

    pub(crate) fn handle_presence(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        if !self.phase().is_ready() {
            return self.drop_early(tag);
        }
        let from = self.sender(tag);
        let mut show = None;
        let mut status = String::new();

        while let Some(child) = self.reader.next_child(&tag.name)? {
            match child.name.as_str() {
                "status" => status = self.reader.element_text(&child.name)?,
                "show" => show = Some(self.reader.element_text(&child.name)?),
                _ => self.reader.skip_element(&child.name)?,
            }
        }
        let show = show.unwrap_or_else(|| "online".to_owned());

        let account = self.account();
        let jid = bare_jid(&from);
        match tag.attr("type") {
            Some("unavailable") => {
                self.listeners().emit(|l| l.on_offline_event(account, jid, &status));
            }
            Some("unsubscribed" | "error") => {
                self.listeners().emit(|l| l.on_unsubscribe_event(account, &from));
            }
            Some("subscribe") => {
                self.listeners().emit(|l| l.on_subscribe_event(account, &from));
            }
            _ => {
                self.listeners()
                    .emit(|l| l.on_status_event(account, jid, &show, &status));
            }
        }
        Ok(())
    }

    pub(crate) fn handle_iq(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        let kind = tag
            .attr("type")
            .ok_or_else(|| SessionError::Malformed("iq without type".into()))?;
        let header = IqHeader {
            kind: kind.to_owned(),
            id: tag.attr("id").map(str::to_owned),
            from: self.sender(tag),
        };
        let account = self.account();

        match (header.kind.as_str(), header.id.as_deref()) {
            ("error", _) => return self.iq_error(tag, &header),
            ("result", Some(AUTH_ID)) if self.phase().is_authenticating() => {
                self.reader.skip_element(&tag.name)?;
                if self.shared.config.register {
                    tracing::info!("registered");
                    self.listeners().emit(|l| l.on_register(account));
                    self.shared.transition(Phase::Closed);
                } else {
                    self.complete_login();
                }
                return Ok(());
            }
            ("result", Some(BIND_ID)) => {
                self.reader.skip_element(&tag.name)?;
                self.confirm_bind();
                return Ok(());
            }
            ("result", Some(UNREGISTER_ID)) => {
                self.reader.skip_element(&tag.name)?;
                self.listeners().emit(|l| l.on_removed(account));
                return Ok(());
            }
            _ => {}
        }

        if !self.phase().is_ready() {
            return self.drop_early(tag);
        }

        while let Some(child) = self.reader.next_child(&tag.name)? {
            let namespace = child.namespace().unwrap_or("");
            match (header.kind.as_str(), child.name.as_str(), namespace) {
                ("result", "query", ns::ROSTER) => self.parse_roster(&child)?,
                ("result", "query", ns::PRIVATE) => self.parse_private(&child)?,
                ("set", "query", ns::ROSTER) => {
                    self.parse_roster(&child)?;
                    self.ack_push(tag, &header)?;
                }
                ("result" | "get" | "set", _, _) => self.offer_to_module(&header, &child)?,
                _ => self.reader.skip_element(&child.name)?,
            }
        }
        Ok(())
    }

    fn iq_error(&mut self, tag: &StartTag, header: &IqHeader) -> Result<(), SessionError> {
        let mut error_type = String::new();
        let mut code = String::new();
        while let Some(child) = self.reader.next_child(&tag.name)? {
            if child.name != "error" {
                self.reader.skip_element(&child.name)?;
                continue;
            }
            error_type = child.attr("type").unwrap_or_default().to_owned();
            let condition = self.first_child_name(&child.name)?;
            code = child.attr("code").map_or(condition, str::to_owned);
        }

        let account = self.account();
        let config = &self.shared.config;
        match header.id.as_deref() {
            Some(UNREGISTER_ID) => {
                self.listeners().emit(|l| l.on_remove_failed(account));
                Ok(())
            }
            Some(AUTH_ID) => Err(self.rejection(code)),
            Some(BIND_ID) if config.require_bind_confirmation && !self.phase().is_ready() => {
                Err(SessionError::AuthFailed(code))
            }
            _ if error_type == "auth" && !self.phase().is_ready() => Err(self.rejection(code)),
            _ => {
                let failure = IqFailure {
                    error_type,
                    id: header.id.clone(),
                    code,
                };
                tracing::debug!(?failure, "iq failed");
                self.listeners().emit(|l| l.on_iq_failed(account, &failure));
                Ok(())
            }
        }
    }

    /// Acknowledges a roster push with an empty result.
    fn ack_push(&self, tag: &StartTag, header: &IqHeader) -> Result<(), SessionError> {
        let Some(id) = header.id.as_deref() else {
            return Ok(());
        };
        self.send(|w| {
            w.start_tag("iq")?;
            w.attribute("type", "result")?;
            w.attribute("id", id)?;
            w.attribute("to", tag.attr("from"))?;
            w.end_tag()
        })
    }

    fn parse_roster(&mut self, query: &StartTag) -> Result<(), SessionError> {
        let account = self.account();
        while let Some(item) = self.reader.next_child(&query.name)? {
            if item.name != "item" {
                self.reader.skip_element(&item.name)?;
                continue;
            }
            let jid = item
                .attr("jid")
                .ok_or_else(|| SessionError::Malformed("roster item without jid".into()))?;
            let jid = bare_jid(jid).to_owned();

            let mut groups = Vec::new();
            while let Some(child) = self.reader.next_child(&item.name)? {
                if child.name == "group" {
                    groups.push(self.reader.element_text(&child.name)?);
                } else {
                    self.reader.skip_element(&child.name)?;
                }
            }

            let subscription = item.attr("subscription");
            if subscription == Some("remove") {
                self.listeners()
                    .emit(|l| l.on_contact_remove_event(account, &jid));
                continue;
            }
            if groups.is_empty() {
                groups.push(String::new());
            }
            for group in groups {
                let contact = Contact {
                    jid: jid.clone(),
                    name: item.attr("name").map(str::to_owned),
                    group,
                    subscription: subscription.map(str::to_owned),
                };
                self.listeners().emit(|l| l.on_contact_event(account, &contact));
            }
        }
        Ok(())
    }

    fn parse_private(&mut self, query: &StartTag) -> Result<(), SessionError> {
        let account = self.account();
        while let Some(storage) = self.reader.next_child(&query.name)? {
            if !storage.is("storage", ns::BOOKMARKS) {
                self.reader.skip_element(&storage.name)?;
                continue;
            }
            while let Some(conference) = self.reader.next_child(&storage.name)? {
                if conference.name != "conference" {
                    self.reader.skip_element(&conference.name)?;
                    continue;
                }
                while let Some(child) = self.reader.next_child(&conference.name)? {
                    if child.name != "nick" {
                        self.reader.skip_element(&child.name)?;
                        continue;
                    }
                    let bookmark = Bookmark {
                        autojoin: conference.attr("autojoin").map(str::to_owned),
                        name: conference.attr("name").map(str::to_owned),
                        jid: conference.attr("jid").map(str::to_owned),
                        nick: self.reader.element_text(&child.name)?,
                    };
                    self.listeners().emit(|l| l.on_add_book(account, &bookmark));
                }
            }
        }
        Ok(())
    }

    fn offer_to_module(&mut self, header: &IqHeader, child: &StartTag) -> Result<(), SessionError> {
        let namespace = child.namespace().unwrap_or("");
        let Some(module) = self.shared.modules.for_namespace(namespace).cloned() else {
            tracing::debug!(namespace, kind = %header.kind, "no module for iq");
            return Ok(self.reader.skip_element(&child.name)?);
        };

        tracing::debug!(module = module.name(), namespace, "iq routed to module");
        let shared = std::sync::Arc::clone(&self.shared);
        let mut ctx = IqContext {
            account: shared.config.account,
            iq: header,
            reader: &mut self.reader,
            out: &shared.out,
            listeners: shared.listeners(),
        };
        module.handle_iq(&mut ctx, child)
    }
}

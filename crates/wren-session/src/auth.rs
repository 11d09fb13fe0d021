//! Stream feature negotiation and authentication.
//!
//! Login runs over two stream generations. The first `<stream:features>`
//! picks SASL DIGEST-MD5 when offered (legacy `jabber:iq:auth`
//! otherwise). After `<success>` the client restarts the stream and the
//! second features block drives resource binding and session
//! establishment.
//!
//! Success is reported optimistically once the second features block is
//! answered. With `require_bind_confirmation` the engine instead waits
//! for the result of every `bind_1` request.

use wren_protocol::{ns, sasl, ProtocolError, StartTag};

use crate::engine::Engine;
use crate::{Phase, SessionError};

/// IQ id shared by the legacy login and the registration request.
pub(crate) const AUTH_ID: &str = "auth";

/// IQ id shared by the bind and session requests.
pub(crate) const BIND_ID: &str = "bind_1";

impl Engine {
    pub(crate) fn handle_features(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        let phase = self.phase();
        if !phase.awaits_features() {
            tracing::debug!(%phase, "features outside negotiation ignored");
            return Ok(self.reader.skip_element(&tag.name)?);
        }
        if phase == Phase::StreamOpening {
            self.negotiate_auth(tag)
        } else {
            self.negotiate_binding(tag)
        }
    }

    fn negotiate_auth(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        self.step(2);

        let mut digest = false;
        while let Some(child) = self.reader.next_child(&tag.name)? {
            if !child.is("mechanisms", ns::SASL) {
                self.reader.skip_element(&child.name)?;
                continue;
            }
            while let Some(mechanism) = self.reader.next_child(&child.name)? {
                if mechanism.name == "mechanism" {
                    let name = self.reader.element_text(&mechanism.name)?;
                    digest |= name.trim() == sasl::MECHANISM_DIGEST_MD5;
                } else {
                    self.reader.skip_element(&mechanism.name)?;
                }
            }
        }

        if digest && self.shared.config.use_sasl {
            tracing::debug!("using SASL DIGEST-MD5");
            self.send(|w| {
                w.start_tag("auth")?;
                w.attribute("xmlns", ns::SASL)?;
                w.attribute("mechanism", sasl::MECHANISM_DIGEST_MD5)?;
                w.end_tag()
            })?;
            self.shared.transition(Phase::SaslNegotiating);
        } else {
            tracing::debug!(offered = digest, "using legacy jabber:iq:auth");
            self.send_legacy_auth()?;
            self.shared.transition(Phase::LegacyAuth);
        }
        Ok(())
    }

    fn negotiate_binding(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        self.step(6);

        while let Some(child) = self.reader.next_child(&tag.name)? {
            self.reader.skip_element(&child.name)?;
            if child.is("bind", ns::BIND) {
                let resource = self.shared.config.resource.as_str();
                self.send(|w| {
                    w.start_tag("iq")?;
                    w.attribute("type", "set")?;
                    w.attribute("id", BIND_ID)?;
                    w.start_tag("bind")?;
                    w.attribute("xmlns", ns::BIND)?;
                    w.text_element("resource", resource)?;
                    w.end_tag()?;
                    w.end_tag()
                })?;
                self.pending_binds += 1;
                self.shared.transition(Phase::Binding);
            } else if child.is("session", ns::SESSION) {
                self.send(|w| {
                    w.start_tag("iq")?;
                    w.attribute("type", "set")?;
                    w.attribute("id", BIND_ID)?;
                    w.start_tag("session")?;
                    w.attribute("xmlns", ns::SESSION)?;
                    w.end_tag()?;
                    w.end_tag()
                })?;
                self.pending_binds += 1;
                self.shared.transition(Phase::SessionEstablishing);
            } else {
                tracing::debug!(feature = %child.name, "feature ignored");
            }
        }

        if !self.shared.config.require_bind_confirmation || self.pending_binds == 0 {
            self.complete_login();
        }
        Ok(())
    }

    /// Handles a `bind_1` result.
    pub(crate) fn confirm_bind(&mut self) {
        self.pending_binds = self.pending_binds.saturating_sub(1);
        if self.pending_binds == 0 && !self.phase().is_ready() {
            self.complete_login();
        }
    }

    /// Moves to `Ready` and reports the login, once.
    pub(crate) fn complete_login(&mut self) {
        if self.phase().is_ready() {
            return;
        }
        self.shared.transition(Phase::Ready);
        let account = self.account();
        tracing::info!(jid = %self.shared.config.full_jid(), "logged in");
        self.listeners().emit(|l| l.on_auth(account));
    }

    pub(crate) fn handle_challenge(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        match self.phase() {
            Phase::SaslNegotiating => {
                self.step(3);
                let encoded = self.reader.element_text(&tag.name)?;
                let response = self.digest_response(&encoded)?;
                self.send(|w| {
                    w.start_tag("response")?;
                    w.attribute("xmlns", ns::SASL)?;
                    w.text(&response)?;
                    w.end_tag()
                })?;
                self.shared.transition(Phase::SaslChallenge);
            }
            Phase::SaslChallenge => {
                // rspauth; nothing to verify or compute.
                self.step(4);
                self.reader.element_text(&tag.name)?;
                self.send(|w| {
                    w.start_tag("response")?;
                    w.attribute("xmlns", ns::SASL)?;
                    w.end_tag()
                })?;
            }
            phase => {
                tracing::debug!(%phase, "unexpected challenge ignored");
                self.reader.skip_element(&tag.name)?;
            }
        }
        Ok(())
    }

    fn digest_response(&self, encoded: &str) -> Result<String, SessionError> {
        let challenge = sasl::decode_challenge(encoded).map_err(|e| match e {
            ProtocolError::InvalidSasl(reason) => {
                SessionError::AuthFailed(format!("invalid challenge: {reason}"))
            }
            other => SessionError::Protocol(other),
        })?;
        let nonce = sasl::challenge_param(&challenge, "nonce")
            .ok_or_else(|| SessionError::AuthFailed("challenge without nonce".into()))?;

        let config = &self.shared.config;
        let realm = sasl::challenge_param(&challenge, "realm").unwrap_or_else(|| config.host.clone());
        let cnonce = sasl::generate_cnonce();
        let digest_uri = config.digest_uri();

        Ok(sasl::digest_response(&sasl::DigestParams {
            username: &config.username,
            password: &config.password,
            realm: &realm,
            nonce: &nonce,
            cnonce: &cnonce,
            digest_uri: &digest_uri,
        }))
    }

    pub(crate) fn handle_success(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        if self.phase() != Phase::SaslChallenge {
            tracing::debug!(phase = %self.phase(), "unexpected success ignored");
            return Ok(self.reader.skip_element(&tag.name)?);
        }
        self.step(5);
        self.reader.element_text(&tag.name)?;
        self.shared.transition(Phase::SaslSuccess);

        self.open_stream()?;
        self.shared.transition(Phase::PostSaslStreamOpening);
        Ok(())
    }

    pub(crate) fn handle_failure(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        let condition = self.first_child_name(&tag.name)?;
        Err(self.rejection(condition))
    }

    /// Maps a server rejection to the error for this kind of session.
    pub(crate) fn rejection(&self, code: String) -> SessionError {
        if self.shared.config.register {
            SessionError::RegisterFailed(code)
        } else {
            SessionError::AuthFailed(code)
        }
    }

    fn send_legacy_auth(&self) -> Result<(), SessionError> {
        let config = &self.shared.config;
        self.send(|w| {
            w.start_tag("iq")?;
            w.attribute("type", "set")?;
            w.attribute("id", AUTH_ID)?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::AUTH)?;
            w.text_element("username", &config.username)?;
            w.text_element("password", &config.password)?;
            w.text_element("resource", &config.resource)?;
            w.end_tag()?;
            w.end_tag()
        })
    }

    pub(crate) fn send_register(&self) -> Result<(), SessionError> {
        let config = &self.shared.config;
        self.send(|w| {
            w.start_tag("iq")?;
            w.attribute("type", "set")?;
            w.attribute("id", AUTH_ID)?;
            w.start_tag("query")?;
            w.attribute("xmlns", ns::REGISTER)?;
            w.text_element("username", &config.username)?;
            w.text_element("password", &config.password)?;
            w.end_tag()?;
            w.end_tag()
        })
    }
}

//! Per-account connection parameters.

use serde::{Deserialize, Serialize};
use wren_transport::DEFAULT_PORT;

/// Everything a session needs to connect and log in. Immutable once the
/// session starts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// XMPP domain. Used for the stream `to`, the SASL realm fallback and
    /// the digest URI.
    pub host: String,

    /// Host to open the socket to, when different from `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// TCP port. 0 means 5222.
    pub port: u16,

    pub username: String,

    pub password: String,

    /// Resource to bind (default "wren").
    pub resource: String,

    /// Entity-capabilities node advertised in presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caps_node: Option<String>,

    /// Entity-capabilities version advertised in presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caps_version: Option<String>,

    /// Run an in-band registration instead of a login.
    pub register: bool,

    /// Account index reported in every listener event.
    pub account: usize,

    /// Use SASL DIGEST-MD5 when the server offers it. `false` forces
    /// legacy `jabber:iq:auth`.
    pub use_sasl: bool,

    /// Wait for the `bind_1` results before reporting success instead of
    /// reporting it as soon as the features block is answered.
    pub require_bind_confirmation: bool,

    /// Report raw XML traffic through `Listener::on_xml`.
    pub trace_xml: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            server: None,
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            resource: "wren".into(),
            caps_node: None,
            caps_version: None,
            register: false,
            account: 0,
            use_sasl: true,
            require_bind_confirmation: false,
            trace_xml: false,
        }
    }
}

impl SessionConfig {
    /// Creates a login config for `username@host`.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Socket address to dial: the server override (or host) and the
    /// port, with 0 mapped to 5222.
    pub fn connect_addr(&self) -> (&str, u16) {
        let host = self.server.as_deref().unwrap_or(&self.host);
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        (host, port)
    }

    /// `username@host`.
    pub fn jid(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// `username@host/resource`.
    pub fn full_jid(&self) -> String {
        wren_protocol::full_jid(&self.jid(), &self.resource)
    }

    /// DIGEST-MD5 `digest-uri` for this host.
    pub fn digest_uri(&self) -> String {
        format!("xmpp/{}", self.host)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("resource", &self.resource)
            .field("register", &self.register)
            .field("account", &self.account)
            .field("use_sasl", &self.use_sasl)
            .finish_non_exhaustive()
    }
}

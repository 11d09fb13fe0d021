//! Account files.
//!
//! An accounts file is TOML with one `[[accounts]]` table per account.
//! Every key of [`SessionConfig`] may appear in a table; missing keys
//! take their defaults. An optional `[client]` table sets the identity
//! reported to software-version queries, and `keepalive_secs` turns on
//! the keepalive ticker.
//!
//! ```toml
//! keepalive_secs = 60
//!
//! [client]
//! name = "echo-bot"
//! version = "0.1.0"
//!
//! [[accounts]]
//! host = "example.org"
//! username = "alice"
//! password = "secret"
//!
//! [[accounts]]
//! host = "example.net"
//! server = "xmpp.example.net"
//! username = "bob"
//! password = "hunter2"
//! use_sasl = false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wren_session::SessionConfig;

use crate::WrenError;

/// Identity announced by the bundled `ClientInfo` module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub name: String,
    pub version: String,
    /// Operating system string. Left out of version replies when empty.
    pub os: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            name: "wren".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            os: std::env::consts::OS.into(),
        }
    }
}

/// The parsed contents of an accounts file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsFile {
    /// Seconds between keepalive pings. 0 disables the ticker.
    pub keepalive_secs: u64,
    pub client: ClientSettings,
    pub accounts: Vec<SessionConfig>,
}

impl AccountsFile {
    /// Reads and validates an accounts file.
    ///
    /// # Errors
    /// [`WrenError::ConfigRead`] if the file cannot be read, otherwise
    /// the errors of [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WrenError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WrenError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), accounts = file.accounts.len(), "accounts loaded");
        Ok(file)
    }

    /// Parses and validates accounts from TOML text.
    ///
    /// Each account's `account` index is set to its position in the file,
    /// so listener events can be matched back to the table they came from.
    ///
    /// # Errors
    /// [`WrenError::ConfigParse`] for bad TOML and
    /// [`WrenError::InvalidAccount`] for an account without a host or
    /// username.
    pub fn from_toml_str(text: &str) -> Result<Self, WrenError> {
        let mut file: Self = toml::from_str(text)?;
        for (index, account) in file.accounts.iter_mut().enumerate() {
            validate(index, account)?;
            account.account = index;
        }
        Ok(file)
    }

    /// The keepalive interval, if enabled.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

/// Checks the fields a session cannot start without.
pub(crate) fn validate(index: usize, config: &SessionConfig) -> Result<(), WrenError> {
    let missing = if config.host.trim().is_empty() {
        "host"
    } else if config.username.trim().is_empty() {
        "username"
    } else {
        return Ok(());
    };
    Err(WrenError::InvalidAccount {
        index,
        reason: format!("{missing} is empty"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str_assigns_indices_and_defaults() {
        let file = AccountsFile::from_toml_str(
            r#"
            [[accounts]]
            host = "example.org"
            username = "alice"
            password = "secret"

            [[accounts]]
            host = "example.net"
            server = "xmpp.example.net"
            port = 5223
            username = "bob"
            use_sasl = false
            "#,
        )
        .expect("parse");

        assert_eq!(file.accounts.len(), 2);
        let alice = &file.accounts[0];
        assert_eq!(alice.account, 0);
        assert_eq!(alice.resource, "wren");
        assert!(alice.use_sasl);
        assert_eq!(alice.connect_addr(), ("example.org", 5222));

        let bob = &file.accounts[1];
        assert_eq!(bob.account, 1);
        assert!(!bob.use_sasl);
        assert_eq!(bob.connect_addr(), ("xmpp.example.net", 5223));
        assert_eq!(file.keepalive_interval(), None);
        assert_eq!(file.client, ClientSettings::default());
    }

    #[test]
    fn test_from_toml_str_overrides_explicit_account_index() {
        let file = AccountsFile::from_toml_str(
            r#"
            [[accounts]]
            host = "example.org"
            username = "alice"
            account = 7
            "#,
        )
        .expect("parse");
        assert_eq!(file.accounts[0].account, 0);
    }

    #[test]
    fn test_from_toml_str_client_and_keepalive() {
        let file = AccountsFile::from_toml_str(
            r#"
            keepalive_secs = 30

            [client]
            name = "echo-bot"
            "#,
        )
        .expect("parse");
        assert_eq!(file.keepalive_interval(), Some(Duration::from_secs(30)));
        assert_eq!(file.client.name, "echo-bot");
        assert_eq!(file.client.version, env!("CARGO_PKG_VERSION"));
        assert!(file.accounts.is_empty());
    }

    #[test]
    fn test_from_toml_str_missing_username_is_invalid() {
        let err = AccountsFile::from_toml_str(
            r#"
            [[accounts]]
            host = "example.org"
            username = "alice"

            [[accounts]]
            host = "example.org"
            "#,
        )
        .expect_err("second account has no username");
        assert!(matches!(err, WrenError::InvalidAccount { index: 1, .. }));
        assert_eq!(err.to_string(), "invalid account 1: username is empty");
    }

    #[test]
    fn test_from_toml_str_bad_type_is_parse_error() {
        let err = AccountsFile::from_toml_str("keepalive_secs = \"often\"")
            .expect_err("string is not a number");
        assert!(matches!(err, WrenError::ConfigParse(_)));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = AccountsFile::load("/nonexistent/wren/accounts.toml").expect_err("missing");
        match err {
            WrenError::ConfigRead { path, .. } => {
                assert!(path.ends_with("accounts.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! `ClientBuilder` and the connected `Client`.
//!
//! This is the entry point for applications. It ties the layers together:
//! transport → protocol → session, plus the bundled modules and the
//! optional keepalive ticker.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use wren_session::{Listener, Listeners, Module, ModuleRegistry, Session, SessionConfig, SessionHandle};
use wren_transport::{Connector, TcpConnector};

use crate::config::{validate, AccountsFile, ClientSettings};
use crate::keepalive::{Keepalive, KeepaliveConfig};
use crate::{ClientInfo, WrenError};

/// Builder for configuring and starting client sessions.
///
/// One builder can start any number of sessions; each gets its own
/// thread and shares the builder's listeners and modules.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use wren::prelude::*;
///
/// struct Greeter;
/// impl Listener for Greeter {
///     fn on_auth(&self, account: usize) {
///         println!("account {account} online");
///     }
/// }
///
/// let client = ClientBuilder::new()
///     .listener(Arc::new(Greeter))
///     .connect(SessionConfig::new("example.org", "alice", "secret"))?;
/// client.join();
/// # Ok::<(), WrenError>(())
/// ```
pub struct ClientBuilder {
    listeners: Listeners,
    modules: ModuleRegistry,
    client_info: Option<ClientSettings>,
    keepalive: Option<KeepaliveConfig>,
}

impl ClientBuilder {
    /// Creates a builder with the `ClientInfo` module enabled and no
    /// keepalive.
    pub fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            modules: ModuleRegistry::new(),
            client_info: Some(ClientSettings::default()),
            keepalive: None,
        }
    }

    /// Creates a builder using the `[client]` identity and keepalive
    /// setting of an accounts file.
    pub fn from_accounts_file(file: &AccountsFile) -> Self {
        let mut builder = Self::new().client_info(file.client.clone());
        if let Some(interval) = file.keepalive_interval() {
            builder = builder.keepalive(interval);
        }
        builder
    }

    /// Adds a listener to every session started afterwards.
    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds a module. Modules added here take precedence over the
    /// bundled `ClientInfo` module.
    pub fn module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.register(module);
        self
    }

    /// Sets the identity `ClientInfo` reports to version queries.
    pub fn client_info(mut self, settings: ClientSettings) -> Self {
        self.client_info = Some(settings);
        self
    }

    /// Leaves the `ClientInfo` module out.
    pub fn without_client_info(mut self) -> Self {
        self.client_info = None;
        self
    }

    /// Pings each session's host every `interval`.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(KeepaliveConfig::with_interval(interval));
        self
    }

    /// Sets the keepalive timing in full.
    pub fn keepalive_config(mut self, config: KeepaliveConfig) -> Self {
        self.keepalive = Some(config);
        self
    }

    /// Starts a session over plain TCP.
    ///
    /// # Errors
    /// See [`connect_with`](Self::connect_with).
    pub fn connect(&self, config: SessionConfig) -> Result<Client, WrenError> {
        self.connect_with(config, TcpConnector)
    }

    /// Starts a session over `connector`.
    ///
    /// Returns as soon as the session thread runs; connecting and login
    /// happen on that thread and are reported to the listeners.
    ///
    /// # Errors
    /// [`WrenError::InvalidAccount`] for a config without host or
    /// username, [`WrenError::Spawn`] if a thread cannot be created.
    pub fn connect_with<C: Connector>(
        &self,
        config: SessionConfig,
        connector: C,
    ) -> Result<Client, WrenError> {
        validate(config.account, &config)?;

        let mut modules = self.modules.clone();
        if let Some(settings) = &self.client_info {
            modules.register(Arc::new(ClientInfo::new(settings.clone())));
        }

        tracing::info!(account = config.account, jid = %config.jid(), "starting session");
        let handle = Session::new(config, connector)
            .with_listeners(self.listeners.clone())
            .with_modules(modules)
            .spawn()
            .map_err(WrenError::Spawn)?;

        let keepalive = self
            .keepalive
            .map(|config| Keepalive::start(handle.clone(), config))
            .transpose()?;

        Ok(Client {
            handle,
            keepalive: Mutex::new(keepalive),
        })
    }

    /// Starts one TCP session per account.
    ///
    /// # Errors
    /// Stops at the first account that fails to start. Sessions already
    /// started keep running.
    pub fn connect_all(
        &self,
        configs: impl IntoIterator<Item = SessionConfig>,
    ) -> Result<Vec<Client>, WrenError> {
        configs.into_iter().map(|c| self.connect(c)).collect()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A started session and its keepalive ticker.
pub struct Client {
    handle: SessionHandle,
    keepalive: Mutex<Option<Keepalive>>,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The session's handle, for sending stanzas and commands.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn account(&self) -> usize {
        self.handle.account()
    }

    /// Goes offline and stops the keepalive.
    pub fn logoff(&self) {
        self.stop_keepalive();
        self.handle.logoff();
    }

    /// Waits for the session thread to end, then stops the keepalive.
    pub fn join(&self) {
        self.handle.join();
        self.stop_keepalive();
    }

    fn stop_keepalive(&self) {
        let keepalive = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(keepalive) = keepalive {
            let sent = keepalive.stop();
            tracing::debug!(account = self.account(), sent, "keepalive stopped");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wren_session::{CommandOutcome, Phase};
    use wren_transport::MemoryConnector;

    #[test]
    fn test_connect_with_rejects_empty_host() {
        let config = SessionConfig::new("", "alice", "secret");
        let err = ClientBuilder::new()
            .connect_with(config, MemoryConnector::refusing())
            .expect_err("empty host");
        assert!(matches!(err, WrenError::InvalidAccount { index: 0, .. }));
    }

    #[test]
    fn test_connect_with_bundles_client_info() {
        let (connector, _log) = MemoryConnector::new("");
        let client = ClientBuilder::new()
            .connect_with(SessionConfig::new("example.org", "alice", "pw"), connector)
            .expect("connect");
        client.join();

        assert_eq!(client.handle().phase(), Phase::Closed);
        assert_eq!(
            client.handle().run_command("disco", &[]),
            CommandOutcome::Usage("disco <jid> [items|info] [id]".into())
        );
    }

    #[test]
    fn test_run_command_unknown_disco_kind_fails_without_teardown() {
        let (connector, _log) = MemoryConnector::new("");
        let client = ClientBuilder::new()
            .connect_with(SessionConfig::new("example.org", "alice", "pw"), connector)
            .expect("connect");
        client.join();

        assert_eq!(
            client.handle().run_command("disco", &["example.org", "bogus"]),
            CommandOutcome::Failed("module client-info failed: unknown disco kind 'bogus'".into())
        );
    }

    #[test]
    fn test_without_client_info_leaves_commands_unknown() {
        let (connector, _log) = MemoryConnector::new("");
        let client = ClientBuilder::new()
            .without_client_info()
            .connect_with(SessionConfig::new("example.org", "alice", "pw"), connector)
            .expect("connect");
        client.join();

        assert_eq!(
            client.handle().run_command("disco", &["example.org"]),
            CommandOutcome::Unknown
        );
    }

    #[test]
    fn test_from_accounts_file_picks_up_keepalive() {
        let file = AccountsFile::from_toml_str("keepalive_secs = 45").expect("parse");
        let builder = ClientBuilder::from_accounts_file(&file);
        assert_eq!(
            builder.keepalive.map(|k| k.interval),
            Some(Duration::from_secs(45))
        );
    }
}

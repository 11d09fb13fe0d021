//! Echo bot: logs every account of an accounts file in, accepts
//! subscription requests and echoes chat messages back to the sender.
//!
//! ```text
//! RUST_LOG=debug cargo run -p echo-bot -- demos/echo-bot/accounts.toml
//! ```

use std::collections::{HashMap, HashSet};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use wren::prelude::*;

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Accounts {
    handles: HashMap<usize, SessionHandle>,
    /// Logged in before their handle was attached.
    early: HashSet<usize>,
}

#[derive(Default)]
struct EchoBot {
    accounts: Mutex<Accounts>,
}

impl EchoBot {
    /// Registers a started client. A login that already happened is
    /// greeted now.
    fn attach(&self, client: &Client) {
        let account = client.account();
        let greet_now = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            accounts.handles.insert(account, client.handle().clone());
            accounts.early.remove(&account)
        };
        if greet_now {
            greet(client.handle());
        }
    }

    fn handle(&self, account: usize) -> Option<SessionHandle> {
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        accounts.handles.get(&account).cloned()
    }

    fn with_handle(&self, account: usize, f: impl FnOnce(&SessionHandle)) {
        match self.handle(account) {
            Some(handle) => f(&handle),
            None => tracing::warn!(account, "event for an unknown account"),
        }
    }
}

/// Goes online and asks for the roster.
fn greet(handle: &SessionHandle) {
    handle.send_presence(&Presence::default());
    handle.request_roster();
}

impl Listener for EchoBot {
    fn on_auth(&self, account: usize) {
        tracing::info!(account, "online");
        let handle = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            let handle = accounts.handles.get(&account).cloned();
            if handle.is_none() {
                accounts.early.insert(account);
            }
            handle
        };
        match handle {
            Some(handle) => greet(&handle),
            None => tracing::debug!(account, "logged in before attach, greeting deferred"),
        }
    }

    fn on_auth_failed(&self, account: usize, code: &str) {
        tracing::error!(account, code, "login rejected");
    }

    fn on_conn_failed(&self, account: usize) {
        tracing::warn!(account, "connection lost");
    }

    fn on_contact_event(&self, account: usize, contact: &Contact) {
        tracing::info!(account, jid = %contact.jid, group = %contact.group, "contact");
    }

    fn on_subscribe_event(&self, account: usize, jid: &str) {
        tracing::info!(account, jid, "accepting subscription");
        self.with_handle(account, |h| {
            h.send_presence(&Presence {
                to: Some(jid.to_owned()),
                kind: Some("subscribed".into()),
                ..Presence::default()
            });
        });
    }

    fn on_message_event(&self, account: usize, message: &IncomingMessage) {
        let Some(body) = message.body.as_deref().filter(|b| !b.is_empty()) else {
            return;
        };
        if !matches!(message.kind.as_deref(), None | Some("chat" | "normal")) {
            return;
        }
        tracing::info!(account, from = %message.from, body, "echo");
        let reply = OutgoingMessage {
            resource: Some(message.resource.clone()).filter(|r| !r.is_empty()),
            ..OutgoingMessage::chat(message.from.clone(), body)
        };
        self.with_handle(account, |h| h.send_message(&reply));
    }

    fn on_module_event(&self, account: usize, event: &ModuleEvent) {
        tracing::info!(account, kind = %event.kind, from = %event.from, "module event");
    }

    fn net_panic(&self, account: usize, message: &str) {
        tracing::error!(account, reason = message, "session aborted");
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn run(path: &str) -> Result<(), WrenError> {
    let file = AccountsFile::load(path)?;
    let bot = Arc::new(EchoBot::default());

    let builder = ClientBuilder::from_accounts_file(&file).listener(bot.clone());
    let mut clients = Vec::with_capacity(file.accounts.len());
    for account in file.accounts.iter().cloned() {
        let client = builder.connect(account)?;
        bot.attach(&client);
        clients.push(client);
    }

    for client in &clients {
        client.join();
    }
    Ok(())
}

fn main() -> ExitCode {
    wren::telemetry::init("info");
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "accounts.toml".into());

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "echo-bot failed");
            ExitCode::FAILURE
        }
    }
}

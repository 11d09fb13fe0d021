//! The session engine: one thread per account.
//!
//! [`Session`] collects the configuration, listeners and modules, then
//! [`spawn`](Session::spawn) starts a dedicated thread that connects,
//! negotiates the stream, authenticates and runs the stanza loop until
//! the stream ends. Everything after the spawn is observed through
//! listeners and driven through the returned [`SessionHandle`].
//!
//! # Shutdown
//!
//! The thread always ends by mapping its outcome onto exactly one
//! terminal event:
//!
//! | outcome                                  | event                     |
//! |------------------------------------------|---------------------------|
//! | socket, I/O or stream error, server EOF  | `on_conn_failed`          |
//! | SASL `<failure>` or auth IQ error        | `on_auth_failed`          |
//! | registration rejected                    | `on_register_failed`      |
//! | malformed stanza                         | `net_panic`               |
//! | logoff, registration answered            | none                      |

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use wren_protocol::{ns, StartTag, Token, XmlReader, XmlWriter};
use wren_transport::{Connection, Connector};

use crate::{
    Listener, Listeners, Module, ModuleRegistry, Outbound, Phase, SessionConfig,
    SessionError, SessionHandle, StreamReader, XmlDirection,
};

/// State shared between the session thread and its handles.
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) out: Outbound,
    pub(crate) modules: ModuleRegistry,
    phase: Mutex<Phase>,
}

impl Shared {
    pub(crate) fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        self.out.listeners()
    }

    /// Moves to `next`, logging transitions the state machine does not
    /// expect.
    pub(crate) fn transition(&self, next: Phase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == next {
            return;
        }
        if !phase.can_transition_to(next) {
            tracing::warn!(from = %*phase, to = %next, "unexpected phase transition");
        }
        tracing::debug!(from = %*phase, to = %next, "phase");
        *phase = next;
    }
}

/// A session that has not started yet.
///
/// ```no_run
/// use std::sync::Arc;
/// use wren_session::{Listener, Session, SessionConfig};
/// use wren_transport::TcpConnector;
///
/// struct Print;
/// impl Listener for Print {
///     fn on_auth(&self, account: usize) {
///         println!("account {account} is online");
///     }
/// }
///
/// let config = SessionConfig::new("example.org", "alice", "secret");
/// let handle = Session::new(config, TcpConnector)
///     .with_listener(Arc::new(Print))
///     .spawn()
///     .expect("spawn session thread");
/// handle.join();
/// ```
pub struct Session<C> {
    config: SessionConfig,
    connector: C,
    listeners: Listeners,
    modules: ModuleRegistry,
}

impl<C: Connector> Session<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            listeners: Listeners::new(),
            modules: ModuleRegistry::new(),
        }
    }

    /// Appends a listener. Listeners are called in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Appends a module. For a namespace or command claimed by several
    /// modules, the first registered wins.
    pub fn with_module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.register(module);
        self
    }

    /// Replaces the listeners wholesale.
    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Replaces the modules wholesale.
    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    /// Starts the session thread.
    ///
    /// # Errors
    /// Only if the OS refuses to create the thread. Connection problems
    /// are reported through `on_conn_failed`.
    pub fn spawn(self) -> io::Result<SessionHandle> {
        let account = self.config.account;
        let trace_xml = self.config.trace_xml;
        let shared = Arc::new(Shared {
            out: Outbound::new(account, self.listeners, trace_xml),
            config: self.config,
            modules: self.modules,
            phase: Mutex::new(Phase::Connecting),
        });

        let thread_shared = Arc::clone(&shared);
        let connector = self.connector;
        let thread = thread::Builder::new()
            .name(format!("wren-session-{account}"))
            .spawn(move || run(thread_shared, connector))?;

        Ok(SessionHandle::new(shared, thread))
    }
}

/// How the stanza loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// The engine finished its job (registration answered).
    Finished,
    /// The server closed the stream or the socket reached EOF.
    StreamClosed,
}

fn run<C: Connector>(shared: Arc<Shared>, connector: C) {
    let span = tracing::info_span!(
        "session",
        account = shared.config.account,
        conn = tracing::field::Empty
    );
    let _enter = span.enter();

    let outcome = Engine::connect(&shared, &connector, &span).and_then(|mut engine| engine.run());
    finish(&shared, outcome);
}

fn finish(shared: &Shared, outcome: Result<Ending, SessionError>) {
    let account = shared.config.account;
    let out = &shared.out;

    match outcome {
        Ok(Ending::Finished) => {
            tracing::info!("session finished");
            out.shut_down();
        }
        Ok(Ending::StreamClosed) if out.is_logged_off() => {
            tracing::info!("logged off");
            out.shut_down();
        }
        Ok(Ending::StreamClosed) => {
            tracing::warn!("server closed the stream");
            out.fail_connection();
        }
        Err(SessionError::AuthFailed(code)) => {
            tracing::info!(%code, "authentication failed");
            out.shut_down();
            shared.listeners().emit(|l| l.on_auth_failed(account, &code));
        }
        Err(SessionError::RegisterFailed(code)) => {
            tracing::info!(%code, "registration failed");
            out.shut_down();
            shared.listeners().emit(|l| l.on_register_failed(account, &code));
        }
        Err(e @ (SessionError::Malformed(_) | SessionError::Module { .. })) => {
            tracing::error!(error = %e, "session aborted");
            out.shut_down();
            let message = e.to_string();
            shared.listeners().emit(|l| l.net_panic(account, &message));
        }
        Err(e) if out.is_logged_off() => {
            tracing::debug!(error = %e, "connection ended after logoff");
            out.shut_down();
        }
        Err(e) => {
            tracing::warn!(error = %e, "connection failed");
            out.fail_connection();
        }
    }

    shared.transition(Phase::Closed);
}

/// The read side of a running session. Lives on the session thread.
pub(crate) struct Engine {
    pub(crate) shared: Arc<Shared>,
    pub(crate) reader: StreamReader,
    /// `bind_1` requests still waiting for a result.
    pub(crate) pending_binds: usize,
}

impl Engine {
    fn connect<C: Connector>(
        shared: &Arc<Shared>,
        connector: &C,
        span: &tracing::Span,
    ) -> Result<Self, SessionError> {
        let config = &shared.config;
        let (host, port) = config.connect_addr();
        tracing::info!(%host, port, jid = %config.jid(), "connecting");

        let connection = connector.connect(host, port)?;
        span.record("conn", tracing::field::display(connection.id()));

        let mut reader = XmlReader::new(connection.reader()?);
        reader.set_capture(config.trace_xml);
        let writer = XmlWriter::new(connection.writer()?);
        let connection: Arc<dyn Connection> = Arc::new(connection);
        shared.out.attach(writer, connection);

        let engine = Self {
            shared: Arc::clone(shared),
            reader,
            pending_binds: 0,
        };
        engine.step(1);
        engine.open_stream()?;
        engine.shared.transition(Phase::StreamOpening);

        if config.register {
            engine.send_register()?;
            engine.shared.transition(Phase::RegisterRequest);
        }
        Ok(engine)
    }

    fn run(&mut self) -> Result<Ending, SessionError> {
        loop {
            match self.reader.next_token()? {
                Token::StartTag(tag) => {
                    self.dispatch(tag)?;
                    self.trace_inbound();
                    if self.phase() == Phase::Closed {
                        return Ok(Ending::Finished);
                    }
                }
                Token::EndTag(name) if name == "stream:stream" => {
                    self.trace_inbound();
                    return Ok(Ending::StreamClosed);
                }
                Token::EndTag(name) => {
                    tracing::debug!(tag = %name, "stray end tag");
                }
                Token::Text(_) => {}
                Token::EndOfStream => return Ok(Ending::StreamClosed),
            }
        }
    }

    fn dispatch(&mut self, tag: StartTag) -> Result<(), SessionError> {
        match tag.name.as_str() {
            // Stream headers mark a new stream generation; their
            // children are the rest of the session.
            "stream:stream" => {
                tracing::debug!(id = tag.attr("id").unwrap_or(""), "stream opened by server");
                Ok(())
            }
            "stream:features" => self.handle_features(&tag),
            "stream:error" => self.handle_stream_error(&tag),
            "challenge" => self.handle_challenge(&tag),
            "success" => self.handle_success(&tag),
            "failure" => self.handle_failure(&tag),
            "message" => self.handle_message(&tag),
            "presence" => self.handle_presence(&tag),
            "iq" => self.handle_iq(&tag),
            other => {
                tracing::debug!(tag = other, "ignoring top-level element");
                Ok(self.reader.skip_element(other)?)
            }
        }
    }

    fn handle_stream_error(&mut self, tag: &StartTag) -> Result<(), SessionError> {
        let condition = self.first_child_name(&tag.name)?;
        Err(SessionError::Stream(condition))
    }

    /// Consumes an element and returns the name of its first child, or
    /// an empty string.
    pub(crate) fn first_child_name(&mut self, parent: &str) -> Result<String, SessionError> {
        let mut first = None;
        while let Some(child) = self.reader.next_child(parent)? {
            self.reader.skip_element(&child.name)?;
            first.get_or_insert(child.name);
        }
        Ok(first.unwrap_or_default())
    }

    pub(crate) fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub(crate) fn account(&self) -> usize {
        self.shared.config.account
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        self.shared.listeners()
    }

    pub(crate) fn step(&self, step: u8) {
        let account = self.account();
        tracing::debug!(step, "login step");
        self.listeners().emit(|l| l.on_step(account, step));
    }

    pub(crate) fn send(
        &self,
        build: impl FnOnce(&mut crate::StreamWriter) -> io::Result<()>,
    ) -> Result<(), SessionError> {
        self.shared.out.send(build)
    }

    /// Writes the opening `<stream:stream>`. It stays open until logoff.
    pub(crate) fn open_stream(&self) -> Result<(), SessionError> {
        let config = &self.shared.config;
        self.send(|w| {
            w.start_tag("stream:stream")?;
            w.attribute("to", config.host.as_str())?;
            w.attribute("xmlns", ns::JABBER_CLIENT)?;
            if !config.register {
                w.attribute("version", "1.0")?;
            }
            w.attribute("xmlns:stream", ns::STREAMS)
        })
    }

    fn trace_inbound(&mut self) {
        let Some(xml) = self.reader.take_capture() else {
            return;
        };
        let xml = xml.trim();
        if xml.is_empty() {
            return;
        }
        tracing::trace!(%xml, "received");
        let account = self.account();
        self.listeners()
            .emit(|l| l.on_xml(account, XmlDirection::Inbound, xml));
    }
}

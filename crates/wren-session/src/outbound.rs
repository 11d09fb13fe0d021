//! The write half of a session.
//!
//! [`Outbound`] owns the session's [`StreamWriter`] behind a mutex so the
//! session thread, modules and [`SessionHandle`](crate::SessionHandle)
//! callers on other threads can all send stanzas. Each send runs under
//! the lock and ends with a flush, so stanzas never interleave on the
//! wire.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use wren_transport::Connection;

use crate::{Listeners, SessionError, StreamWriter, XmlDirection};

pub struct Outbound {
    account: usize,
    listeners: Listeners,
    trace_xml: bool,
    writer: Mutex<Option<StreamWriter>>,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    failed: AtomicBool,
    logged_off: AtomicBool,
}

impl Outbound {
    pub(crate) fn new(account: usize, listeners: Listeners, trace_xml: bool) -> Self {
        Self {
            account,
            listeners,
            trace_xml,
            writer: Mutex::new(None),
            connection: Mutex::new(None),
            failed: AtomicBool::new(false),
            logged_off: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> usize {
        self.account
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Returns `true` while a writer is attached.
    pub fn is_connected(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Writes one stanza with `build` and flushes it.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] when no writer is attached, or the
    /// I/O error that interrupted the write.
    pub fn send(
        &self,
        build: impl FnOnce(&mut StreamWriter) -> io::Result<()>,
    ) -> Result<(), SessionError> {
        let traced = {
            let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;
            build(writer)?;
            writer.flush()?;
            writer.take_capture()
        };

        // The lock is released before listeners run so they may send.
        if let Some(xml) = traced.filter(|xml| !xml.is_empty()) {
            tracing::trace!(%xml, "sent");
            let account = self.account;
            self.listeners
                .emit(|l| l.on_xml(account, XmlDirection::Outbound, &xml));
        }
        Ok(())
    }

    /// Like [`send`](Self::send), but never fails: a write fault tears the
    /// connection down and reports `on_conn_failed`, and a send on a
    /// closed session is logged and dropped.
    pub fn deliver(
        &self,
        op: &'static str,
        build: impl FnOnce(&mut StreamWriter) -> io::Result<()>,
    ) {
        match self.send(build) {
            Ok(()) => {}
            Err(SessionError::NotConnected) => {
                tracing::warn!(account = self.account, op, "session not connected, dropped");
            }
            Err(e) => {
                tracing::warn!(account = self.account, op, error = %e, "write failed");
                self.fail_connection();
            }
        }
    }

    pub(crate) fn attach(&self, mut writer: StreamWriter, connection: Arc<dyn Connection>) {
        writer.set_capture(self.trace_xml);
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    /// Drops the writer and closes the socket. Idempotent.
    pub(crate) fn detach(&self) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close() {
                tracing::debug!(conn = %connection.id(), error = %e, "close failed");
            }
        }
    }

    /// Closes the connection and fires `on_conn_failed`, at most once per
    /// session. Does nothing after a logoff.
    pub(crate) fn fail_connection(&self) {
        if self.logged_off.load(Ordering::SeqCst) || self.failed.swap(true, Ordering::SeqCst) {
            self.detach();
            return;
        }
        self.detach();
        let account = self.account;
        self.listeners.emit(|l| l.on_conn_failed(account));
    }

    /// Closes the connection without any connection-failed report. Used
    /// when the session ends on a server verdict.
    pub(crate) fn shut_down(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.detach();
    }

    pub(crate) fn mark_logged_off(&self) {
        self.logged_off.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_logged_off(&self) -> bool {
        self.logged_off.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("account", &self.account)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use wren_protocol::XmlWriter;
    use wren_transport::{Connector, MemoryConnector};

    use super::*;
    use crate::Listener;

    #[derive(Default)]
    struct Counter {
        conn_failed: AtomicUsize,
        xml: Mutex<Vec<String>>,
    }

    impl Listener for Counter {
        fn on_conn_failed(&self, _account: usize) {
            self.conn_failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_xml(&self, _account: usize, _direction: XmlDirection, content: &str) {
            self.xml.lock().expect("lock").push(content.to_owned());
        }
    }

    fn listening(trace: bool) -> (Outbound, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let mut listeners = Listeners::new();
        listeners.push(counter.clone());
        (Outbound::new(0, listeners, trace), counter)
    }

    /// Attaches a memory connection, optionally closed before use.
    fn attach_memory(out: &Outbound, closed: bool) -> wren_transport::SentLog {
        let (connector, log) = MemoryConnector::new("");
        let connection = connector.connect("example.org", 5222).expect("connect");
        let writer = XmlWriter::new(connection.writer().expect("writer"));
        if closed {
            connection.close().expect("close");
        }
        out.attach(writer, Arc::new(connection));
        log
    }

    #[test]
    fn test_send_writes_and_flushes() {
        let (out, _counter) = listening(false);
        let log = attach_memory(&out, false);
        out.send(|w| {
            w.start_tag("presence")?;
            w.end_tag()
        })
        .expect("send");
        assert_eq!(log.contents(), "<presence/>");
    }

    #[test]
    fn test_send_reports_trace_when_enabled() {
        let (out, counter) = listening(true);
        attach_memory(&out, false);
        out.send(|w| w.text_element("iq", "")).expect("send");
        assert_eq!(*counter.xml.lock().expect("lock"), vec!["<iq></iq>".to_owned()]);
    }

    #[test]
    fn test_send_without_writer_is_not_connected() {
        let (out, _counter) = listening(false);
        let err = out.send(|w| w.start_tag("x")).expect_err("should fail");
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[test]
    fn test_deliver_write_fault_fires_conn_failed_once() {
        let (out, counter) = listening(false);
        attach_memory(&out, true);

        out.deliver("test", |w| w.text_element("a", "b"));
        out.deliver("test", |w| w.text_element("a", "b"));
        assert_eq!(counter.conn_failed.load(Ordering::SeqCst), 1);
        assert!(!out.is_connected());
    }

    #[test]
    fn test_fail_connection_after_logoff_is_silent() {
        let (out, counter) = listening(false);
        let log = attach_memory(&out, false);
        out.mark_logged_off();
        out.fail_connection();
        assert_eq!(counter.conn_failed.load(Ordering::SeqCst), 0);
        assert!(log.is_closed());
    }
}

//! In-memory transport that replays a scripted server stream.
//!
//! By default the reader yields the script bytes and then reports
//! end-of-stream, so a session driven by a [`MemoryConnector`] always
//! terminates once the script is exhausted. A [`held`](MemoryConnector::held)
//! connector instead keeps the stream open after the script until the
//! connection is closed, like an idle server. Everything the client
//! writes is captured in a [`SentLog`] that stays readable after the
//! session has ended.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::{
    ByteReader, ByteWriter, Connection, ConnectionId, Connector,
    TransportError,
};

/// Shared view of what the client sent over a [`MemoryConnection`].
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    bytes: Arc<Mutex<Vec<u8>>>,
    closed: Arc<(Mutex<bool>, Condvar)>,
}

impl SentLog {
    /// Returns everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Returns `true` once the connection has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_closed(&self) {
        let (flag, changed) = &*self.closed;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        changed.notify_all();
    }

    fn wait_closed(&self) {
        let (flag, changed) = &*self.closed;
        let mut closed = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*closed {
            closed = changed.wait(closed).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A one-shot [`Connector`] over a scripted byte stream.
pub struct MemoryConnector {
    connection: Mutex<Option<MemoryConnection>>,
    refuse: bool,
}

impl MemoryConnector {
    /// Creates a connector whose single connection replays `script` and
    /// then ends the stream.
    pub fn new(script: impl Into<Vec<u8>>) -> (Self, SentLog) {
        Self::scripted(script.into(), false)
    }

    /// Like [`new`](Self::new), but reads block after the script until
    /// the connection is closed.
    pub fn held(script: impl Into<Vec<u8>>) -> (Self, SentLog) {
        Self::scripted(script.into(), true)
    }

    fn scripted(script: Vec<u8>, hold_open: bool) -> (Self, SentLog) {
        let log = SentLog::default();
        let connection = MemoryConnection {
            id: ConnectionId::next("memory"),
            script: Mutex::new(Some(script)),
            hold_open,
            log: log.clone(),
        };
        let connector = Self {
            connection: Mutex::new(Some(connection)),
            refuse: false,
        };
        (connector, log)
    }

    /// Creates a connector that fails every connect attempt.
    pub fn refusing() -> Self {
        Self {
            connection: Mutex::new(None),
            refuse: true,
        }
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, TransportError> {
        if self.refuse {
            return Err(TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source: io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "memory connector refuses connections",
                ),
            });
        }
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyTaken)
    }
}

/// A scripted connection produced by [`MemoryConnector`].
pub struct MemoryConnection {
    id: ConnectionId,
    script: Mutex<Option<Vec<u8>>>,
    hold_open: bool,
    log: SentLog,
}

impl Connection for MemoryConnection {
    fn reader(&self) -> Result<ByteReader, TransportError> {
        let script = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyTaken)?;
        if self.hold_open {
            return Ok(Box::new(HeldReader {
                script: Cursor::new(script),
                log: self.log.clone(),
            }));
        }
        Ok(Box::new(Cursor::new(script)))
    }

    fn writer(&self) -> Result<ByteWriter, TransportError> {
        Ok(Box::new(LogWriter {
            log: self.log.clone(),
        }))
    }

    fn close(&self) -> Result<(), TransportError> {
        self.log.mark_closed();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Replays the script, then blocks until the connection is closed.
struct HeldReader {
    script: Cursor<Vec<u8>>,
    log: SentLog,
}

impl Read for HeldReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.script.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.log.wait_closed();
        }
        Ok(n)
    }
}

/// Appends to the shared log until the connection is closed.
struct LogWriter {
    log: SentLog,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.log.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory connection closed",
            ));
        }
        self.log
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_memory_connection_replays_script_then_eof() {
        let (connector, _log) = MemoryConnector::new("<a/>");
        let conn = connector.connect("example.org", 5222).expect("connect");
        let mut reader = conn.reader().expect("reader");

        let mut out = String::new();
        reader.read_to_string(&mut out).expect("read");
        assert_eq!(out, "<a/>");
    }

    #[test]
    fn test_held_connection_blocks_until_closed() {
        let (connector, log) = MemoryConnector::held("<a/>");
        let conn = Arc::new(connector.connect("example.org", 5222).expect("connect"));
        let mut reader = conn.reader().expect("reader");

        let closer = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                conn.close().expect("close");
            })
        };

        let mut out = String::new();
        reader.read_to_string(&mut out).expect("read");
        assert_eq!(out, "<a/>");
        assert!(log.is_closed());
        closer.join().expect("closer thread");
    }

    #[test]
    fn test_connection_id_names_memory_transport() {
        let (connector, _log) = MemoryConnector::new("");
        let conn = connector.connect("example.org", 5222).expect("connect");
        assert_eq!(conn.id().transport(), "memory");
    }

    #[test]
    fn test_memory_connection_records_writes() {
        let (connector, log) = MemoryConnector::new("");
        let conn = connector.connect("example.org", 5222).expect("connect");
        let mut writer = conn.writer().expect("writer");

        writer.write_all(b"<presence/>").expect("write");
        assert_eq!(log.contents(), "<presence/>");
    }

    #[test]
    fn test_memory_connection_write_after_close_is_broken_pipe() {
        let (connector, log) = MemoryConnector::new("");
        let conn = connector.connect("example.org", 5222).expect("connect");
        let mut writer = conn.writer().expect("writer");

        conn.close().expect("close");
        assert!(log.is_closed());
        let err = writer.write_all(b"x").expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_memory_connector_is_one_shot() {
        let (connector, _log) = MemoryConnector::new("");
        let _first = connector.connect("example.org", 5222).expect("connect");
        let second = connector.connect("example.org", 5222);
        assert!(matches!(second, Err(TransportError::AlreadyTaken)));
    }

    #[test]
    fn test_refusing_connector_reports_connect_failed() {
        let connector = MemoryConnector::refusing();
        let result = connector.connect("example.org", 5222);
        assert!(matches!(
            result,
            Err(TransportError::ConnectFailed { .. })
        ));
    }
}

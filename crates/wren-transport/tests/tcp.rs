//! Integration tests for the TCP transport.
//!
//! These tests spin up a real loopback listener to verify that bytes
//! flow in both directions and that `close` unblocks a pending read.

#[cfg(feature = "tcp")]
mod tcp {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use wren_transport::{Connection, Connector, TcpConnector, TransportError};

    #[test]
    fn test_tcp_connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
        let port = listener.local_addr().expect("local addr").port();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("should accept");
            socket.write_all(b"hello from server").expect("server write");
            let mut buf = [0u8; 17];
            socket.read_exact(&mut buf).expect("server read");
            buf
        });

        let conn = TcpConnector
            .connect("127.0.0.1", port)
            .expect("should connect");
        assert_eq!(conn.id().transport(), "tcp");

        let mut reader = conn.reader().expect("reader");
        let mut writer = conn.writer().expect("writer");

        let mut buf = [0u8; 17];
        reader.read_exact(&mut buf).expect("client read");
        assert_eq!(&buf, b"hello from server");

        writer.write_all(b"hello from client").expect("client write");
        writer.flush().expect("flush");

        let received = server.join().expect("server thread");
        assert_eq!(&received, b"hello from client");
    }

    #[test]
    fn test_tcp_close_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
        let port = listener.local_addr().expect("local addr").port();

        // Keep the server socket open without writing anything.
        let server = thread::spawn(move || listener.accept().expect("accept"));

        let conn = TcpConnector
            .connect("127.0.0.1", port)
            .expect("should connect");
        let mut reader = conn.reader().expect("reader");
        let _server_socket = server.join().expect("server thread");

        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        conn.close().expect("close");
        let result = blocked.join().expect("reader thread");
        // Shutdown surfaces as EOF (Ok(0)) or an error, never as data.
        assert!(matches!(result, Ok(0) | Err(_)));
    }

    #[test]
    fn test_tcp_connect_refused_reports_address() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };

        let err = TcpConnector
            .connect("127.0.0.1", port)
            .err()
            .expect("connect should fail");
        match err {
            TransportError::ConnectFailed { addr, .. } => {
                assert_eq!(addr, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

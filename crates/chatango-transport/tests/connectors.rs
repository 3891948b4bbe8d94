//! Integration tests for the connectors.
//!
//! The TCP tests open a real loopback listener so bytes actually cross a
//! socket; the memory tests check that the listener side sees exactly what
//! the client wrote.

use std::time::Duration;

use chatango_transport::{
    Connector, MemoryConnector, TcpConnector, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_tcp_connect_send_and_receive() {
    // "127.0.0.1:0" lets the OS pick a free port.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("should accept");
        let mut buf = [0u8; 5];
        sock.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bauth");
        sock.write_all(b"ok\r\n\0").await.unwrap();
    });

    let conn = TcpConnector::default()
        .connect(&addr)
        .await
        .expect("should connect");
    assert_eq!(conn.peer(), addr);

    let (mut reader, mut writer) = conn.split();
    writer.send(b"bauth").await.expect("send should succeed");

    let mut received = Vec::new();
    while received.len() < 5 {
        let chunk = reader
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, b"ok\r\n\0");

    server.await.unwrap();
}

#[tokio::test]
async fn test_tcp_recv_returns_none_when_server_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        drop(sock);
    });

    let conn = TcpConnector::default().connect(&addr).await.unwrap();
    let (mut reader, _writer) = conn.split();
    server.await.unwrap();

    let result = reader.recv().await.expect("recv should not error");
    assert!(result.is_none(), "should return None on server close");
}

#[tokio::test]
async fn test_tcp_connect_refused_reports_address() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = TcpConnector::new(Duration::from_secs(2))
        .connect(&addr)
        .await;

    match result {
        Err(TransportError::ConnectFailed { addr: failed, .. }) => {
            assert_eq!(failed, addr);
        }
        Err(other) => panic!("expected ConnectFailed, got {other:?}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_memory_connector_delivers_server_end() {
    let (connector, listener) = MemoryConnector::pair();

    let conn = connector.connect("s5.example:443").await.unwrap();
    let (addr, mut server) = listener.accept().await.expect("should accept");
    assert_eq!(addr, "s5.example:443");

    let (mut reader, mut writer) = conn.split();
    writer.send(b"hello\0").await.unwrap();

    let mut buf = [0u8; 6];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello\0");

    server.write_all(b"inited\r\n\0").await.unwrap();
    let chunk = reader.recv().await.unwrap().unwrap();
    assert_eq!(chunk, b"inited\r\n\0");
}

#[tokio::test]
async fn test_memory_connector_fails_after_listener_dropped() {
    let (connector, listener) = MemoryConnector::pair();
    drop(listener);

    let result = connector.connect("s5.example:443").await;
    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}

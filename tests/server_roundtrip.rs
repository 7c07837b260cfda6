#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests for connections, the RPC helpers and the TCP server

use longerpull::config::{LongerpullConfig, PROTOCOL_VERSION};
use longerpull::core::codec::{Frame, MessageCodec};
use longerpull::error::ProtocolError;
use longerpull::protocol::dispatcher::Dispatcher;
use longerpull::protocol::message::RpcRequest;
use longerpull::protocol::rpc;
use longerpull::transport::{Connection, Server};
use longerpull::utils::metrics::Metrics;

use bytes::BytesMut;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> LongerpullConfig {
    LongerpullConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
        c.server.shutdown_timeout = Duration::from_secs(2);
    })
}

fn commands() -> Dispatcher {
    let dispatcher = Dispatcher::new();
    dispatcher
        .register("add", |args| {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .unwrap();
    let active = |_: &Value| Ok::<_, ProtocolError>(json!({"active": true}));
    dispatcher.register("check_activation", active).unwrap();
    dispatcher
}

#[tokio::test]
async fn test_in_memory_handshake_and_message() {
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let mut server = Connection::accept(server_io, "memory", &config, metrics.clone());
    let mut client = Connection::handshake(client_io, "memory", &config, metrics.clone())
        .await
        .expect("handshake");

    let hello = json!({"hello": "world"});
    client.send_message(5, &hello).await.unwrap();
    let (msg_id, value): (u32, Value) = server.recv_message().await.unwrap();
    assert_eq!(msg_id, 5);
    assert_eq!(value, hello);

    let reboot = json!({"op": "reboot"});
    rpc::call(&mut server, 99, reboot).await.unwrap();
    let (poll_id, request): (u32, RpcRequest) = client.recv_message().await.unwrap();
    assert_eq!(poll_id, 99);
    assert_eq!(request.request, json!({"op": "reboot"}));
    assert!(request.response_queue.is_none());

    let snap = metrics.snapshot();
    assert_eq!(snap.messages_sent, 2);
    assert_eq!(snap.messages_received, 2);
}

#[tokio::test]
async fn test_connection_display() {
    let config = test_config();
    let (_client_io, server_io) = tokio::io::duplex(1024);
    let metrics = Arc::new(Metrics::new());
    let conn = Connection::accept(server_io, "10.0.0.1:5000", &config, metrics);

    let shown = conn.to_string();
    assert!(shown.starts_with("<Connection [10.0.0.1:5000] ident:"));
    assert!(shown.ends_with(&format!("ident:{}>", conn.ident())));
}

#[tokio::test]
async fn test_peer_close_yields_connection_closed() {
    let config = test_config();
    let (client_io, server_io) = tokio::io::duplex(1024);
    let mut server = Connection::accept(server_io, "memory", &config, Arc::new(Metrics::new()));

    let client = Connection::handshake(client_io, "memory", &config, Arc::new(Metrics::new()))
        .await
        .unwrap();
    drop(client);

    let result = tokio::time::timeout(WAIT, server.recv_frame()).await.unwrap();
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn test_reader_pauses_when_queue_full() {
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (mut client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut server = Connection::accept(server_io, "memory", &config, metrics.clone());

    let mut wire = BytesMut::from(&[PROTOCOL_VERSION][..]);
    let mut codec = MessageCodec::new();
    for id in 1..=3u32 {
        codec
            .encode(Frame::new(id, b"null".to_vec(), false), &mut wire)
            .unwrap();
    }
    client_io.write_all(&wire).await.unwrap();

    // pause_threshold = 1: the second frame cannot be queued until the first is taken
    let deadline = tokio::time::Instant::now() + WAIT;
    while metrics.snapshot().pause_count == 0 {
        assert!(tokio::time::Instant::now() < deadline, "reader never paused");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for expected in 1..=3u32 {
        let frame = tokio::time::timeout(WAIT, server.recv_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.msg_id, expected);
    }

    let snap = metrics.snapshot();
    assert_eq!(snap.recv_enqueue, 3);
    assert_eq!(snap.recv_dequeue + snap.recv_wait, 3);
}

fn encode_frame(msg_id: u32) -> BytesMut {
    let mut wire = BytesMut::new();
    MessageCodec::new()
        .encode(Frame::new(msg_id, b"null".to_vec(), false), &mut wire)
        .unwrap();
    wire
}

async fn wait_until(metrics: &Metrics, done: impl Fn(&Metrics) -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !done(metrics) {
        assert!(tokio::time::Instant::now() < deadline, "condition never reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_reader_stops_reading_at_threshold() {
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (mut client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut server = Connection::accept(server_io, "memory", &config, metrics.clone());

    client_io.write_all(&[PROTOCOL_VERSION]).await.unwrap();
    client_io.write_all(&encode_frame(1)).await.unwrap();

    // pause_threshold = 1: once frame 1 is queued the reader pauses without reading on
    wait_until(&metrics, |m| m.snapshot().pause_count == 1).await;
    let snap = metrics.snapshot();
    assert_eq!((snap.recv_enqueue, snap.messages_received), (1, 1));

    client_io.write_all(&encode_frame(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snap = metrics.snapshot();
    assert_eq!(snap.messages_received, 1, "frame 2 was read past the threshold");
    assert_eq!(snap.pause_count, 1);

    assert_eq!(server.recv_frame().await.unwrap().msg_id, 1);
    let frame = tokio::time::timeout(WAIT, server.recv_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.msg_id, 2);
    assert_eq!(metrics.snapshot().messages_received, 2);
}

#[tokio::test]
async fn test_frame_error_surfaces_to_receiver() {
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (mut client_io, server_io) = tokio::io::duplex(1024);
    let mut server = Connection::accept(server_io, "memory", &config, metrics.clone());

    // version byte, then a preamble with a bad start-of-frame byte
    client_io
        .write_all(&[PROTOCOL_VERSION, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0])
        .await
        .unwrap();

    let result = tokio::time::timeout(WAIT, server.recv_frame()).await.unwrap();
    assert!(matches!(result, Err(ProtocolError::StartOfFrame { .. })));
    assert_eq!(metrics.snapshot().frame_errors, 1);
}

struct RunningServer {
    address: String,
    metrics: Arc<Metrics>,
    shutdown_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningServer {
    async fn stop(self) {
        self.shutdown_tx.send(()).await.unwrap();
        tokio::time::timeout(WAIT, self.handle).await.unwrap().unwrap();
    }
}

async fn start_server(config: LongerpullConfig) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let server = Server::new(config, commands());
    let metrics = server.metrics();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        server.serve(listener, shutdown_rx).await.expect("server");
    });
    RunningServer {
        address,
        metrics,
        shutdown_tx,
        handle,
    }
}

async fn connect_client(address: &str) -> Connection {
    let mut config = test_config();
    config.client.address = address.to_string();
    Connection::connect(&config, Arc::new(Metrics::new()))
        .await
        .expect("connect")
}

#[tokio::test]
async fn test_server_dispatches_commands() {
    let server = start_server(test_config()).await;
    let mut client = connect_client(&server.address).await;

    let sum = rpc::invoke(&mut client, 1, "add", json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert_eq!(sum, json!(5));

    let status = rpc::invoke(&mut client, 2, "check_activation", json!({}))
        .await
        .unwrap();
    assert_eq!(status, json!({"active": true}));

    match rpc::invoke(&mut client, 3, "missing", json!({})).await {
        Err(ProtocolError::CommandFailed(message)) => assert!(message.contains("missing")),
        other => panic!("unexpected: {other:?}"),
    }

    client.close().await.unwrap();
    let metrics = server.metrics.clone();
    server.stop().await;

    let snap = metrics.snapshot();
    assert_eq!(snap.connections_total, 1);
    assert_eq!(snap.connections_active, 0);
    assert_eq!(snap.messages_received, 3);
    assert_eq!(snap.messages_sent, 3);
    assert_eq!(snap.command_errors, 1);
}

#[tokio::test]
async fn test_server_drops_bad_version() {
    let server = start_server(test_config()).await;

    let mut stream = TcpStream::connect(&server.address).await.unwrap();
    stream.write_all(&[PROTOCOL_VERSION + 1]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "server should close the connection");

    let metrics = server.metrics.clone();
    server.stop().await;
    assert_eq!(metrics.snapshot().frame_errors, 1);
}

#[tokio::test]
async fn test_server_rejects_over_connection_limit() {
    let server = start_server(LongerpullConfig::default_with_overrides(|c| {
        c.server.max_connections = 1;
        c.server.shutdown_timeout = Duration::from_secs(2);
    }))
    .await;

    // A completed command proves the first connection is counted as active
    let mut first = connect_client(&server.address).await;
    let sum = rpc::invoke(&mut first, 1, "add", json!({"a": 1, "b": 1}))
        .await
        .unwrap();
    assert_eq!(sum, json!(2));

    let mut second = TcpStream::connect(&server.address).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, second.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "second connection should be closed");

    let snap = server.metrics.snapshot();
    assert_eq!(snap.connections_rejected, 1);
    assert_eq!(snap.connections_total, 1);
    assert_eq!(snap.connections_active, 1);

    // The first connection keeps working
    let sum = rpc::invoke(&mut first, 2, "add", json!({"a": 2, "b": 2}))
        .await
        .unwrap();
    assert_eq!(sum, json!(4));

    first.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_invoke_uses_configured_response_timeout() {
    let mut config = test_config();
    config.client.response_timeout = Duration::from_millis(100);
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    // Accepted but never answered
    let _silent = Connection::accept(server_io, "memory", &config, Arc::new(Metrics::new()));
    let mut client = Connection::handshake(client_io, "memory", &config, Arc::new(Metrics::new()))
        .await
        .unwrap();
    assert_eq!(client.response_timeout(), Duration::from_millis(100));

    let started = tokio::time::Instant::now();
    let result = rpc::invoke(&mut client, 1, "add", json!({})).await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
    assert!(started.elapsed() < WAIT);

    let short = Duration::from_millis(10);
    let result = rpc::invoke_with_timeout(&mut client, 2, "add", json!({}), short).await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
}

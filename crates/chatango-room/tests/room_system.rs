//! End-to-end tests for room sessions against a scripted in-memory server.
//!
//! Each test joins a room through a [`RoomManager`] backed by a
//! [`MemoryConnector`], then plays the server side of the protocol by hand.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chatango_keepalive::KeepAliveConfig;
use chatango_protocol::{AuthorKind, Command, Frame, FrameDecoder, PostId};
use chatango_room::{
    CommandStatus, DisconnectReason, RoomConfig, RoomError, RoomEvent, RoomHandle, RoomManager,
    RoomState, RoomUpdate,
};
use chatango_session::{resolve_shard, AccountService, Credentials, SessionError};
use chatango_transport::{Connection, Connector, MemoryConnector, MemoryListener, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

const ANON_OK: &str = "ok:owner:1234567890123456:C::1700009999.25:127.0.0.1:";

/// Account calls are not exercised here.
struct NoAccounts;

impl AccountService for NoAccounts {
    async fn request_auth_token(&self, _: &Credentials) -> Result<String, SessionError> {
        Err(SessionError::MissingCredentials)
    }

    async fn upload_avatar(&self, _: &Credentials, _: &Path) -> Result<(), SessionError> {
        Err(SessionError::MissingCredentials)
    }
}

/// A connector whose every attempt is refused.
struct RefusingConnector;

impl Connector for RefusingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, addr: &str) -> Result<Connection<DuplexStream>, TransportError> {
        Err(TransportError::ConnectFailed {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        })
    }
}

/// The server end of one client connection.
struct Server {
    stream: DuplexStream,
    decoder: FrameDecoder,
    queued: VecDeque<Frame>,
}

impl Server {
    async fn accept(listener: &MemoryListener) -> (String, Server) {
        let (addr, stream) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("no connection attempt")
            .expect("connector dropped");
        let server = Server {
            stream,
            decoder: FrameDecoder::new(),
            queued: VecDeque::new(),
        };
        (addr, server)
    }

    /// Next frame from the client, or `None` at EOF.
    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Some(frame);
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return None;
            }
            for frame in self.decoder.feed(&buf[..n]) {
                self.queued.push_back(frame.unwrap());
            }
        }
    }

    /// Next command, skipping pings. Panics if its verb is not `verb`.
    async fn expect(&mut self, verb: &str) -> Command {
        loop {
            match self.next_frame().await {
                Some(Frame::Pong) => continue,
                Some(Frame::Command(cmd)) => {
                    assert_eq!(cmd.verb, verb, "unexpected command {cmd:?}");
                    return cmd;
                }
                None => panic!("client closed while waiting for {verb}"),
            }
        }
    }

    async fn send(&mut self, frame: &str) {
        self.stream
            .write_all(format!("{frame}\r\n\0").as_bytes())
            .await
            .unwrap();
    }

    /// Reads until EOF and returns how many pings arrived.
    async fn pings_until_eof(&mut self) -> usize {
        let mut pings = 0;
        while let Some(frame) = self.next_frame().await {
            if frame == Frame::Pong {
                pings += 1;
            }
        }
        pings
    }
}

fn test_config() -> RoomConfig {
    RoomConfig {
        keepalive: KeepAliveConfig {
            interval_secs: 15,
            initial_jitter_ms: 0,
        },
        ..RoomConfig::default()
    }
}

type Events = mpsc::UnboundedReceiver<RoomUpdate>;

fn manager(
    credentials: Credentials,
    config: RoomConfig,
) -> (RoomManager<MemoryConnector, NoAccounts>, Events, MemoryListener) {
    let (connector, listener) = MemoryConnector::pair();
    let (manager, events) = RoomManager::new(connector, NoAccounts, credentials, config);
    (manager, events, listener)
}

async fn next_event_within(events: &mut Events, limit: Duration) -> RoomEvent {
    let update = tokio::time::timeout(limit, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed");
    update.event
}

async fn next_event(events: &mut Events) -> RoomEvent {
    next_event_within(events, Duration::from_secs(5)).await
}

/// Joins `testroom` anonymously and walks the server through login.
async fn join_live(
    config: RoomConfig,
) -> (RoomManager<MemoryConnector, NoAccounts>, RoomHandle, Events, Server) {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), config);
    let handle = manager.join_room("testroom").unwrap();
    let (_, mut server) = Server::accept(&listener).await;

    server.expect("bauth").await;
    server.send(ANON_OK).await;
    server.send("inited").await;
    for verb in ["gparticipants", "getpremium", "getbannedwords", "getratelimit"] {
        server.expect(verb).await;
    }
    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        RoomEvent::HistoryDone { initial: true, .. }
    ));
    (manager, handle, events, server)
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_anonymous_join_reaches_live() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("TestRoom").unwrap();
    assert_eq!(handle.name(), "testroom");

    let (addr, mut server) = Server::accept(&listener).await;
    let shard = resolve_shard("testroom").unwrap();
    assert_eq!(addr, format!("s{shard}.chatango.com:443"));

    let auth = server.expect("bauth").await;
    assert_eq!(auth.args[0], "testroom");
    assert_eq!(auth.args[1].len(), 16);
    assert_eq!(&auth.args[2..], &["".to_string(), "".to_string()]);

    server.send(ANON_OK).await;
    server.send("i:1700000000.5:bob::1:U1:M1:ip:0::<nF00/><f x12000=\"0\">old</f>").await;
    server.send("inited").await;

    let mut verbs = Vec::new();
    for _ in 0..4 {
        let cmd = match server.next_frame().await {
            Some(Frame::Command(cmd)) => cmd,
            other => panic!("expected a command, got {other:?}"),
        };
        verbs.push(cmd.encode(false));
    }
    assert_eq!(
        verbs,
        vec![
            b"gparticipants\r\n\0".to_vec(),
            b"getpremium:1\r\n\0".to_vec(),
            b"getbannedwords\r\n\0".to_vec(),
            b"getratelimit\r\n\0".to_vec(),
        ]
    );

    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
    match next_event(&mut events).await {
        RoomEvent::HistoryDone { posts, initial } => {
            assert!(initial);
            assert_eq!(posts.len(), 1);
            assert_eq!(posts[0].body, "old");
            assert_eq!(posts[0].id, PostId::Permanent("M1".into()));
        }
        other => panic!("expected HistoryDone, got {other:?}"),
    }

    let info = handle.info().await.unwrap();
    assert_eq!(info.state, RoomState::Live);
    assert_eq!(info.display_name, "!anon4567");
    assert_eq!(info.owner, "owner");
}

#[tokio::test]
async fn test_denied_room_reports_and_closes() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("testroom").unwrap();
    let (_, mut server) = Server::accept(&listener).await;

    server.expect("bauth").await;
    server.send("denied").await;

    assert_eq!(next_event(&mut events).await, RoomEvent::Denied);
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::Denied
        }
    );
    assert_eq!(server.pings_until_eof().await, 0);
    assert_eq!(handle.info().await.unwrap().state, RoomState::Disconnected);
}

#[tokio::test]
async fn test_registered_login_failure() {
    let (mut manager, mut events, listener) =
        manager(Credentials::registered("alice", "wrong"), test_config());
    manager.join_room("testroom").unwrap();
    let (_, mut server) = Server::accept(&listener).await;

    let auth = server.expect("bauth").await;
    assert_eq!(auth.args[2], "alice");
    server.send(ANON_OK).await;

    assert_eq!(next_event(&mut events).await, RoomEvent::LoginFailed);
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::LoginFailed
        }
    );
}

#[tokio::test]
async fn test_anonymous_login_with_bad_status_fails() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("testroom").unwrap();
    let (_, mut server) = Server::accept(&listener).await;

    server.expect("bauth").await;
    server.send("ok:owner:1234567890123456:X::1700009999:127.0.0.1:").await;

    assert_eq!(next_event(&mut events).await, RoomEvent::LoginFailed);
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::LoginFailed
        }
    );
    assert_eq!(handle.info().await.unwrap().state, RoomState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let (mut manager, mut events) = RoomManager::new(
        RefusingConnector,
        NoAccounts,
        Credentials::anonymous(),
        test_config(),
    );
    let handle = manager.join_room("testroom").unwrap();

    match next_event(&mut events).await {
        RoomEvent::ConnectionError {
            reason: DisconnectReason::Transport(detail),
        } => assert!(detail.contains("refused"), "{detail}"),
        other => panic!("expected ConnectionError, got {other:?}"),
    }
    assert_eq!(handle.info().await.unwrap().state, RoomState::Disconnected);
    assert_eq!(handle.post("hi").await.unwrap(), CommandStatus::NotConnected);
}

// =========================================================================
// Messages
// =========================================================================

#[tokio::test]
async fn test_post_is_confirmed_by_server() {
    let (_manager, handle, mut events, mut server) = join_live(test_config()).await;

    assert_eq!(handle.post("a < b").await.unwrap(), CommandStatus::Sent);
    let bm = server.expect("bm").await;
    assert_eq!(bm.args[1], "0");
    assert_eq!(bm.args[2], "<n9999/><f x12000=\"0\">a &lt; b</f>");

    let provisional = bm.args[0].clone();
    server
        .send(&format!(
            "b:1700003460.1:::1234567890123456:UNID:{provisional}:ip:0::{}",
            bm.args[2]
        ))
        .await;
    server.send(&format!("u:{provisional}:MSG1")).await;

    match next_event(&mut events).await {
        RoomEvent::Message { post } => {
            assert_eq!(post.body, "a < b");
            assert_eq!(post.id, PostId::Permanent("MSG1".into()));
            assert_eq!(post.author.kind, AuthorKind::Anonymous);
            assert_eq!(post.author.name, "!anon4567");
        }
        other => panic!("expected Message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_long_post_is_split_over_wire() {
    let config = RoomConfig {
        max_message_length: 10,
        ..test_config()
    };
    let (_manager, handle, _events, mut server) = join_live(config).await;

    handle.post("x".repeat(25)).await.unwrap();
    let mut lengths = Vec::new();
    for _ in 0..3 {
        let bm = server.expect("bm").await;
        let body = bm.args[2]
            .trim_start_matches("<n9999/><f x12000=\"0\">")
            .trim_end_matches("</f>")
            .to_string();
        lengths.push(body.len());
    }
    assert_eq!(lengths, vec![10, 10, 5]);
}

#[tokio::test]
async fn test_unknown_confirmation_is_dropped() {
    let (_manager, _handle, mut events, mut server) = join_live(test_config()).await;

    server.send("u:4242:MSG9").await;
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::MessageDropped {
            provisional_id: "4242".into(),
            message_id: "MSG9".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_frame_does_not_end_session() {
    let (_manager, handle, mut events, mut server) = join_live(test_config()).await;

    server.send("n:not-hex").await;
    server.send("n:a").await;
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::UserCountChanged { count: 10 }
    );
    assert_eq!(handle.info().await.unwrap().state, RoomState::Live);
}

#[tokio::test]
async fn test_moderation_denied_for_member() {
    let (_manager, handle, _events, _server) = join_live(test_config()).await;
    assert_eq!(handle.clear_all().await.unwrap(), CommandStatus::Denied);
    assert_eq!(handle.refresh_ban_list().await.unwrap(), CommandStatus::Denied);
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    manager.join_room("testroom").unwrap();
    let (_, mut server) = Server::accept(&listener).await;

    server.expect("bauth").await;
    server.send(ANON_OK).await;

    let event = next_event_within(&mut events, Duration::from_secs(120)).await;
    assert_eq!(
        event,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::KeepAliveTimeout
        }
    );
    assert_eq!(server.pings_until_eof().await, 1);
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let (_manager, handle, mut events, server) = join_live(test_config()).await;
    drop(server);

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::ServerClosed
        }
    );
    assert_eq!(handle.info().await.unwrap().state, RoomState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("testroom").unwrap();

    let (_, mut server) = Server::accept(&listener).await;
    let first_sid = server.expect("bauth").await.args[1].clone();
    server.send(ANON_OK).await;
    server.send("inited").await;
    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
    next_event(&mut events).await;

    handle.disconnect().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::Deliberate
        }
    );
    assert_eq!(handle.post("hi").await.unwrap(), CommandStatus::NotConnected);

    handle.reconnect().await.unwrap();
    let (_, mut server) = Server::accept(&listener).await;
    let second_sid = server.expect("bauth").await.args[1].clone();
    assert_ne!(first_sid, second_sid);

    server.send(ANON_OK).await;
    server.send("inited").await;
    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
}

#[tokio::test]
async fn test_reconnect_from_live_is_silent() {
    let (mut manager, mut events, listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("testroom").unwrap();

    let (_, mut old_server) = Server::accept(&listener).await;
    let first_sid = old_server.expect("bauth").await.args[1].clone();
    old_server.send(ANON_OK).await;
    old_server.send("inited").await;
    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
    next_event(&mut events).await;

    handle.reconnect().await.unwrap();
    assert_eq!(handle.info().await.unwrap().state, RoomState::Authenticating);

    let (_, mut server) = Server::accept(&listener).await;
    let auth = server.expect("bauth").await;
    assert_ne!(auth.args[1], first_sid);
    assert_eq!(auth.args[1], handle.info().await.unwrap().session_id);

    // No ConnectionError for the replaced link: the next event is the new login.
    server.send(ANON_OK).await;
    server.send("inited").await;
    assert_eq!(next_event(&mut events).await, RoomEvent::Connected);
}

#[tokio::test]
async fn test_stalled_writer_drops_link() {
    let config = RoomConfig {
        max_message_length: 10,
        write_queue_size: 2,
        ..test_config()
    };
    let (_manager, handle, mut events, _server) = join_live(config).await;

    // Five frames cannot fit a two-slot queue before the writer runs.
    assert_eq!(handle.post("x".repeat(50)).await.unwrap(), CommandStatus::Sent);
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ConnectionError {
            reason: DisconnectReason::Transport("write queue full".into())
        }
    );
    assert_eq!(handle.post("hi").await.unwrap(), CommandStatus::NotConnected);
}

// =========================================================================
// RoomManager
// =========================================================================

#[tokio::test]
async fn test_manager_rejects_duplicate_and_unknown_rooms() {
    let (mut manager, _events, _listener) = manager(Credentials::anonymous(), test_config());
    manager.join_room("beta").unwrap();
    manager.join_room("alpha").unwrap();

    assert!(matches!(
        manager.join_room("ALPHA"),
        Err(RoomError::AlreadyJoined(name)) if name == "alpha"
    ));
    assert_eq!(manager.rooms(), vec!["alpha", "beta"]);
    assert!(matches!(
        manager.leave_room("gamma").await,
        Err(RoomError::NotJoined(_))
    ));
    assert!(matches!(
        manager.join_room("bad room!"),
        Err(RoomError::Session(SessionError::MalformedRoomName(_)))
    ));
}

#[tokio::test]
async fn test_leave_room_stops_actor() {
    let (mut manager, _events, _listener) = manager(Credentials::anonymous(), test_config());
    let handle = manager.join_room("alpha").unwrap();
    manager.join_room("beta").unwrap();

    manager.leave_room("Alpha").await.unwrap();
    assert!(matches!(handle.info().await, Err(RoomError::Unavailable(_))));
    assert!(manager.handle("alpha").is_none());

    manager.leave_all().await;
    assert!(manager.rooms().is_empty());
}

#[tokio::test]
async fn test_account_errors_surface_as_room_errors() {
    let (manager, _events, _listener) = manager(Credentials::anonymous(), test_config());
    assert!(matches!(
        manager.request_auth_token().await,
        Err(RoomError::Session(SessionError::MissingCredentials))
    ));
}

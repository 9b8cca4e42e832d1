//! End-to-end tests: a real client against throwaway WebSocket servers.
//!
//! Each test plays the server side by hand with `tokio-tungstenite`, writing
//! frames with [`Buffer`] and checking what the client sends back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use terra::{Client, ClientConfig, ClientError, ClientHandle, Handler};
use terra_protocol::{Buffer, LobbyUpdate, Outbound, PlayerInfo};
use terra_transport::TransportError;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Recording handler
// =========================================================================

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    /// Room to join on the first lobby update.
    join: Option<u8>,
    disconnect_on_connect: bool,
}

impl Handler for Recorder {
    fn on_lobby_update(&mut self, client: &ClientHandle, lobby: &LobbyUpdate) {
        self.events.push(format!("lobby {:?}", lobby.online));
        if let Some(room) = self.join.take() {
            client.join_room(room);
        }
    }

    fn on_connect(&mut self, client: &ClientHandle) {
        self.events.push("connect".into());
        if self.disconnect_on_connect {
            client.disconnect();
        }
    }

    fn on_game_scene(&mut self, _client: &ClientHandle, players: &[PlayerInfo], url: &str) {
        self.events.push(format!("scene {} {url}", players.len()));
    }

    fn on_game_start(&mut self, _client: &ClientHandle) {
        self.events.push("start".into());
    }

    fn on_game_event(&mut self, _client: &ClientHandle, buf: &mut Buffer, id: u8, sender: u16) {
        let payload = buf.decode_bits(10).unwrap();
        self.events.push(format!("event {id} from {sender}: {payload}"));
    }

    fn on_disconnect(&mut self, _client: &ClientHandle, outdated_version: bool) {
        self.events.push(format!("disconnect outdated={outdated_version}"));
    }
}

// =========================================================================
// Server helpers
// =========================================================================

type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have addr");
    (listener, format!("ws://{addr}/"))
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.expect("should accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("handshake should succeed")
}

fn frame(fields: &[(u32, u32)]) -> Message {
    let bits: usize = fields.iter().map(|(w, _)| *w as usize).sum();
    let mut buf = Buffer::with_bits(bits);
    for &(width, value) in fields {
        buf.write_bits(width, value).unwrap();
    }
    Message::Binary(buf.into_bytes().into())
}

fn challenge() -> Message {
    frame(&[(1, 0), (6, 9), (3, 5), (16, 20000), (20, 300000)])
}

fn lobby() -> Message {
    frame(&[(1, 0), (6, 2), (6, 4), (4, 9), (4, 8), (4, 7), (4, 6), (4, 0)])
}

async fn next_frame(ws: &mut ServerWs) -> Buffer {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("client should send")
            .expect("stream open")
            .expect("valid message");
        if msg.is_binary() {
            return Buffer::from_bytes(msg.into_data().to_vec());
        }
    }
}

/// Reads a meta frame and returns its 6-bit tag.
async fn next_meta_tag(ws: &mut ServerWs) -> (u32, Buffer) {
    let mut buf = next_frame(ws).await;
    assert_eq!(buf.decode_bits(1).unwrap(), 0, "meta selector");
    let tag = buf.decode_bits(6).unwrap();
    (tag, buf)
}

async fn expect_init(ws: &mut ServerWs) {
    let buf = next_frame(ws).await;
    assert_eq!(
        buf.as_bytes(),
        Outbound::Init { version: 1050 }.encode().unwrap().as_slice(),
        "Init must be the first frame"
    );
}

/// Waits for the client to go away.
async fn drain(mut ws: ServerWs) {
    while let Ok(Some(Ok(msg))) = timeout(WAIT, ws.next()).await {
        if msg.is_close() {
            break;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_lobby_to_game_server_and_remote_close() {
    let (lobby_listener, lobby_url) = bind().await;
    let (game_listener, game_url) = bind().await;

    let lobby_server = tokio::spawn(async move {
        let mut ws = accept(&lobby_listener).await;
        expect_init(&mut ws).await;

        ws.send(challenge()).await.unwrap();
        let (tag, mut answer) = next_meta_tag(&mut ws).await;
        assert_eq!(tag, 14, "challenge response");
        assert_eq!(answer.decode_bits(3).unwrap(), 5);
        assert_eq!(answer.decode_bits(16).unwrap(), 6612);
        assert_eq!(next_meta_tag(&mut ws).await.0, 17, "account info");
        let (tag, mut session) = next_meta_tag(&mut ws).await;
        assert_eq!(tag, 1, "session info");
        session.decode_bits(10).unwrap();
        assert_eq!(session.decode_bits(5).unwrap(), 4);
        assert_eq!(session.read_str(4), "test");

        ws.send(lobby()).await.unwrap();
        let (tag, mut join) = next_meta_tag(&mut ws).await;
        assert_eq!(tag, 2, "join room");
        assert_eq!(join.decode_bits(4).unwrap(), 3);

        // Scene without roster: room 3, challenge (700, 1).
        ws.send(frame(&[(1, 0), (6, 4), (10, 3), (10, 700), (1, 1)]))
            .await
            .unwrap();
        drain(ws).await;
    });

    let game_server = tokio::spawn(async move {
        let mut ws = accept(&game_listener).await;
        expect_init(&mut ws).await;

        ws.send(challenge()).await.unwrap();
        assert_eq!(next_meta_tag(&mut ws).await.0, 14, "challenge response");
        assert_eq!(next_meta_tag(&mut ws).await.0, 17, "account info");
        let (tag, mut ready) = next_meta_tag(&mut ws).await;
        assert_eq!(tag, 5, "ready for session");
        assert_eq!(ready.decode_bits(8).unwrap(), 1, "server flag");
        assert_eq!(ready.decode_bits(10).unwrap(), 700);
        assert_eq!(ready.decode_bits(9).unwrap(), 1);
        ready.decode_bits(10).unwrap();
        assert_eq!(ready.decode_bits(14).unwrap(), 1050);

        // Player 3 attacks player 8 with 200.
        ws.send(frame(&[(1, 1), (1, 0), (4, 1), (9, 3), (10, 200), (10, 8)]))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
        drain(ws).await;
    });

    let config = ClientConfig::builder()
        .nickname("test")
        .lobby_url(lobby_url)
        .game_url_template(format!("{game_url}{{index}}"))
        .build()
        .unwrap();
    let handler = Recorder {
        join: Some(3),
        ..Recorder::default()
    };
    let client = Client::start(config, handler).await.expect("should connect");

    let handler = timeout(WAIT, client.closed())
        .await
        .expect("client should finish")
        .expect("no panic");
    lobby_server.await.unwrap();
    game_server.await.unwrap();

    assert_eq!(
        handler.events,
        [
            "connect".to_string(),
            "lobby [9, 8, 7, 6]".to_string(),
            format!("scene 0 {game_url}3"),
            "event 1 from 3: 200".to_string(),
            "start".to_string(),
            "disconnect outdated=false".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_close_before_lobby_reports_outdated_version() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        expect_init(&mut ws).await;
        ws.close(None).await.unwrap();
        drain(ws).await;
    });

    let config = ClientConfig::builder().lobby_url(url).build().unwrap();
    let client = Client::start(config, Recorder::default()).await.unwrap();
    let handle = client.handle();

    let handler = timeout(WAIT, client.closed()).await.unwrap().unwrap();
    server.await.unwrap();

    assert_eq!(handler.events, ["disconnect outdated=true"]);
    assert!(!handle.is_connected());
}

#[tokio::test]
async fn test_local_disconnect_skips_callback() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        expect_init(&mut ws).await;
        ws.send(lobby()).await.unwrap();
        drain(ws).await;
    });

    let config = ClientConfig::builder().lobby_url(url).build().unwrap();
    let handler = Recorder {
        disconnect_on_connect: true,
        ..Recorder::default()
    };
    let client = Client::start(config, handler).await.unwrap();

    let handler = timeout(WAIT, client.closed()).await.unwrap().unwrap();
    server.await.unwrap();

    assert_eq!(handler.events, ["connect", "lobby [9, 8, 7, 6]"]);
}

#[tokio::test]
async fn test_text_frame_disconnects() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        expect_init(&mut ws).await;
        ws.send(lobby()).await.unwrap();
        ws.send(Message::text("hello")).await.unwrap();
        drain(ws).await;
    });

    let config = ClientConfig::builder().lobby_url(url).build().unwrap();
    let client = Client::start(config, Recorder::default()).await.unwrap();

    let handler = timeout(WAIT, client.closed()).await.unwrap().unwrap();
    server.await.unwrap();

    assert_eq!(
        handler.events,
        ["connect", "lobby [9, 8, 7, 6]", "disconnect outdated=false"]
    );
}

#[tokio::test]
async fn test_unreachable_lobby_fails_to_start() {
    let (listener, url) = bind().await;
    drop(listener);

    let config = ClientConfig::builder().lobby_url(url).build().unwrap();
    let Err(err) = Client::start(config, Recorder::default()).await else {
        panic!("start should fail");
    };
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::ConnectFailed { .. })
    ));
}

#[tokio::test]
async fn test_secure_lobby_handshake_failure_fails_to_start() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("wss://{}/", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let config = ClientConfig::builder().lobby_url(url).build().unwrap();
    let Err(err) = Client::start(config, Recorder::default()).await else {
        panic!("start should fail");
    };
    server.await.unwrap();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::ConnectFailed { .. })
    ));
}

#[tokio::test]
async fn test_invalid_config_fails_to_start() {
    let config = ClientConfig {
        colors: [99, 0, 0],
        ..ClientConfig::default()
    };
    let Err(err) = Client::start(config, Recorder::default()).await else {
        panic!("start should fail");
    };
    assert!(matches!(err, ClientError::InvalidConfig(_)));
}

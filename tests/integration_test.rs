use std::collections::HashSet;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tvgame::config::ConnConfig;
use tvgame::game::QuestionRepo;
use tvgame::lobby::Lobby;
use tvgame::ws::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    _static_dir: tempfile::TempDir,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn new() -> Self {
        Self::with_conn(ConnConfig::default()).await
    }

    async fn with_conn(conn: ConnConfig) -> Self {
        let mut questions = tempfile::NamedTempFile::new().unwrap();
        writeln!(questions, "Fruit?,Apple").unwrap();
        let repo = QuestionRepo::from_path(questions.path()).unwrap();

        let static_dir = tempfile::tempdir().unwrap();
        let lobby = Arc::new(Lobby::new(Arc::new(repo)));
        let state = Arc::new(AppState::new(lobby, conn));
        let app = tvgame::app(state, static_dir.path());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            _static_dir: static_dir,
            _handle: handle,
        }
    }

    async fn connect(&self) -> Client {
        let url = format!("ws://{}/ws", self.addr);
        let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        stream
    }

    /// Open a room and return the host connection with its code.
    async fn create(&self) -> (Client, String) {
        let mut host = self.connect().await;
        send(&mut host, json!({"type": "create"})).await;
        let msg = recv(&mut host).await;
        assert_eq!(msg["Type"], "create");
        let code = msg["Data"]["Code"].as_str().unwrap().to_string();
        (host, code)
    }

    async fn join(&self, code: &str, name: &str) -> (Client, Value) {
        let mut player = self.connect().await;
        send(
            &mut player,
            json!({"Type": "join", "Data": {"Name": name, "Code": code}}),
        )
        .await;
        let reply = recv(&mut player).await;
        (player, reply)
    }
}

async fn send(client: &mut Client, msg: Value) {
    client
        .send(Message::Text(msg.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("Expected text frame, got: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), read)
        .await
        .expect("timed out waiting for message")
}

/// Wait for the server to close the connection.
async fn expect_closed(client: &mut Client) {
    let read = async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(Message::Text(text))) => panic!("Unexpected message: {text}"),
                Some(Ok(_)) => continue,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), read)
        .await
        .expect("timed out waiting for close");
}

#[tokio::test]
async fn test_create_and_join() {
    let server = TestServer::new().await;
    let (mut host, code) = server.create().await;
    assert_eq!(code.len(), 4);
    assert!(code.chars().all(|c| c.is_ascii_uppercase()));

    let (_p1, reply) = server.join(&code.to_lowercase(), "alice").await;
    assert_eq!(reply, json!({"Type": "ok"}));

    let joined = recv(&mut host).await;
    assert_eq!(joined["Type"], "joined");
    assert_eq!(joined["Data"]["Player"]["Name"], "ALICE");
    assert!(!joined["Data"]["Player"]["ID"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_name_taken_closes_connection() {
    let server = TestServer::new().await;
    let (_host, code) = server.create().await;
    let (_p1, reply) = server.join(&code, "bob").await;
    assert_eq!(reply["Type"], "ok");

    let (mut dup, reply) = server.join(&code, "Bob").await;
    assert_eq!(reply, json!({"Type": "error", "Data": {"Text": "Name is taken"}}));
    expect_closed(&mut dup).await;
}

#[tokio::test]
async fn test_unknown_room() {
    let server = TestServer::new().await;
    let (mut player, reply) = server.join("QQQQ", "bob").await;
    assert_eq!(reply, json!({"Type": "error", "Data": {"Text": "No such room"}}));
    expect_closed(&mut player).await;
}

#[tokio::test]
async fn test_invalid_first_message_closes_connection() {
    let server = TestServer::new().await;
    let mut client = server.connect().await;
    send(&mut client, json!({"Type": "begin"})).await;
    expect_closed(&mut client).await;
}

#[tokio::test]
async fn test_oversized_message_closes_connection() {
    let server = TestServer::new().await;
    let (_host, code) = server.create().await;
    let (mut p1, _) = server.join(&code, "bob").await;

    let text = "x".repeat(600);
    // The server may drop the socket before the write completes
    let _ = p1
        .send(Message::Text(
            json!({"Type": "answer", "Data": {"Text": text}}).to_string().into(),
        ))
        .await;
    expect_closed(&mut p1).await;
}

#[tokio::test]
async fn test_begin_asks_players() {
    let server = TestServer::new().await;
    let (mut host, code) = server.create().await;
    let (mut p1, _) = server.join(&code, "P1").await;
    let (mut p2, _) = server.join(&code, "P2").await;
    recv(&mut host).await;
    recv(&mut host).await;

    send(&mut host, json!({"type": "begin"})).await;
    let question = recv(&mut host).await;
    assert_eq!(question["Type"], "question");
    assert_eq!(question["Data"]["Question"]["Text"], "Fruit?");

    for player in [&mut p1, &mut p2] {
        assert_eq!(
            recv(player).await,
            json!({"Type": "answer", "Data": {"Text": "Fruit?"}})
        );
    }

    send(&mut p1, json!({"Type": "answer", "Data": {"Text": "banana"}})).await;
    assert_eq!(recv(&mut p1).await, json!({"Type": "ok"}));
    let collected = recv(&mut host).await;
    assert_eq!(collected["Type"], "collected");
    assert_eq!(collected["Data"]["Complete"], false);

    // The room no longer takes players once the game has begun
    let (mut late, reply) = server.join(&code, "P3").await;
    assert_eq!(reply["Data"]["Text"], "No such room");
    expect_closed(&mut late).await;
}

#[tokio::test]
async fn test_concurrent_creates_get_unique_codes() {
    let server = Arc::new(TestServer::new().await);
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move { server.create().await }));
    }
    let mut codes = HashSet::new();
    let mut hosts = Vec::new();
    for task in tasks {
        let (host, code) = task.await.unwrap();
        assert!(codes.insert(code));
        hosts.push(host);
    }
}

fn short_heartbeat() -> ConnConfig {
    ConnConfig::default().with_pong_wait(Duration::from_secs(1))
}

#[tokio::test]
async fn test_idle_client_is_dropped() {
    let server = TestServer::with_conn(short_heartbeat()).await;
    let (mut host, _code) = server.create().await;

    // Not reading means pings go unanswered
    tokio::time::sleep(Duration::from_secs(2)).await;
    expect_closed(&mut host).await;
}

#[tokio::test]
async fn test_responsive_client_survives_heartbeat() {
    let server = TestServer::with_conn(short_heartbeat()).await;
    let (mut host, code) = server.create().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut pings = 0;
    while let Ok(frame) = tokio::time::timeout_at(deadline, host.next()).await {
        match frame {
            Some(Ok(Message::Ping(_))) => pings += 1,
            other => panic!("Expected only pings, got: {other:?}"),
        }
    }
    assert!(pings >= 2, "only {pings} pings in 3s");

    let (_p1, reply) = server.join(&code, "bob").await;
    assert_eq!(reply["Type"], "ok");
    assert_eq!(recv(&mut host).await["Type"], "joined");
}

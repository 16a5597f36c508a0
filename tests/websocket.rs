//! End-to-end tests against a running server with real WebSocket clients

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use convo_fanout::{
    ChatServer, MemoryStore, MessageDraft, MessageRecord, MessageStore, RegistryConfig,
    ServerConfig,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    server: Arc<ChatServer<MemoryStore>>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<convo_fanout::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ChatServer::new(config, MemoryStore::new()));
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                server
                    .serve(listener, async move {
                        let _ = stopped.await;
                    })
                    .await
            }
        });

        Self {
            addr,
            server,
            stop: Some(stop),
            task,
        }
    }

    async fn connect(&self, user: &'static str, conversation: &str) -> Client {
        let url = format!("ws://{}/ws/chat/{}", self.addr, conversation);
        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_static(user));

        let (client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        client
    }

    /// Wait until the server has registered `n` live sessions
    async fn wait_for_connections(&self, n: u64) {
        for _ in 0..500 {
            if self.server.stats().snapshot().active_connections == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} active connections");
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

async fn send_content(client: &mut Client, content: &str) {
    let payload = serde_json::json!({ "content": content }).to_string();
    client.send(Message::text(payload)).await.unwrap();
}

async fn recv_record(client: &mut Client) -> MessageRecord {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection ended")
            .unwrap();

        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

/// Minimal HTTP/1.1 request; returns the raw response
async fn http_request(addr: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_message_reaches_every_member_of_conversation() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut alice = server.connect("alice", "c1").await;
    let mut bob = server.connect("bob", "c1").await;
    let mut carol = server.connect("carol", "c2").await;
    server.wait_for_connections(3).await;

    send_content(&mut alice, "hello").await;

    let to_alice = recv_record(&mut alice).await;
    let to_bob = recv_record(&mut bob).await;
    assert_eq!(to_alice, to_bob);
    assert_eq!(to_bob.content, "hello");
    assert_eq!(to_bob.sender_id, "alice");
    assert_eq!(to_bob.conversation_id, "c1");
    assert!(!to_bob.is_saved);
    assert_silent(&mut carol).await;

    // Written before it was delivered
    let stored = server.server.store().get(to_bob.id).await.unwrap();
    assert_eq!(stored, to_bob);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_frames_do_not_close_connection() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut alice = server.connect("alice", "c1").await;
    let mut bob = server.connect("bob", "c1").await;
    server.wait_for_connections(2).await;

    alice.send(Message::text("not json")).await.unwrap();
    send_content(&mut alice, "   ").await;
    send_content(&mut alice, "second try").await;

    assert_eq!(recv_record(&mut bob).await.content, "second try");
    assert_eq!(server.server.store().len().await, 1);
    assert_eq!(server.server.stats().snapshot().frames_rejected, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_exclude_sender_policy() {
    let config = ServerConfig::default().registry(RegistryConfig::default().exclude_sender());
    let server = TestServer::start(config).await;
    let mut alice = server.connect("alice", "c1").await;
    let mut bob = server.connect("bob", "c1").await;
    server.wait_for_connections(2).await;

    send_content(&mut alice, "no echo").await;

    assert_eq!(recv_record(&mut bob).await.content, "no echo");
    assert_silent(&mut alice).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_member_is_unregistered() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut alice = server.connect("alice", "c1").await;
    let mut bob = server.connect("bob", "c1").await;
    server.wait_for_connections(2).await;

    bob.close(None).await.unwrap();
    server.wait_for_connections(1).await;

    send_content(&mut alice, "anyone there?").await;
    assert_eq!(recv_record(&mut alice).await.content, "anyone there?");

    let snapshot = server.server.stats().snapshot();
    assert_eq!(snapshot.delivery_failures, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_upgrade_without_identity_is_rejected() {
    let server = TestServer::start(ServerConfig::default()).await;

    let url = format!("ws://{}/ws/chat/c1", server.addr);
    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();

    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("unexpected error: {other}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let server = TestServer::start(ServerConfig::default().max_connections(1)).await;
    let _alice = server.connect("alice", "c1").await;
    server.wait_for_connections(1).await;

    let url = format!("ws://{}/ws/chat/c1", server.addr);
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-user-id", HeaderValue::from_static("bob"));
    let err = tokio_tungstenite::connect_async(request).await.unwrap_err();

    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("unexpected error: {other}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_admin_sweep_endpoint() {
    let server = TestServer::start(ServerConfig::default()).await;
    let store = server.server.store();

    let expired = store
        .persist(
            MessageDraft::new("c1", "alice", "old").created_at(Utc::now() - TimeDelta::hours(25)),
        )
        .await
        .unwrap();
    let kept = store
        .persist(
            MessageDraft::new("c1", "alice", "old but saved")
                .created_at(Utc::now() - TimeDelta::hours(25))
                .saved(),
        )
        .await
        .unwrap();
    let fresh = store
        .persist(MessageDraft::new("c1", "alice", "new"))
        .await
        .unwrap();

    let response = http_request(server.addr, "POST", "/admin/messages/sweep").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#"{"deleted":1}"#), "{response}");

    assert!(store.get(expired.id).await.is_none());
    assert!(store.get(kept.id).await.is_some());
    assert!(store.get(fresh.id).await.is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn test_saved_message_survives_sweep() {
    let server = TestServer::start(ServerConfig::default()).await;
    let record = server
        .server
        .store()
        .persist(
            MessageDraft::new("c1", "alice", "bookmark").created_at(Utc::now() - TimeDelta::days(2)),
        )
        .await
        .unwrap();

    let path = format!("/messages/{}/save", record.id);
    let response = http_request(server.addr, "PATCH", &path).await;
    assert!(response.starts_with("HTTP/1.1 204"), "{response}");

    let response = http_request(server.addr, "POST", "/admin/messages/sweep").await;
    assert!(response.contains(r#"{"deleted":0}"#), "{response}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_live_connections() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut alice = server.connect("alice", "c1").await;
    server.wait_for_connections(1).await;

    let addr = server.addr;
    let stats = Arc::clone(server.server.stats());
    server.shutdown().await;

    // Whatever arrives, the stream must end
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = alice.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(drained.is_ok());
    assert_eq!(stats.snapshot().active_connections, 0);

    assert!(TcpStream::connect(addr).await.is_err());
}

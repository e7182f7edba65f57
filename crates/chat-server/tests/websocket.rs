use chat_server::core::{AppState, ChatServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (TempDir, AppState, SocketAddr) {
    let dir = TempDir::new().unwrap();
    let mut config = ChatServerConfig::with_base_dir(dir.path());
    config.bcrypt_cost = 4;
    let state = AppState::build(config).await.unwrap();
    let app = chat_server::build_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (dir, state, addr)
}

async fn token_for(state: &AppState, user: &str) -> String {
    state.auth.register(user, "pw").await.unwrap();
    state.auth.login(user, "pw").await.unwrap()
}

async fn open(addr: SocketAddr, token: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    socket
}

/// Next JSON event, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_named(socket: &mut Socket, name: &str) -> Value {
    loop {
        let event = next_event(socket).await;
        if event["event"] == name {
            return event["data"].clone();
        }
    }
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_connect_chat_and_disconnect() {
    let (_dir, state, addr) = start_server().await;
    let alice_token = token_for(&state, "alice").await;
    let bob_token = token_for(&state, "bob").await;

    let mut alice = open(addr, &alice_token).await;
    let roster = next_named(&mut alice, "user_list").await;
    assert!(roster.get("alice").is_some());

    let mut bob = open(addr, &bob_token).await;
    let roster = next_named(&mut bob, "user_list").await;
    assert!(roster.get("alice").is_some() && roster.get("bob").is_some());

    let frame = json!({ "event": "send_message", "data": { "message": "hi" } });
    alice
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();

    for socket in [&mut alice, &mut bob] {
        let msg = next_named(socket, "new_message").await;
        assert_eq!(msg["username"], "alice");
        assert_eq!(msg["message"], "hi");
        assert!(msg["timestamp"].is_string());
    }

    let history = state.gateway.recent(50).await.unwrap();
    assert_eq!(history.last().unwrap().sender(), "alice");

    alice.close(None).await.unwrap();
    let roster = next_named(&mut bob, "user_list").await;
    assert!(roster.get("alice").is_none());
    wait_for(|| state.gateway.connection_count() == 1).await;
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let (_dir, state, addr) = start_server().await;
    let token = token_for(&state, "alice").await;
    let mut alice = open(addr, &token).await;
    next_named(&mut alice, "user_list").await;

    alice.send(Message::Text("not json".into())).await.unwrap();
    let unknown = json!({ "event": "delete_everything", "data": {} });
    alice
        .send(Message::Text(unknown.to_string().into()))
        .await
        .unwrap();
    let frame = json!({ "event": "send_message", "data": { "message": "still here" } });
    alice
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();

    let msg = next_named(&mut alice, "new_message").await;
    assert_eq!(msg["message"], "still here");
    assert_eq!(state.gateway.recent(50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_tokens_never_upgrade() {
    let (_dir, state, addr) = start_server().await;

    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401)
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = connect_async(format!("ws://{addr}/ws?token=forged"))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 403)
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(state.gateway.connection_count(), 0);
}

#[tokio::test]
async fn test_reconnect_survives_stale_disconnect() {
    let (_dir, state, addr) = start_server().await;
    let token = token_for(&state, "bob").await;

    let mut first = open(addr, &token).await;
    next_named(&mut first, "user_list").await;

    let mut second = open(addr, &token).await;
    let roster = next_named(&mut second, "user_list").await;
    let current = roster["bob"]["socketId"].as_str().unwrap().to_string();

    first.close(None).await.unwrap();
    // Give the server time to process the stale close.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let roster = state.gateway.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster["bob"].connection_id, current);

    second.close(None).await.unwrap();
    wait_for(|| state.gateway.connection_count() == 0).await;
}

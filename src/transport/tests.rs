use super::message::FeedQuery;
use super::websocket::serve;
use super::{INVALID_TOKEN, TEMPLATE_ID_REQUIRED};
use crate::auth::JwtAuthenticator;
use crate::config::{Settings, StoreBackend};
use crate::context::AppContext;
use crate::hub::CommentUpdate;
use crate::persistence::{CommentAuthor, MemoryStore, NewComment};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "transport-secret";
const WAIT: Duration = Duration::from_secs(5);

async fn start_server(store: Arc<MemoryStore>) -> (SocketAddr, Arc<AppContext>) {
    let mut settings = Settings::default();
    settings.store.backend = StoreBackend::Memory;
    let ctx = Arc::new(AppContext::new(
        settings,
        store,
        Arc::new(JwtAuthenticator::new(SECRET)),
    ));
    ctx.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, ctx.clone()));
    (addr, ctx)
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/comments{query}"))
        .await
        .expect("handshake should succeed");
    ws
}

async fn next_update(ws: &mut Client) -> CommentUpdate {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("Expected a snapshot, got {other:?}"),
        }
    }
}

async fn expect_close(ws: &mut Client) -> (u16, String) {
    let msg = timeout(WAIT, ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("read failed");
    match msg {
        WsMessage::Close(Some(frame)) => (u16::from(frame.code), frame.reason.to_string()),
        other => panic!("Expected a close frame, got {other:?}"),
    }
}

async fn wait_for_subscribers(ctx: &AppContext, topic_id: i64, expected: usize) {
    timeout(WAIT, async {
        while ctx.hub.subscriber_count(topic_id) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

#[test]
fn test_feed_query_parsing() {
    let q = FeedQuery::parse("templateId=42&token=abc");
    assert_eq!(q.template_id.as_deref(), Some("42"));
    assert_eq!(q.token.as_deref(), Some("abc"));

    let q = FeedQuery::parse("token=&templateId=7&templateId=8");
    assert_eq!(q.template_id.as_deref(), Some("7"));
    assert_eq!(q.token, None);

    assert_eq!(FeedQuery::from_uri(None), FeedQuery::default());
}

#[tokio::test]
async fn test_initial_snapshot_for_empty_template() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(addr, "?templateId=42").await;

    let update = next_update(&mut ws).await;
    assert_eq!(update.template_id, 42);
    assert!(update.comments.is_empty());

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_missing_template_id_closes_with_4000() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;

    for query in ["", "?templateId=", "?templateId=abc", "?token=xyz"] {
        let mut ws = connect(addr, query).await;
        let (code, reason) = expect_close(&mut ws).await;
        assert_eq!(code, TEMPLATE_ID_REQUIRED);
        assert_eq!(reason, "Template ID required");
    }
    assert_eq!(ctx.hub.topic_count(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_invalid_token_closes_with_4001() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;

    let mut ws = connect(addr, "?templateId=3&token=not-a-jwt").await;
    let (code, reason) = expect_close(&mut ws).await;
    assert_eq!(code, INVALID_TOKEN);
    assert_eq!(reason, "Invalid token");
    assert_eq!(ctx.hub.subscriber_count(3), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_valid_token_subscribes() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    let token = JwtAuthenticator::new(SECRET)
        .issue("17", false, chrono::Duration::hours(1))
        .unwrap();

    let mut ws = connect(addr, &format!("?templateId=3&token={token}")).await;
    assert_eq!(next_update(&mut ws).await.template_id, 3);
    assert_eq!(ctx.hub.subscriber_count(3), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_is_refused() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    assert!(
        connect_async(format!("ws://{addr}/other?templateId=1"))
            .await
            .is_err()
    );
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_committed_comment_reaches_every_subscriber() {
    let store = Arc::new(MemoryStore::new());
    let (addr, ctx) = start_server(store.clone()).await;

    let mut first = connect(addr, "?templateId=7").await;
    let mut second = connect(addr, "?templateId=7").await;
    let mut elsewhere = connect(addr, "?templateId=8").await;
    next_update(&mut first).await;
    next_update(&mut second).await;
    next_update(&mut elsewhere).await;

    let created = store
        .insert_comment(NewComment::new(
            7,
            CommentAuthor {
                id: 2,
                name: Some("Grace".into()),
                email: None,
            },
            "looks good",
        ))
        .unwrap();
    ctx.comment_committed(7);

    let a = next_update(&mut first).await;
    let b = next_update(&mut second).await;
    assert_eq!(a, b);
    assert_eq!(a.comments.last(), Some(&created));
    assert!(
        timeout(Duration::from_millis(200), elsewhere.next())
            .await
            .is_err()
    );

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_client_messages_are_ignored() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(addr, "?templateId=9").await;
    next_update(&mut ws).await;

    ws.send(WsMessage::text("hello")).await.unwrap();
    ctx.comment_committed(9);
    assert_eq!(next_update(&mut ws).await.template_id, 9);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_unsubscribes() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(addr, "?templateId=11").await;
    next_update(&mut ws).await;
    assert_eq!(ctx.hub.subscriber_count(11), 1);

    ws.close(None).await.unwrap();
    wait_for_subscribers(&ctx, 11, 0).await;
    assert_eq!(ctx.hub.topic_count(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_dropped_socket_unsubscribes() {
    let (addr, ctx) = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(addr, "?templateId=12").await;
    next_update(&mut ws).await;

    drop(ws);
    wait_for_subscribers(&ctx, 12, 0).await;

    ctx.shutdown().await;
}

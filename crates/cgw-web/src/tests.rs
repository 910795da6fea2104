//! In-process HTTP tests over the in-memory backend.

use async_trait::async_trait;
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use cgw_core::audit::{AuditLogEntry, AuditSink};
use cgw_core::auth::{AuthUser, StaticAuthorizer};
use cgw_core::config::{Environment, GatewayConfig};
use cgw_core::graph::{GraphBackend, GraphHandle, InMemoryGraph, MemoryBackend};
use cgw_core::notify::{NotificationEvent, CONNECTED};
use cgw_core::{codec, GatewayError, GatewayResult, TableId};
use cgw_redis::NotificationBus;
use chrono::DateTime;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::TryRecvError;
use tower::ServiceExt;

use crate::error::ErrorEnvelope;
use crate::{create_router, GatewayState};

const EDITOR: &str = "editor-token";
const VIEWER: &str = "viewer-token";

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl RecordingSink {
    fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn record(&self, _entry: &AuditLogEntry) -> anyhow::Result<()> {
        anyhow::bail!("log store unavailable")
    }
}

/// Backend whose handshake fails with an unclassified fault.
struct BrokenBackend;

#[async_trait]
impl GraphBackend for BrokenBackend {
    async fn connect(&self, _table: &TableId) -> GatewayResult<GraphHandle> {
        Err(GatewayError::Unclassified(
            anyhow::anyhow!("bigtable handshake reset").context("opening graph table"),
        ))
    }
}

struct PanickingBackend;

#[async_trait]
impl GraphBackend for PanickingBackend {
    async fn connect(&self, _table: &TableId) -> GatewayResult<GraphHandle> {
        panic!("engine client bug")
    }
}

/// 123-124-125 form one segment, 10-11 another, 20-21 a third.
/// 125 touches 10 and 11 touches 20.
fn fixture_graph() -> Arc<InMemoryGraph> {
    let graph = InMemoryGraph::builder()
        .supervoxel(123, [1, 1, 1])
        .supervoxel(124, [2, 1, 1])
        .supervoxel(125, [3, 1, 1])
        .supervoxel(10, [4, 1, 1])
        .supervoxel(11, [5, 1, 1])
        .supervoxel(20, [5, 2, 1])
        .supervoxel(21, [6, 2, 1])
        .edge(123, 124)
        .edge(124, 125)
        .edge(10, 11)
        .edge(20, 21)
        .contact(125, 10)
        .contact(11, 20)
        .build(
            TableId::parse("flyTableA", "fly").unwrap(),
            DateTime::from_timestamp(1_500_000_000, 0).unwrap(),
        )
        .unwrap();
    Arc::new(graph)
}

struct Harness {
    router: Router,
    graph: Arc<InMemoryGraph>,
    backend: Arc<MemoryBackend>,
    bus: NotificationBus,
}

fn harness_with(audit: Arc<dyn AuditSink>, environment: Environment) -> Harness {
    let graph = fixture_graph();
    let backend = Arc::new(MemoryBackend::new(false).with_graph(graph.clone()));
    let bus = NotificationBus::local(Duration::from_millis(100));
    let auth = StaticAuthorizer::default()
        .with_user(EDITOR, AuthUser { id: "7".into(), roles: vec!["edit_all".into()] })
        .with_user(VIEWER, AuthUser { id: "8".into(), roles: vec!["view".into()] });

    let config = GatewayConfig {
        environment,
        ..GatewayConfig::default()
    };
    let state = GatewayState::new(config, backend.clone(), audit, bus.clone(), Arc::new(auth));
    Harness {
        router: create_router(state),
        graph,
        backend,
        bus,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(RecordingSink::default()), Environment::Development)
}

fn with_backend(backend: Arc<dyn GraphBackend>, environment: Environment) -> Router {
    let config = GatewayConfig {
        environment,
        ..GatewayConfig::default()
    };
    create_router(GatewayState::new(
        config,
        backend,
        Arc::new(RecordingSink::default()),
        NotificationBus::local(Duration::from_millis(100)),
        Arc::new(StaticAuthorizer::default()),
    ))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(router: &Router, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    send(router, builder.body(Body::from(body.to_string())).unwrap()).await
}

fn envelope(body: &Bytes) -> ErrorEnvelope {
    serde_json::from_slice(body).unwrap()
}

/// Serve `router` on an ephemeral port and complete a WebSocket handshake
/// on `/ws`. The returned stream is positioned at the first frame.
async fn connect_ws(router: Router) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let handshake = format!(
        "GET /ws HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(handshake.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await.unwrap());
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    stream
}

/// Next server frame, which must be a single unmasked text frame holding
/// a notification.
async fn next_event(stream: &mut TcpStream) -> NotificationEvent {
    let read = async {
        assert_eq!(stream.read_u8().await.unwrap(), 0x81);
        let len = match stream.read_u8().await.unwrap() {
            126 => stream.read_u16().await.unwrap() as usize,
            127 => stream.read_u64().await.unwrap() as usize,
            len => len as usize,
        };
        let mut payload = vec![0; len];
        stream.read_exact(&mut payload).await.unwrap();
        payload
    };
    let payload = tokio::time::timeout(Duration::from_secs(2), read).await.unwrap();
    serde_json::from_slice(&payload).unwrap()
}

#[tokio::test]
async fn test_root_at_timestamp_is_one_binary_id() {
    let h = harness();
    let (status, headers, body) = get(&h.router, "/1.0/flyTableA/graph/123/root?timestamp=1600000000").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(body.len(), 8);
    assert_eq!(codec::decode(&body).unwrap(), vec![h.graph.current_root(123).await.unwrap()]);
}

#[tokio::test]
async fn test_root_from_body_matches_path_form() {
    let h = harness();
    let (_, _, by_path) = get(&h.router, "/1.0/flyTableA/graph/124/root").await;
    let (status, _, by_body) = post(&h.router, "/1.0/flyTableA/graph/root", None, "[124]").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_path, by_body);
}

#[tokio::test]
async fn test_root_before_creation_is_not_found() {
    let h = harness();
    let (status, _, body) = get(&h.router, "/1.0/flyTableA/graph/123/root?timestamp=1000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope(&body).status_code, 404);
}

#[tokio::test]
async fn test_bad_timestamp_is_client_error() {
    let h = harness();
    let (status, headers, body) = get(&h.router, "/1.0/flyTableA/graph/123/root?timestamp=yesterday").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let env = envelope(&body);
    assert_eq!(env.status_code, 400);
    assert!(!env.message.is_empty());
    assert!(env.traceback.is_none());
}

#[tokio::test]
async fn test_invalid_table_is_not_found_and_not_cached() {
    let h = harness();
    let (status, _, body) = get(&h.router, "/1.0/mouseTable/info").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(envelope(&body).message.contains("mouseTable"));
    assert_eq!(h.backend.connect_count(), 0);
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let h = harness();
    let (status, _, _) = get(&h.router, "/1.0/flyMissing/info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_handle_is_built_once_per_table() {
    let h = harness();
    get(&h.router, "/1.0/flyTableA/info").await;
    get(&h.router, "/1.0/flyTableA/segment/123/children").await;
    get(&h.router, "/1.0/flyTableA/graph/123/root").await;
    assert_eq!(h.backend.connect_count(), 1);
}

#[tokio::test]
async fn test_info_is_json() {
    let h = harness();
    let (status, headers, body) = get(&h.router, "/1.0/flyTableA/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert!(serde_json::from_slice::<serde_json::Value>(&body).unwrap().is_object());
}

#[tokio::test]
async fn test_merge_without_edit_role_is_forbidden() {
    let h = harness();
    let mut rx = h.bus.subscribe();

    let (status, _, body) = post(&h.router, "/1.0/flyTableA/graph/merge", Some(VIEWER), "[10, 20]").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(envelope(&body).status_code, 403);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.graph.operation_count().await, 0);
    assert_eq!(h.backend.connect_count(), 0);
}

#[tokio::test]
async fn test_merge_without_token_is_forbidden() {
    let h = harness();
    let (status, _, _) = post(&h.router, "/1.0/flyTableA/graph/merge", None, "[10, 20]").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = post(&h.router, "/1.0/flyTableA/graph/merge", Some("stolen"), "[10, 20]").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.graph.operation_count().await, 0);
}

#[tokio::test]
async fn test_merge_publishes_new_root() {
    let h = harness();
    let mut rx = h.bus.subscribe();

    let (status, _, body) = post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "[10, 20]").await;

    assert_eq!(status, StatusCode::OK);
    let new_root = codec::decode(&body).unwrap();
    assert_eq!(new_root.len(), 1);
    assert_eq!(h.graph.current_root(21).await.unwrap(), new_root[0]);

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, "merge");
    assert_eq!(event.table_id.as_deref(), Some("flyTableA"));
    assert_eq!(event.user_id.as_deref(), Some("7"));
    assert_eq!(event.new_root_ids, new_root);
}

#[tokio::test]
async fn test_merge_requires_exactly_two_ids() {
    let h = harness();
    let (status, _, _) = post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "[10, 20, 21]").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.graph.operation_count().await, 0);
}

#[tokio::test]
async fn test_split_publishes_exactly_one_event() {
    let h = harness();
    let mut rx = h.bus.subscribe();

    let (status, _, body) = post(
        &h.router,
        "/1.0/flyTableA/graph/split",
        Some(EDITOR),
        r#"{"sources": [123], "sinks": [[125, 3.0, 1.0, 1.0]]}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let new_roots = codec::decode(&body).unwrap();
    assert_eq!(new_roots.len(), 2);
    assert_ne!(h.graph.current_root(123).await.unwrap(), h.graph.current_root(125).await.unwrap());

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, "split");
    assert_eq!(event.new_root_ids, new_roots);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_split_rejects_malformed_body() {
    let h = harness();
    let (status, _, _) = post(&h.router, "/1.0/flyTableA/graph/split", Some(EDITOR), r#"{"sources": [123]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = post(
        &h.router,
        "/1.0/flyTableA/graph/split",
        Some(EDITOR),
        r#"{"sources": [123], "sinks": [123]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_bounds_is_client_error() {
    let h = harness();
    let root = h.graph.current_root(123).await.unwrap();

    let (status, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/leaves?bounds=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope(&body).status_code, 400);

    let (status, _, _) = get(&h.router, "/1.0/flyTableA/segment/55/leaves?bounds=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_leaves_within_bounds() {
    let h = harness();
    let root = h.graph.current_root(123).await.unwrap();

    let (status, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/leaves")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codec::decode(&body).unwrap(), vec![123, 124, 125]);

    let (_, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/leaves?bounds=0-3_0-10_0-5")).await;
    assert_eq!(codec::decode(&body).unwrap(), vec![123, 124]);
}

#[tokio::test]
async fn test_children_and_subgraph() {
    let h = harness();
    let root = h.graph.current_root(123).await.unwrap();

    let (_, _, body) = post(&h.router, &format!("/1.0/flyTableA/segment/{root}/children"), None, "").await;
    assert_eq!(codec::decode(&body).unwrap(), vec![123, 124, 125]);

    let (status, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/subgraph")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codec::decode(&body).unwrap(), vec![123, 124, 124, 125]);
}

#[tokio::test]
async fn test_non_numeric_node_id_is_client_error() {
    let h = harness();
    let (status, _, _) = get(&h.router, "/1.0/flyTableA/segment/abc/children").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_and_merge_logs() {
    let h = harness();
    post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "[10, 20]").await;
    let root = h.graph.current_root(10).await.unwrap();

    let (status, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/change_log")).await;
    assert_eq!(status, StatusCode::OK);
    let log: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(log["operations"].as_array().unwrap().len(), 1);
    assert_eq!(log["operations"][0]["kind"], "merge");
    assert_eq!(log["past_ids"].as_array().unwrap().len(), 2);

    let (_, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/merge_log?timestamp=4000000000")).await;
    let log: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(log["operations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_contact_sites_partners_flag() {
    let h = harness();
    let root = h.graph.current_root(10).await.unwrap();
    let partner_a = h.graph.current_root(125).await.unwrap();
    let partner_b = h.graph.current_root(20).await.unwrap();

    let (_, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/contact_sites")).await;
    let sites: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(sites["all"].as_array().unwrap().len(), 2);

    let (_, _, body) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/contact_sites?partners=true")).await;
    let sites: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(sites.get(partner_a.to_string()).is_some());
    assert!(sites.get(partner_b.to_string()).is_some());

    let (status, _, _) = get(&h.router, &format!("/1.0/flyTableA/segment/{root}/contact_sites?partners=maybe")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_audit_failure_never_changes_the_response() {
    let h = harness_with(Arc::new(FailingSink), Environment::Development);

    let (status, _, body) = get(&h.router, "/1.0/flyTableA/graph/123/root?timestamp=1600000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codec::decode(&body).unwrap(), vec![h.graph.current_root(123).await.unwrap()]);

    let (status, _, _) = get(&h.router, "/1.0/flyTableA/graph/123/root?timestamp=nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_every_request_is_audited() {
    let sink = Arc::new(RecordingSink::default());
    let h = harness_with(sink.clone(), Environment::Development);

    get(&h.router, "/1.0/flyTableA/graph/123/root").await;
    post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "[10, 20]").await;
    get(&h.router, "/nowhere").await;

    let entries = sink.entries();
    assert_eq!(entries.len(), 3);

    assert_eq!(entries[0].request_type, "root");
    assert_eq!(entries[0].table_id.as_deref(), Some("flyTableA"));
    assert_eq!(entries[0].status_code, 200);
    assert_eq!(entries[0].url, "/1.0/flyTableA/graph/123/root");

    assert_eq!(entries[1].request_type, "merge");
    assert_eq!(entries[1].user_id, "7");
    assert_eq!(entries[1].request_body, "[10, 20]");

    assert_eq!(entries[2].status_code, 404);
    assert_eq!(entries[2].table_id, None);
}

#[tokio::test]
async fn test_unclassified_failure_carries_trace_in_development() {
    let router = with_backend(Arc::new(BrokenBackend), Environment::Development);
    let (status, _, body) = get(&router, "/1.0/flyTableA/info").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let env = envelope(&body);
    assert_eq!(env.status_code, 500);
    assert_eq!(env.message, "opening graph table");
    assert!(env.traceback.unwrap().iter().any(|l| l.contains("bigtable handshake reset")));
}

#[tokio::test]
async fn test_unclassified_failure_hides_trace_in_production() {
    let router = with_backend(Arc::new(BrokenBackend), Environment::Production);
    let (status, _, body) = get(&router, "/1.0/flyTableA/info").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(envelope(&body).traceback.is_none());
}

#[tokio::test]
async fn test_panic_becomes_error_envelope() {
    let router = with_backend(Arc::new(PanickingBackend), Environment::Development);
    let (status, _, body) = get(&router, "/1.0/flyTableA/info").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let env = envelope(&body);
    assert!(env.message.contains("engine client bug"));
    assert!(env.traceback.is_some());
}

#[tokio::test]
async fn test_unmatched_route_is_envelope() {
    let h = harness();
    let (status, _, body) = get(&h.router, "/2.0/flyTableA/info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(envelope(&body).message.contains("/2.0/flyTableA/info"));
}

#[tokio::test]
async fn test_wrong_method_is_envelope() {
    let h = harness();
    let (status, headers, body) = get(&h.router, "/1.0/flyTableA/graph/merge").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(headers.contains_key(header::ALLOW));
    assert_eq!(envelope(&body).status_code, 405);
}

#[tokio::test]
async fn test_index_and_sleep() {
    let h = harness();
    let (status, _, body) = get(&h.router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).starts_with("ChunkedGraph Gateway -- "));

    let (_, _, body) = get(&h.router, "/sleep/0").await;
    assert_eq!(&body[..], b"zzz... 0 ... awake");

    let (status, _, body) = get(&h.router, "/sleep/soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope(&body).status_code, 400);
}

#[tokio::test]
async fn test_ws_greets_then_forwards_events() {
    let h = harness();
    let mut ws = connect_ws(h.router.clone()).await;

    let greeting = next_event(&mut ws).await;
    assert_eq!(greeting.kind, CONNECTED);
    assert!(greeting.table_id.is_none());

    let table = TableId::parse("flyTableA", "fly").unwrap();
    let event = NotificationEvent::mutation("split", &table, "7", vec![900, 901]);
    h.bus.publish(&event).await;
    assert_eq!(next_event(&mut ws).await, event);

    let (status, _, body) = post(&h.router, "/1.0/flyTableA/graph/merge", Some(EDITOR), "[10, 20]").await;
    assert_eq!(status, StatusCode::OK);
    let merged = next_event(&mut ws).await;
    assert_eq!(merged.kind, "merge");
    assert_eq!(merged.table_id.as_deref(), Some("flyTableA"));
    assert_eq!(merged.new_root_ids, codec::decode(&body).unwrap());
}

#[tokio::test]
async fn test_ws_disconnect_releases_subscription() {
    let h = harness();
    let mut ws = connect_ws(h.router.clone()).await;
    next_event(&mut ws).await;
    assert_eq!(h.bus.receiver_count(), 1);

    drop(ws);

    let released = async {
        while h.bus.receiver_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    assert!(
        tokio::time::timeout(Duration::from_millis(500), released).await.is_ok(),
        "subscriber still registered after the client went away"
    );
}

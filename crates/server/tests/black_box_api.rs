use std::net::SocketAddr;
use std::sync::Arc;

use buckley_core::CancellationToken;
use buckley_events::NewEvent;
use buckley_server::app;
use buckley_server::config::{
    AcpConfig, BreakerConfigOpts, Config, CoordinatorConfig, EventStoreConfig, EventStoreKind, OrchestratorConfig,
    PolicyConfig, TrustLevel, WebSocketConfig,
};
use buckley_server::AppState;
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::json;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

struct TestServer {
    base_url: String,
    state: Arc<AppState>,
    handle: tokio::task::JoinHandle<()>,
}

fn test_config(db_path: &std::path::Path) -> Config {
    Config {
        coordinator: CoordinatorConfig { address: "127.0.0.1:0".to_string(), max_agents: 8, features: vec![] },
        acp: AcpConfig { allow_insecure_local: true },
        event_store: EventStoreConfig {
            kind: EventStoreKind::Relational,
            path_or_url: db_path.to_string_lossy().to_string(),
            stream_prefix: "buckley-test".to_string(),
            snapshot_bucket: "acp_snapshots".to_string(),
        },
        tool_approval_timeout: std::time::Duration::from_millis(200),
        breaker: BreakerConfigOpts { max_failures: 5, timeout: std::time::Duration::from_secs(30), success_threshold: 1 },
        websocket: WebSocketConfig {
            queue_size: 16,
            ping_interval: std::time::Duration::from_secs(54),
            read_deadline: std::time::Duration::from_secs(60),
        },
        policy: PolicyConfig { trust_level: TrustLevel::Supervised },
        orchestrator: OrchestratorConfig { endpoint: None, model_manager_configured: true },
        project_root: std::env::temp_dir(),
        jwt_secret: b"test-secret".to_vec(),
        p2p_token_secret: b"test-p2p-secret".to_vec(),
        tls_cert_path: None,
        tls_key_path: None,
    }
}

impl TestServer {
    async fn spawn(config: Config) -> Self {
        let (router, state, _cancel) = app::build_app(config).await.expect("build_app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, make_service).await.unwrap();
        });

        Self { base_url, state, handle }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/observability/stream", self.base_url.trim_start_matches("http://"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn whoami_requires_some_identity() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;

    let client = reqwest::Client::new();
    let res = client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();

    // Plaintext transport without the insecure-local header still resolves
    // to a loopback identity when ACP_ALLOW_INSECURE_LOCAL is set (§4.4).
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_then_discover_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/agents", srv.base_url))
        .header("x-buckley-agent-id", "agent-1")
        .json(&json!({ "id": "agent-1", "type": "worker", "endpoint": "tcp://127.0.0.1:9000", "capabilities": ["execute_shell"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let session_token = body["session_token"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/agents?type=worker", srv.base_url))
        .bearer_auth(&session_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let services = body["services"].as_array().unwrap();
    assert!(services.iter().any(|s| s["id"] == "agent-1"));
}

#[tokio::test]
async fn registering_the_same_agent_id_twice_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    let register = || {
        client
            .post(format!("{}/agents", srv.base_url))
            .header("x-buckley-agent-id", "agent-dup")
            .json(&json!({ "id": "agent-dup", "type": "worker", "endpoint": "tcp://127.0.0.1:9001" }))
            .send()
    };

    let first = register().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = register().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn session_context_update_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/sessions", srv.base_url))
        .header("x-buckley-agent-id", "agent-2")
        .json(&json!({ "agent_id": "agent-2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();
    let session_id = session["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/sessions/{}/context", srv.base_url, session_id))
        .header("x-buckley-agent-id", "agent-2")
        .json(&json!({ "add_files": ["src/main.rs"], "remove_files": [], "metadata": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let context: serde_json::Value = res.json().await.unwrap();
    assert_eq!(context["files"]["src/main.rs"], true);
}

#[tokio::test]
async fn message_routes_to_llm_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/messages", srv.base_url))
        .header("x-buckley-agent-id", "agent-5")
        .json(&json!({ "agent_id": "agent-5", "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["routed_to"], "llm");
}

#[tokio::test]
async fn message_routes_to_orchestrator_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir.path().join("events.sqlite"));
    config.orchestrator.endpoint = Some("tcp://127.0.0.1:9200".to_string());
    let srv = TestServer::spawn(config).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/messages", srv.base_url))
        .header("x-buckley-agent-id", "agent-6")
        .json(&json!({ "agent_id": "agent-6", "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["routed_to"], "orchestrator");
}

#[tokio::test]
async fn message_fails_precondition_with_no_collaborator_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir.path().join("events.sqlite"));
    config.orchestrator.model_manager_configured = false;
    let srv = TestServer::spawn(config).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/messages", srv.base_url))
        .header("x-buckley-agent-id", "agent-7")
        .json(&json!({ "agent_id": "agent-7", "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn applying_edits_outside_project_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/editor/apply-edits", srv.base_url))
        .header("x-buckley-agent-id", "agent-3")
        .json(&json!({
            "edits": [{ "uri": "../outside.txt", "range": null, "new_text": "x" }],
            "dry_run": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn p2p_token_is_single_use() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/agents", srv.base_url))
        .header("x-buckley-agent-id", "target-1")
        .json(&json!({ "id": "target-1", "type": "worker", "endpoint": "tcp://127.0.0.1:9100" }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/p2p/endpoint?requester_id=agent-4&target_id=target-1", srv.base_url))
        .header("x-buckley-agent-id", "agent-4")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let endpoint: serde_json::Value = res.json().await.unwrap();
    let token = endpoint["token"].as_str().unwrap().to_string();

    let first = client
        .post(format!("{}/p2p/connect", srv.base_url))
        .header("x-buckley-agent-id", "agent-4")
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client
        .post(format!("{}/p2p/connect", srv.base_url))
        .header("x-buckley-agent-id", "agent-4")
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::PRECONDITION_FAILED);
}

fn ws_request(url: &str) -> tokio_tungstenite::tungstenite::handshake::client::Request {
    let mut req = url.into_client_request().unwrap();
    req.headers_mut().insert("x-buckley-agent-id", "observer-1".parse().unwrap());
    req
}

/// §8 property 3 + scenario S6: a subscriber that asked for `task.created`
/// only receives events of that type, and receives nothing before it
/// subscribes.
#[tokio::test]
async fn websocket_subscribe_filters_by_event_type() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(ws_request(&srv.ws_url())).await.unwrap();

    // Published before any subscribe frame: must not be observed once we
    // do subscribe (the `subscribed` flag, not just the type filter,
    // gates delivery).
    let cancel = CancellationToken::new();
    srv.state
        .event_store
        .append("s1", vec![NewEvent::new("agent.registered", json!({"early": true}))], &cancel)
        .await
        .unwrap();

    socket
        .send(WsMessage::Text(json!({"action": "subscribe", "event_types": ["task.created"]}).to_string()))
        .await
        .unwrap();

    // Give the reader loop a moment to apply the subscription before we
    // publish the events under test.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    srv.state
        .event_store
        .append("s1", vec![NewEvent::new("agent.registered", json!({"n": 1}))], &cancel)
        .await
        .unwrap();
    srv.state
        .event_store
        .append("s1", vec![NewEvent::new("task.created", json!({"n": 2}))], &cancel)
        .await
        .unwrap();

    let received = tokio::time::timeout(std::time::Duration::from_secs(2), socket.next())
        .await
        .expect("timed out waiting for event")
        .unwrap()
        .unwrap();
    let WsMessage::Text(text) = received else { panic!("expected a text frame") };
    let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(envelope["type"], "task.created");
    assert_eq!(envelope["data"]["n"], 2);
}

/// §8 property 4: with a slow subscriber A and a fast subscriber B, B
/// receives every published event and A's queue drops frames once full
/// without stalling B.
#[tokio::test]
async fn websocket_backpressure_isolates_slow_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let srv = TestServer::spawn(test_config(&dir.path().join("events.sqlite"))).await;

    let (mut slow, _) = tokio_tungstenite::connect_async(ws_request(&srv.ws_url())).await.unwrap();
    let (mut fast, _) = tokio_tungstenite::connect_async(ws_request(&srv.ws_url())).await.unwrap();

    for socket in [&mut slow, &mut fast] {
        socket.send(WsMessage::Text(json!({"action": "subscribe", "event_types": []}).to_string())).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let fast_reader = tokio::spawn(async move {
        let mut count = 0;
        while count < 1000 {
            match tokio::time::timeout(std::time::Duration::from_secs(5), fast.next()).await {
                Ok(Some(Ok(WsMessage::Text(_)))) => count += 1,
                Ok(Some(Ok(_))) => continue,
                _ => break,
            }
        }
        count
    });

    let cancel = CancellationToken::new();
    for n in 0..1000 {
        srv.state
            .event_store
            .append("backpressure", vec![NewEvent::new("bulk", json!({"n": n}))], &cancel)
            .await
            .unwrap();
    }

    let fast_count = fast_reader.await.unwrap();
    assert_eq!(fast_count, 1000, "fast subscriber must receive every published event");

    // The slow subscriber never drained its queue while the 1000 events
    // were being published; it should have at least a full queue's worth
    // buffered and never more than what was published.
    let mut slow_count = 0;
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(200), slow.next()).await {
            Ok(Some(Ok(WsMessage::Text(_)))) => slow_count += 1,
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    assert!(slow_count >= 16, "slow subscriber should have at least a full queue buffered, got {slow_count}");
    assert!(slow_count <= 1000, "slow subscriber cannot receive more than was published, got {slow_count}");
}

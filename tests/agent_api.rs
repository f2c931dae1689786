//! End-to-end coverage of the Host-Agent-facing HTTP surface (spec §6)
//! against the literal wire shapes, driven through the real router with an
//! in-memory sqlite store and no live host/container infrastructure.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use pinacle_core::config::{Settings, StorageBackend, Timeouts};
use pinacle_core::control_plane::server::build_router;
use pinacle_core::control_plane::AppState;
use pinacle_core::host::HostRegistry;
use pinacle_core::orchestrator::Orchestrator;
use pinacle_core::snapshot::{FilesystemStorage, SnapshotEngine};
use pinacle_core::store::{SqliteStore, Store};

const API_KEY: &str = "test-api-key";

async fn test_state() -> AppState {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let hosts = Arc::new(HostRegistry::new());
    let storage = Arc::new(FilesystemStorage::new(std::env::temp_dir().join("pinacle-test-snapshots").display().to_string()));
    let snapshot_engine = Arc::new(SnapshotEngine::new(store.clone(), hosts.clone(), storage));
    let timeouts = Timeouts::default();
    let orchestrator = Arc::new(Orchestrator::with_host_registry(store.clone(), hosts.clone(), &timeouts));

    let settings = Arc::new(Settings {
        api_url: "http://localhost:8080".into(),
        api_key: API_KEY.into(),
        dev_target: None,
        ssh_user: "pinacle".into(),
        ssh_port: 22,
        ssh_private_key_path: "/root/.ssh/id_ed25519".into(),
        container_cli: "docker".into(),
        sandboxed_runtime_class: "runsc".into(),
        storage: StorageBackend::Filesystem { base_path: "/tmp/pinacle-snapshots".into() },
        proxy_token_signing_key: "test-signing-key".into(),
        proxy_base_domain: "pinacle.dev".into(),
        timeouts,
        port_range: 20_000..=20_100,
        dev_mode: true,
    });

    AppState {
        store,
        hosts,
        orchestrator,
        snapshot_engine,
        settings,
        timeouts,
        agent_api_key: API_KEY.into(),
    }
}

async fn post(state: &AppState, path: &str, body: Value) -> (StatusCode, Value) {
    let router = build_router(state.clone());
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, parsed)
}

#[tokio::test]
async fn register_returns_just_the_id() {
    let state = test_state().await;
    let (status, body) = post(
        &state,
        "/register",
        json!({
            "id": "server_01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "hostname": "host-a",
            "ipAddress": "10.0.0.5",
            "cpuCores": 8,
            "memoryMb": 16384,
            "diskGb": 200,
            "sshHost": "10.0.0.5",
            "sshPort": 22,
            "sshUser": "pinacle",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": "server_01ARZ3NDEKTSV4RRFFQ69G5FAV" }));
}

#[tokio::test]
async fn heartbeat_for_unknown_server_is_404() {
    let state = test_state().await;
    let (status, _) = post(&state, "/heartbeat", json!({ "serverId": "server_does_not_exist" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_then_heartbeat_then_metrics_round_trip() {
    let state = test_state().await;
    let server_id = "server_01ARZ3NDEKTSV4RRFFQ69G5FAW";

    let (status, _) = post(
        &state,
        "/register",
        json!({
            "id": server_id,
            "hostname": "host-b",
            "ipAddress": "10.0.0.6",
            "cpuCores": 4,
            "memoryMb": 8192,
            "diskGb": 100,
            "sshHost": "10.0.0.6",
            "sshPort": 22,
            "sshUser": "pinacle",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&state, "/heartbeat", json!({ "serverId": server_id })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post(
        &state,
        "/metrics",
        json!({
            "serverId": server_id,
            "cpuUsagePercent": 12.5,
            "memoryUsageMb": 2048.0,
            "diskUsageGb": 10.0,
            "activePodsCount": 1,
            "podMetrics": [{
                "podId": "pod_01ARZ3NDEKTSV4RRFFQ69G5FAX",
                "containerId": "abc123",
                "cpuUsagePercent": 3.0,
                "memoryUsageMb": 256.0,
                "diskUsageMb": 50.0,
                "networkRxBytes": 1000,
                "networkTxBytes": 2000,
            }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn agent_routes_reject_missing_api_key() {
    let state = test_state().await;
    let router = build_router(state.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/heartbeat")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(json!({ "serverId": "server_x" }).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

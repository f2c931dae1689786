//! Route handlers (spec §4.5's operation taxonomy mapped onto HTTP).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::{Pod, PodId, PodStatus};

use super::dto::*;
use super::error::ApiResult;
use super::host_connect::build_host_handle;
use super::host_select::select_host;
use super::state::AppState;

pub async fn register_server(
    State(state): State<AppState>,
    Json(req): Json<RegisterServerRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let now = Utc::now();
    let existing = state.store.get_server(&req.id).await?;
    let ssh = req.ssh_endpoint();
    let server = crate::model::Server {
        id: req.id,
        hostname: req.hostname,
        ip_address: req.ip_address,
        cpu_cores: req.cpu_cores,
        memory_mb: req.memory_mb,
        disk_gb: req.disk_gb,
        ssh,
        local_vm_name: req.local_vm_name,
        status: crate::model::ServerStatus::Online,
        last_heartbeat_at: now,
        created_at: existing.map(|s| s.created_at).unwrap_or(now),
    };
    state.store.upsert_server(&server).await?;

    match build_host_handle(&server, &state.settings) {
        Ok((conn, runtime)) => state.hosts.register(server.id.to_string(), conn, runtime),
        Err(err) => warn!(host_id = %server.id, error = %err, "could not build host connection on register"),
    }

    info!(host_id = %server.id, "server registered");
    Ok(Json(server_response(&server)))
}

pub async fn heartbeat(State(state): State<AppState>, Json(req): Json<HeartbeatRequest>) -> Result<StatusCode, StatusCode> {
    match state.store.get_server(&req.server_id).await {
        Ok(Some(_)) => {
            if state.store.touch_heartbeat(&req.server_id, Utc::now()).await.is_err() {
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// On 404 the host agent is expected to re-register and retry (spec §4.4
/// step 3) — the "not found" here is the agent's own stable id going
/// unrecognized, never surfaced as anything but 404.
pub async fn report_metrics(State(state): State<AppState>, Json(req): Json<ReportMetricsRequest>) -> Result<StatusCode, StatusCode> {
    if state.store.get_server(&req.server_id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let (server_sample, pod_samples) = req.into_samples();
    if state.store.record_server_metrics(&server_sample).await.is_err() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    for sample in &pod_samples {
        state.store.record_pod_metrics(sample).await.ok();
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_pod(State(state): State<AppState>, Json(req): Json<CreatePodRequest>) -> ApiResult<Json<serde_json::Value>> {
    crate::model::pod::validate_slug(&req.slug)?;
    let tier = crate::model::Tier::from_tag(&req.tier_tag)?;
    let (config, name, slug, owner_user_id, owner_team_id) = req.into_config();

    let now = Utc::now();
    let pod = Pod {
        id: PodId::new(),
        name,
        slug,
        owner_user_id,
        owner_team_id,
        host_id: None,
        container_id: None,
        template: config.template.clone(),
        tier,
        config,
        ports: vec![],
        status: PodStatus::Creating,
        last_error_message: None,
        archived_at: None,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_pod(&pod).await?;

    let host = select_host(state.store.as_ref(), state.timeouts.heartbeat_stale).await?;
    state.orchestrator.provision(pod.id, host.id.to_string()).await?;

    Ok(Json(pod_id_response(pod.id)))
}

pub async fn start_pod(State(state): State<AppState>, Path(pod_id): Path<PodId>) -> ApiResult<StatusCode> {
    state.orchestrator.start(pod_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_pod(State(state): State<AppState>, Path(pod_id): Path<PodId>) -> ApiResult<StatusCode> {
    state.orchestrator.stop(pod_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_pod(State(state): State<AppState>, Path(pod_id): Path<PodId>) -> ApiResult<StatusCode> {
    state.orchestrator.delete(pod_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry_pod(State(state): State<AppState>, Path(pod_id): Path<PodId>) -> ApiResult<StatusCode> {
    state.orchestrator.retry(pod_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn rebuild_pod(
    State(state): State<AppState>,
    Path(pod_id): Path<PodId>,
    Json(req): Json<RebuildPodRequest>,
) -> ApiResult<StatusCode> {
    state.orchestrator.rebuild(pod_id, req.from_snapshot).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_pod_status(
    State(state): State<AppState>,
    Path(pod_id): Path<PodId>,
    Query(query): Query<PodStatusQuery>,
) -> ApiResult<Json<PodStatusResponse>> {
    let pod = state
        .store
        .get_pod(&pod_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("pod {pod_id} not found")))?;
    let logs = state.store.pod_logs_after(&pod_id, query.after_log_id.unwrap_or(0)).await?;
    Ok(Json(PodStatusResponse { pod, logs }))
}

pub async fn create_snapshot(State(state): State<AppState>, Path(pod_id): Path<PodId>) -> ApiResult<Json<CreateSnapshotResponse>> {
    let pod = state
        .store
        .get_pod(&pod_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("pod {pod_id} not found")))?;
    let record = state.snapshot_engine.create(&pod).await?;
    Ok(Json(CreateSnapshotResponse {
        id: record.id,
        storage_path: record.storage_path,
        size_bytes: record.size_bytes,
    }))
}

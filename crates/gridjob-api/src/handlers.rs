//! REST API handlers.
//!
//! Each handler forwards to the [`ClusterRegistry`] implementation of the
//! shared `LocalCluster` and wraps the result in an [`ApiResponse`].

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gridjob_cluster::wire::ApiResponse;
use gridjob_cluster::{ClusterError, ClusterRegistry};
use gridjob_core::{Dag, DeploymentResource, JobConfig};
use serde::Serialize;
use tracing::warn;

use crate::ApiState;

fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(ApiResponse::<()>::err(msg))).into_response()
}

/// HTTP status for a cluster error.
pub fn status_for(err: &ClusterError) -> StatusCode {
    match err {
        ClusterError::JobNotFound(_) => StatusCode::NOT_FOUND,
        ClusterError::JobAlreadyExists(_)
        | ClusterError::InvalidStatus { .. }
        | ClusterError::ResourceConflict { .. }
        | ClusterError::ExecutionAlreadyStarted(_)
        | ClusterError::NotRunning(_) => StatusCode::CONFLICT,
        ClusterError::GraphRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ClusterError::Codec(_) | ClusterError::InvalidJobName(_) => StatusCode::BAD_REQUEST,
        ClusterError::State(_)
        | ClusterError::Transport(_)
        | ClusterError::Remote { .. }
        | ClusterError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cluster_error(err: ClusterError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "cluster operation failed");
    }
    error_response(&err.to_string(), status)
}

fn respond<T: Serialize>(result: Result<T, ClusterError>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(e) => cluster_error(e),
    }
}

// ── Jobs ───────────────────────────────────────────────────────

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<ApiState>) -> impl IntoResponse {
    respond(state.cluster.list_jobs())
}

/// POST /api/v1/jobs/:name
pub async fn register_job(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(config): Json<JobConfig>,
) -> impl IntoResponse {
    match state.cluster.register_job(&name, &config).await {
        Ok(()) => (StatusCode::CREATED, ok("registered")).into_response(),
        Err(e) => cluster_error(e),
    }
}

/// DELETE /api/v1/jobs/:name
pub async fn destroy_job(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.cluster.destroy_job(&name).await.map(|()| "destroyed"))
}

// ── Deployment ─────────────────────────────────────────────────

/// PUT /api/v1/jobs/:name/resources
pub async fn deploy_resources(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(resources): Json<Vec<DeploymentResource>>,
) -> impl IntoResponse {
    respond(
        state
            .cluster
            .deploy_resources(&name, &resources)
            .await
            .map(|()| resources.len()),
    )
}

/// PUT /api/v1/jobs/:name/graph
pub async fn submit_graph(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(graph): Json<Dag>,
) -> impl IntoResponse {
    respond(state.cluster.submit_graph(&name, &graph).await.map(|()| "submitted"))
}

// ── Execution ──────────────────────────────────────────────────

/// POST /api/v1/jobs/:name/execution
pub async fn start_execution(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.cluster.start_execution(&name).await {
        Ok(()) => (StatusCode::ACCEPTED, ok("started")).into_response(),
        Err(e) => cluster_error(e),
    }
}

/// GET /api/v1/jobs/:name/execution
///
/// Long poll: responds once the execution has an outcome.
pub async fn await_completion(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.cluster.await_completion(&name).await)
}

/// POST /api/v1/jobs/:name/interrupt
pub async fn request_interrupt(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.cluster.request_interrupt(&name).await.map(|()| "interrupting"))
}

/// GET /api/v1/jobs/:name/accumulators
pub async fn fetch_accumulators(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.cluster.fetch_accumulators(&name).await)
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ok("ok")
}

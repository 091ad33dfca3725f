//! gridjob-api — REST API for a GridJob cluster.
//!
//! Exposes a [`LocalCluster`] so that `RemoteCluster` clients can drive
//! it over HTTP.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/jobs` | List job records |
//! | POST | `/api/v1/jobs/{name}` | Register a job |
//! | DELETE | `/api/v1/jobs/{name}` | Destroy a job |
//! | PUT | `/api/v1/jobs/{name}/resources` | Deploy resources |
//! | PUT | `/api/v1/jobs/{name}/graph` | Submit the graph |
//! | POST | `/api/v1/jobs/{name}/execution` | Start execution |
//! | GET | `/api/v1/jobs/{name}/execution` | Wait for the outcome |
//! | POST | `/api/v1/jobs/{name}/interrupt` | Request interrupt |
//! | GET | `/api/v1/jobs/{name}/accumulators` | Accumulator snapshot |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use gridjob_cluster::LocalCluster;

/// Upper bound on request bodies; inline resources travel hex-encoded.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub cluster: Arc<LocalCluster>,
}

/// Build the complete API router.
pub fn build_router(cluster: Arc<LocalCluster>) -> Router {
    let api_state = ApiState { cluster };

    let api_routes = Router::new()
        .route("/jobs", get(handlers::list_jobs))
        .route(
            "/jobs/{name}",
            post(handlers::register_job).delete(handlers::destroy_job),
        )
        .route("/jobs/{name}/resources", put(handlers::deploy_resources))
        .route("/jobs/{name}/graph", put(handlers::submit_graph))
        .route(
            "/jobs/{name}/execution",
            post(handlers::start_execution).get(handlers::await_completion),
        )
        .route("/jobs/{name}/interrupt", post(handlers::request_interrupt))
        .route("/jobs/{name}/accumulators", get(handlers::fetch_accumulators))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}

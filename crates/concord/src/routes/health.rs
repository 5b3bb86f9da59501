//! Health check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;

use concord::cluster::PublisherState;
use concord_common::{ConsistencyReport, NodeRole};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check: are the local secure settings consistent with the
/// published hashes?
///
/// Returns:
/// - 200: consistent
/// - 503: soft disagreement (this node's secrets differ)
/// - 500: check aborted (corrupt metadata or inconsistent coordinator)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ConsistencyReport>), StatusCode> {
    let report = state.run_check().await.map_err(|e| {
        tracing::error!(error = %e, "Readiness check failed to run");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let status = match report.consistent {
        Some(true) => StatusCode::OK,
        Some(false) => StatusCode::SERVICE_UNAVAILABLE,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((status, Json(report)))
}

#[derive(Serialize)]
pub struct StatusResponse {
    node_id: String,
    role: NodeRole,
    coordinator: Option<String>,
    is_coordinator: bool,
    cluster_version: u64,
    publisher: PublisherState,
    declarations: Vec<String>,
    last_check: Option<ConsistencyReport>,
}

/// Node status (for monitoring)
pub async fn status(
    State(state): State<AppState>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        role: state.config.role,
        coordinator: state.cluster.leader(),
        is_coordinator: state.is_coordinator(),
        cluster_version: state.cluster.version(),
        publisher: state.publisher.state(),
        declarations: state.service.declarations().iter().map(|d| d.key()).collect(),
        last_check: state.last_report().await,
    })
}

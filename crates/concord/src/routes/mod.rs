//! HTTP route handlers for the Concord node.

use axum::{
    Router,
    routing::get,
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use concord_common::PublishedHashes;

use crate::state::AppState;

mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/status", get(health::status))

        // Published cluster metadata
        .route("/hashes", get(get_published_hashes))

        // Admin endpoints
        .nest("/admin", admin_routes())

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))

        // Add shared state
        .with_state(state)
}

/// Admin routes (coordinator changes)
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/leader", get(get_leader).post(set_leader))
}

#[derive(Serialize)]
struct PublishedHashesResponse {
    version: u64,
    hashes: PublishedHashes,
}

/// Currently published hashes, in the same format followers seed from
async fn get_published_hashes(
    State(state): State<AppState>,
) -> Json<PublishedHashesResponse> {
    Json(PublishedHashesResponse {
        version: state.cluster.version(),
        hashes: state.cluster.published_hashes(),
    })
}

// === Admin Handlers ===

#[derive(Serialize, Deserialize)]
struct LeaderBody {
    node_id: Option<String>,
}

async fn get_leader(
    State(state): State<AppState>,
) -> Json<LeaderBody> {
    Json(LeaderBody {
        node_id: state.cluster.leader(),
    })
}

/// Elect a new coordinator, or clear it with `null`. Electing this node
/// starts a new term and publishes freshly salted hashes.
async fn set_leader(
    State(state): State<AppState>,
    Json(payload): Json<LeaderBody>,
) -> Result<Json<LeaderBody>, StatusCode> {
    state
        .elect(payload.node_id.clone())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(leader = ?payload.node_id, "Coordinator changed via admin API");

    Ok(Json(LeaderBody {
        node_id: state.cluster.leader(),
    }))
}

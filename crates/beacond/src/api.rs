//! Admin REST API — registry mutations and dispatch introspection.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v1/status` | Node summary (counts, ring size) |
//! | GET | `/v1/peers` | List known peers |
//! | PUT | `/v1/peers` | Upsert a peer |
//! | DELETE | `/v1/peers/:host` | Remove a peer |
//! | GET | `/v1/instances` | List monitored instances |
//! | PUT | `/v1/instances` | Upsert an instance |
//! | GET | `/v1/instances/:id` | Fetch one instance |
//! | DELETE | `/v1/instances/:id` | Remove an instance |
//! | GET | `/v1/owned` | Instances this node currently owns |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};

use beaconmesh_dispatch::{Dispatcher, WatchRoster};
use beaconmesh_registry::{Catalog, InstanceSpec, MonitoredInstance, PeerNode};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<Catalog>,
    pub dispatcher: Arc<Dispatcher>,
    pub roster: Arc<WatchRoster>,
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Build the admin API router.
pub fn build_router(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/status", get(status))
        .route("/peers", get(list_peers).put(upsert_peer))
        .route("/peers/{host}", delete(remove_peer))
        .route("/instances", get(list_instances).put(upsert_instance))
        .route("/instances/{id}", get(get_instance).delete(remove_instance))
        .route("/owned", get(list_owned))
        .with_state(state);

    Router::new().nest("/v1", routes)
}

/// GET /v1/status
async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "host": state.dispatcher.local_host(),
        "peers": state.catalog.peer_count(),
        "instances": state.catalog.instance_count(),
        "membership": state.dispatcher.membership().len(),
        "ring_points": state.dispatcher.ring_point_count(),
        "owned": state.dispatcher.owned_count(),
        "watching": state.roster.watched_count(),
    }))
}

/// GET /v1/peers
async fn list_peers(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.catalog.peers())
}

/// PUT /v1/peers
async fn upsert_peer(
    State(state): State<ApiState>,
    Json(peer): Json<PeerNode>,
) -> impl IntoResponse {
    state.catalog.upsert_peer(peer.clone());
    ApiResponse::ok(peer)
}

/// DELETE /v1/peers/:host
async fn remove_peer(State(state): State<ApiState>, Path(host): Path<String>) -> impl IntoResponse {
    if state.catalog.remove_peer(&host) {
        ApiResponse::ok("removed").into_response()
    } else {
        error_response("peer not found", StatusCode::NOT_FOUND).into_response()
    }
}

/// GET /v1/instances
async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    let instances: Vec<MonitoredInstance> = state
        .catalog
        .instances()
        .into_iter()
        .map(|instance| (*instance).clone())
        .collect();
    ApiResponse::ok(instances)
}

/// PUT /v1/instances
async fn upsert_instance(
    State(state): State<ApiState>,
    Json(spec): Json<InstanceSpec>,
) -> impl IntoResponse {
    state.catalog.upsert_instance(spec.clone());
    ApiResponse::ok(spec)
}

/// GET /v1/instances/:id
async fn get_instance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.catalog.get_instance(&id) {
        Some(instance) => ApiResponse::ok((*instance).clone()).into_response(),
        None => error_response("instance not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// DELETE /v1/instances/:id
async fn remove_instance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.catalog.remove_instance(&id) {
        ApiResponse::ok("removed").into_response()
    } else {
        error_response("instance not found", StatusCode::NOT_FOUND).into_response()
    }
}

/// GET /v1/owned
async fn list_owned(State(state): State<ApiState>) -> impl IntoResponse {
    let owned: Vec<MonitoredInstance> = state
        .dispatcher
        .owned_instances()
        .into_iter()
        .map(|instance| (*instance).clone())
        .collect();
    ApiResponse::ok(owned)
}

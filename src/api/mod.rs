pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    history::{HistoryService, LastQueryStore},
    live_buffer::LiveBuffer,
    snapshots::SnapshotService,
    telemetry::StatusHandle,
};

use handlers::ApiDoc;

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub buffer: LiveBuffer,
    pub status: StatusHandle,
    pub history: HistoryService,
    pub snapshots: SnapshotService,
    pub last_query: LastQueryStore,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/live/readings", get(handlers::live_readings))
        .route("/live/status", get(handlers::live_status))
        .route("/history", get(handlers::fetch_history))
        .route("/snapshots", post(handlers::create_snapshot))
        .route("/snapshot", get(handlers::list_snapshots))
        .route(
            "/snapshot/{id}",
            get(handlers::snapshot_detail)
                .put(handlers::update_snapshot)
                .delete(handlers::delete_snapshot),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use utoipa::OpenApi;

use super::{
    dto::{HistoryParams, LiveStatus, SnapshotForm, SnapshotSummary},
    errors::ApiError,
    AppState,
};
use crate::{
    backend::models::{Message, MessagePayload, Snapshot},
    history::DateRange,
    models::Reading,
    telemetry::ConnectionState,
};

// ---------------------------------------------------------------------------
// Live view
// ---------------------------------------------------------------------------

/// The most recent readings, oldest first, at most the buffer capacity.
#[utoipa::path(
    get,
    path = "/live/readings",
    responses(
        (status = 200, description = "Recent readings in arrival order", body = Vec<Reading>),
    ),
    tag = "live"
)]
pub async fn live_readings(State(state): State<AppState>) -> Json<Vec<Reading>> {
    Json(state.buffer.snapshot().await)
}

/// Current state of the broker subscription.
#[utoipa::path(
    get,
    path = "/live/status",
    responses(
        (status = 200, description = "Connection state", body = LiveStatus),
    ),
    tag = "live"
)]
pub async fn live_status(State(state): State<AppState>) -> Json<LiveStatus> {
    Json(LiveStatus {
        state: state.status.get().await,
    })
}

// ---------------------------------------------------------------------------
// Historical queries
// ---------------------------------------------------------------------------

/// Fetch stored messages for a calendar date range.
///
/// The range is interpreted as whole UTC days. An empty response means no
/// data was stored in the range; a failing store maps to 502.
#[utoipa::path(
    get,
    path = "/history",
    params(
        ("from" = Option<String>, Query, description = "First day (YYYY-MM-DD), required"),
        ("to"   = Option<String>, Query, description = "Last day (YYYY-MM-DD), defaults to `from`"),
    ),
    responses(
        (status = 200, description = "Stored messages, backend order", body = Vec<Message>),
        (status = 400, description = "Missing start date"),
        (status = 502, description = "Store query failed"),
    ),
    tag = "history"
)]
pub async fn fetch_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let range = DateRange {
        from: params.from,
        to: params.to,
    };
    Ok(Json(state.history.fetch(&range).await?))
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Persist a snapshot of the last successful historical query.
#[utoipa::path(
    post,
    path = "/snapshots",
    request_body = SnapshotForm,
    responses(
        (status = 201, description = "Snapshot persisted"),
        (status = 400, description = "No historical data to snapshot"),
        (status = 502, description = "Store rejected the snapshot"),
    ),
    tag = "snapshots"
)]
pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(form): Json<SnapshotForm>,
) -> Result<StatusCode, ApiError> {
    let messages = state.last_query.messages().await;
    state
        .snapshots
        .create(&form.title, &form.description, messages)
        .await?;
    Ok(StatusCode::CREATED)
}

/// All snapshots, newest first, with display time ranges.
#[utoipa::path(
    get,
    path = "/snapshot",
    responses(
        (status = 200, description = "Snapshot summaries, newest first", body = Vec<SnapshotSummary>),
        (status = 502, description = "Store listing failed"),
    ),
    tag = "snapshots"
)]
pub async fn list_snapshots(
    State(state): State<AppState>,
) -> Result<Json<Vec<SnapshotSummary>>, ApiError> {
    // The store appends newest last; consumers want newest first.
    let mut snapshots = state.snapshots.list().await?;
    snapshots.reverse();
    Ok(Json(snapshots.into_iter().map(Into::into).collect()))
}

/// One snapshot with its full embedded message set.
#[utoipa::path(
    get,
    path = "/snapshot/{id}",
    params(("id" = String, Path, description = "Snapshot id")),
    responses(
        (status = 200, description = "Snapshot with messages", body = Snapshot),
        (status = 404, description = "No such snapshot"),
    ),
    tag = "snapshots"
)]
pub async fn snapshot_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(state.snapshots.detail(&id).await?))
}

/// Rename or re-describe a snapshot; the message set is immutable.
#[utoipa::path(
    put,
    path = "/snapshot/{id}",
    params(("id" = String, Path, description = "Snapshot id")),
    request_body = SnapshotForm,
    responses(
        (status = 204, description = "Snapshot updated"),
        (status = 404, description = "No such snapshot"),
    ),
    tag = "snapshots"
)]
pub async fn update_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<SnapshotForm>,
) -> Result<StatusCode, ApiError> {
    state
        .snapshots
        .update(&id, &form.title, &form.description)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a snapshot and drop any held detail reference to it.
#[utoipa::path(
    delete,
    path = "/snapshot/{id}",
    params(("id" = String, Path, description = "Snapshot id")),
    responses(
        (status = 204, description = "Snapshot deleted"),
        (status = 404, description = "No such snapshot"),
    ),
    tag = "snapshots"
)]
pub async fn delete_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.snapshots.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        live_readings,
        live_status,
        fetch_history,
        create_snapshot,
        list_snapshots,
        snapshot_detail,
        update_snapshot,
        delete_snapshot,
        health,
    ),
    components(schemas(
        Reading,
        Message,
        MessagePayload,
        Snapshot,
        SnapshotForm,
        SnapshotSummary,
        LiveStatus,
        ConnectionState,
    )),
    tags(
        (name = "live",      description = "Live telemetry window"),
        (name = "history",   description = "Historical range queries"),
        (name = "snapshots", description = "Persisted snapshot collections"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Air Monitor Service API",
        version = "0.1.0",
        description = "Live and historical environmental telemetry"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use axum_test::TestServer;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use crate::{
        api::{router, AppState},
        backend::BackendClient,
        history::{HistoryService, LastQueryStore},
        live_buffer::LiveBuffer,
        models::Reading,
        snapshots::SnapshotService,
        telemetry::{ConnectionState, StatusHandle},
    };

    const TOPIC: &str = "z2m/air-monitor";

    // -----------------------------------------------------------------------
    // Fake durable store
    // -----------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct FakeStore {
        /// Stored messages served by the range endpoint.
        messages: Arc<Vec<Value>>,
        /// Force the range endpoint to fail with a 500.
        fail_range: bool,
        /// Serve a list response without a `snapshots` array.
        break_list_shape: bool,
        range_hits: Arc<AtomicUsize>,
        snapshots: Arc<Mutex<Vec<Value>>>,
    }

    fn fake_backend(store: FakeStore) -> Router {
        Router::new()
            .route("/mqtt/{topic}/messages-by-time-range", get(fake_range))
            .route("/snapshots", post(fake_create))
            .route("/snapshot", get(fake_list))
            .route(
                "/snapshot/{id}",
                get(fake_detail).put(fake_update).delete(fake_delete),
            )
            .with_state(store)
    }

    async fn fake_range(
        State(store): State<FakeStore>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        store.range_hits.fetch_add(1, Ordering::SeqCst);
        if store.fail_range {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "store exploded" })),
            )
                .into_response();
        }

        let start: DateTime<Utc> = params["start"].parse().unwrap();
        let end: DateTime<Utc> = params["end"].parse().unwrap();
        let in_range: Vec<Value> = store
            .messages
            .iter()
            .filter(|m| {
                let ts: DateTime<Utc> = m["timestamp"].as_str().unwrap().parse().unwrap();
                ts >= start && ts <= end
            })
            .cloned()
            .collect();

        if in_range.is_empty() {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "Message": "No data found for the specified criteria." })),
            )
                .into_response()
        } else {
            Json(Value::Array(in_range)).into_response()
        }
    }

    async fn fake_create(State(store): State<FakeStore>, Json(mut body): Json<Value>) -> Response {
        let mut snapshots = store.snapshots.lock().await;
        body["id"] = json!(format!("s{}", snapshots.len() + 1));
        snapshots.push(body.clone());
        (StatusCode::CREATED, Json(body)).into_response()
    }

    async fn fake_list(State(store): State<FakeStore>) -> Json<Value> {
        if store.break_list_shape {
            return Json(json!({ "data": "not what you expected" }));
        }
        let snapshots = store.snapshots.lock().await;
        Json(json!({ "snapshots": *snapshots }))
    }

    async fn fake_detail(State(store): State<FakeStore>, Path(id): Path<String>) -> Response {
        let snapshots = store.snapshots.lock().await;
        match snapshots.iter().find(|s| s["id"] == json!(id)) {
            Some(snapshot) => Json(snapshot.clone()).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "snapshot not found" })),
            )
                .into_response(),
        }
    }

    async fn fake_update(
        State(store): State<FakeStore>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Response {
        let mut snapshots = store.snapshots.lock().await;
        match snapshots.iter_mut().find(|s| s["id"] == json!(id)) {
            Some(snapshot) => {
                snapshot["title"] = body["title"].clone();
                snapshot["description"] = body["description"].clone();
                StatusCode::NO_CONTENT.into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn fake_delete(State(store): State<FakeStore>, Path(id): Path<String>) -> Response {
        let mut snapshots = store.snapshots.lock().await;
        let before = snapshots.len();
        snapshots.retain(|s| s["id"] != json!(id));
        if snapshots.len() < before {
            StatusCode::NO_CONTENT.into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    /// Serve `router` on an OS-assigned port, returning its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    // -----------------------------------------------------------------------
    // Test wiring
    // -----------------------------------------------------------------------

    fn message_json(id: &str, timestamp: &str, co2: f64) -> Value {
        json!({
            "id": id,
            "timestamp": timestamp,
            "topic": TOPIC,
            "deserializedPayload": { "co2": co2, "temperature": 21.0, "humidity": 45.0 }
        })
    }

    fn app_state(backend_url: &str) -> AppState {
        let backend = BackendClient::new(backend_url).unwrap();
        let last_query = LastQueryStore::new();
        AppState {
            buffer: LiveBuffer::new(100),
            status: StatusHandle::new(),
            history: HistoryService::new(backend.clone(), TOPIC, last_query.clone()),
            snapshots: SnapshotService::new(backend),
            last_query,
        }
    }

    async fn server_with_store(store: FakeStore) -> (TestServer, AppState) {
        let backend_url = serve(fake_backend(store)).await;
        let state = app_state(&backend_url);
        (TestServer::new(router(state.clone())).unwrap(), state)
    }

    // -----------------------------------------------------------------------
    // GET /live/*
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn live_readings_reflect_the_buffer() {
        let (server, state) = server_with_store(FakeStore::default()).await;

        state
            .buffer
            .append(Reading {
                timestamp: Utc::now(),
                co2: 712.0,
                temperature: 22.5,
                humidity: 41.0,
            })
            .await;

        let resp = server.get("/live/readings").await;
        resp.assert_status_ok();
        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["co2"], 712.0);
    }

    #[tokio::test]
    async fn live_status_reports_the_connection_state() {
        let (server, state) = server_with_store(FakeStore::default()).await;

        let resp = server.get("/live/status").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["state"], "disconnected");

        state.status.set(ConnectionState::Connected).await;
        let body: Value = server.get("/live/status").await.json();
        assert_eq!(body["state"], "connected");
    }

    // -----------------------------------------------------------------------
    // GET /history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn history_returns_only_messages_inside_the_range() {
        let store = FakeStore {
            messages: Arc::new(vec![
                message_json("m1", "2024-01-01T00:00:00.000Z", 500.0),
                message_json("m2", "2024-01-02T23:59:59.000Z", 600.0),
                message_json("m3", "2024-01-05T12:00:00.000Z", 700.0),
            ]),
            ..FakeStore::default()
        };
        let (server, _) = server_with_store(store).await;

        let resp = server
            .get("/history")
            .add_query_param("from", "2024-01-01")
            .add_query_param("to", "2024-01-02")
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        let ids: Vec<&str> = body.iter().map(|m| m["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn history_without_from_is_rejected_before_the_store_is_called() {
        let store = FakeStore::default();
        let hits = store.range_hits.clone();
        let (server, _) = server_with_store(store).await;

        let resp = server.get("/history").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("start date"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn history_store_404_is_an_empty_success() {
        let (server, _) = server_with_store(FakeStore::default()).await;

        let resp = server
            .get("/history")
            .add_query_param("from", "2024-01-01")
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn history_store_500_maps_to_bad_gateway_with_store_detail() {
        let store = FakeStore {
            fail_range: true,
            ..FakeStore::default()
        };
        let (server, _) = server_with_store(store).await;

        let resp = server
            .get("/history")
            .add_query_param("from", "2024-01-01")
            .await;
        resp.assert_status(StatusCode::BAD_GATEWAY);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("store exploded"));
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn snapshot_create_persists_the_last_query_result() {
        let store = FakeStore {
            messages: Arc::new(vec![
                message_json("m1", "2024-01-01T08:00:00.000Z", 500.0),
                message_json("m2", "2024-01-01T09:00:00.000Z", 600.0),
            ]),
            ..FakeStore::default()
        };
        let snapshots = store.snapshots.clone();
        let (server, _) = server_with_store(store).await;

        server
            .get("/history")
            .add_query_param("from", "2024-01-01")
            .await
            .assert_status_ok();

        let resp = server
            .post("/snapshots")
            .json(&json!({ "title": "Morning", "description": "<p>calm air</p>" }))
            .await;
        resp.assert_status(StatusCode::CREATED);

        let stored = snapshots.lock().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["title"], "Morning");
        assert_eq!(stored[0]["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_create_without_a_prior_fetch_is_rejected() {
        let store = FakeStore::default();
        let snapshots = store.snapshots.clone();
        let (server, _) = server_with_store(store).await;

        let resp = server
            .post("/snapshots")
            .json(&json!({ "title": "Nothing", "description": "" }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("empty message set"));
        assert!(snapshots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_list_is_newest_first_with_time_ranges() {
        let store = FakeStore::default();
        {
            let mut snapshots = store.snapshots.lock().await;
            snapshots.push(json!({
                "id": "s1", "title": "First", "description": "",
                "messages": [
                    message_json("m1", "2024-01-01T06:00:00.000Z", 500.0),
                    message_json("m2", "2024-01-01T18:00:00.000Z", 600.0),
                ]
            }));
            snapshots.push(json!({
                "id": "s2", "title": "Second", "description": "", "messages": []
            }));
        }
        let (server, _) = server_with_store(store).await;

        let resp = server.get("/snapshot").await;
        resp.assert_status_ok();
        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 2);

        // Newest (s2) first; its empty message set has no time range.
        assert_eq!(body[0]["id"], "s2");
        assert!(body[0]["first_message_at"].is_null());

        assert_eq!(body[1]["id"], "s1");
        assert_eq!(body[1]["first_message_at"], "2024-01-01T06:00:00Z");
        assert_eq!(body[1]["last_message_at"], "2024-01-01T18:00:00Z");
    }

    #[tokio::test]
    async fn snapshot_list_with_unexpected_shape_is_empty_not_an_error() {
        let store = FakeStore {
            break_list_shape: true,
            ..FakeStore::default()
        };
        let (server, _) = server_with_store(store).await;

        let resp = server.get("/snapshot").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn snapshot_detail_of_unknown_id_is_404() {
        let (server, _) = server_with_store(FakeStore::default()).await;

        let resp = server.get("/snapshot/ghost").await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_the_viewed_snapshot_clears_the_detail_reference() {
        let store = FakeStore::default();
        store.snapshots.lock().await.push(json!({
            "id": "s1", "title": "Doomed", "description": "", "messages": []
        }));
        let (server, state) = server_with_store(store).await;

        server.get("/snapshot/s1").await.assert_status_ok();
        assert_eq!(
            state.snapshots.viewed().current().await.as_deref(),
            Some("s1")
        );

        let resp = server.delete("/snapshot/s1").await;
        resp.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(state.snapshots.viewed().current().await, None);
    }

    #[tokio::test]
    async fn snapshot_update_changes_title_and_description_only() {
        let store = FakeStore::default();
        let snapshots = store.snapshots.clone();
        store.snapshots.lock().await.push(json!({
            "id": "s1", "title": "Old", "description": "old",
            "messages": [message_json("m1", "2024-01-01T06:00:00.000Z", 500.0)]
        }));
        let (server, _) = server_with_store(store).await;

        let resp = server
            .put("/snapshot/s1")
            .json(&json!({ "title": "New", "description": "<p>new</p>" }))
            .await;
        resp.assert_status(StatusCode::NO_CONTENT);

        let stored = snapshots.lock().await;
        assert_eq!(stored[0]["title"], "New");
        assert_eq!(stored[0]["messages"].as_array().unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // System endpoints
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_ok() {
        let (server, _) = server_with_store(FakeStore::default()).await;

        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let (server, _) = server_with_store(FakeStore::default()).await;

        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Air Monitor Service API");
    }
}

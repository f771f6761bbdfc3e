use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use dealroom_contract::{Destination, RecordChange, SourceFile};
use dealroom_queue::{QueueConfig, QueueError, QueueManager};
use dealroom_storage::MetadataStore;
use dealroom_transfer::StorageBackend;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info};
use uuid::Uuid;

type ApiError = (StatusCode, Json<Value>);

/// Sessions with unfinished items are only evicted after this many idle periods.
const ABANDONED_FACTOR: u32 = 4;

#[derive(Debug, Deserialize)]
struct UploadFile {
    name: String,
    content_type: Option<String>,
    payload_base64: String,
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    collection_id: String,
    #[serde(default)]
    folder: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    actor_id: String,
    files: Vec<UploadFile>,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

pub struct Session {
    queue: Arc<QueueManager>,
    last_seen: Mutex<Instant>,
}

impl Session {
    fn new(queue: QueueManager) -> Self {
        Self {
            queue: Arc::new(queue),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) -> Arc<QueueManager> {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.queue.clone()
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Nothing left to transfer or commit.
    fn is_settled(&self) -> bool {
        self.queue.rows().iter().all(|row| row.status.is_terminal())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub backend: Arc<dyn StorageBackend>,
    pub queue_config: QueueConfig,
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub auth_token: Option<String>,
    pub require_bearer: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        backend: Arc<dyn StorageBackend>,
        queue_config: QueueConfig,
        auth_token: Option<String>,
        require_bearer: bool,
    ) -> Self {
        Self {
            store,
            backend,
            queue_config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            auth_token,
            require_bearer,
        }
    }

    pub async fn session(&self, session_id: &str) -> Option<Arc<QueueManager>> {
        self.sessions.read().await.get(session_id).map(Session::touch)
    }

    /// Closes and forgets sessions that saw no request for `idle`. A session
    /// that still has unfinished items gets `ABANDONED_FACTOR` times longer.
    /// Returns how many were evicted.
    pub async fn evict_idle_sessions(&self, idle: Duration) -> usize {
        let abandoned = idle.saturating_mul(ABANDONED_FACTOR);
        let evicted: Vec<(String, Session)> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| {
                    let idle_for = session.idle_for();
                    idle_for >= abandoned || (idle_for >= idle && session.is_settled())
                })
                .map(|(session_id, _)| session_id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|session_id| {
                    sessions
                        .remove(&session_id)
                        .map(|session| (session_id, session))
                })
                .collect()
        };

        for (session_id, session) in &evicted {
            let report = session.queue.close_all().await;
            info!(session_id = %session_id, cancelled = report.cancelled, "idle upload session evicted");
        }
        evicted.len()
    }
}

/// Periodically evicts idle sessions until the runtime shuts down.
pub fn spawn_session_reaper(state: AppState, idle: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = idle.clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle_sessions(idle).await;
            debug!(evicted, "idle session sweep");
        }
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/v1/sessions", post(open_session))
        .route("/v1/sessions/{session_id}", delete(close_session))
        .route("/v1/sessions/{session_id}/uploads", post(submit_uploads))
        .route("/v1/sessions/{session_id}/items", get(list_items))
        .route("/v1/sessions/{session_id}/items/{item_id}", delete(cancel_item))
        .route("/v1/sessions/{session_id}/stream", get(stream_items))
        .route("/v1/collections/{collection_id}/records", get(list_records))
        .route(
            "/v1/collections/{collection_id}/records/stream",
            get(stream_records),
        )
        .route(
            "/v1/collections/{collection_id}/records/{record_id}",
            delete(delete_record).patch(rename_record),
        )
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;

    let queue = QueueManager::new(
        state.backend.clone(),
        state.store.clone(),
        state.queue_config.clone(),
    );
    let session_id = Uuid::now_v7().to_string();
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), Session::new(queue));

    info!(session_id = %session_id, backend = state.backend.backend_name(), "upload session opened");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session_id.clone(),
            "items_url": format!("/v1/sessions/{}/items", session_id)
        })),
    ))
}

async fn close_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;

    let session = state
        .sessions
        .write()
        .await
        .remove(&session_id)
        .ok_or_else(session_not_found)?;
    let report = session.queue.close_all().await;

    info!(session_id = %session_id, cancelled = report.cancelled, "upload session closed");
    Ok((StatusCode::OK, Json(report)))
}

async fn submit_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let queue = state
        .session(&session_id)
        .await
        .ok_or_else(session_not_found)?;

    let mut files = Vec::with_capacity(payload.files.len());
    for file in payload.files {
        let bytes = STANDARD.decode(file.payload_base64.as_bytes()).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error":"invalid_base64", "file": file.name.clone()})),
            )
        })?;
        files.push(SourceFile::new(file.name, file.content_type, bytes));
    }

    let destination = Destination {
        collection_id: payload.collection_id,
        folder: payload.folder,
        tags: payload.tags.into_iter().collect(),
        actor_id: payload.actor_id,
    };

    let item_ids = queue.submit(files, destination).map_err(|err| match err {
        QueueError::Closed => (
            StatusCode::CONFLICT,
            Json(json!({"error":"session_closed"})),
        ),
        QueueError::MissingCollection => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error":"collection_id_required"})),
        ),
        QueueError::MissingActor => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error":"actor_id_required"})),
        ),
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "session_id": session_id,
            "item_ids": item_ids
        })),
    ))
}

async fn list_items(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = state
        .session(&session_id)
        .await
        .ok_or_else(session_not_found)?;
    Ok((StatusCode::OK, Json(json!({ "items": queue.rows() }))))
}

async fn cancel_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((session_id, item_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let queue = state
        .session(&session_id)
        .await
        .ok_or_else(session_not_found)?;

    queue.cancel(&item_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "item_id": item_id, "status": "cancel_requested" })),
    ))
}

async fn stream_items(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let queue = state
        .session(&session_id)
        .await
        .ok_or_else(session_not_found)?;

    let stream = WatchStream::new(queue.subscribe()).map(|rows| {
        let data = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string());
        Ok(SseEvent::default().event("queue.rows").data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn list_records(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .store
        .list_records(&collection_id)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::OK, Json(json!({ "records": records }))))
}

async fn rename_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((collection_id, record_id)): Path<(String, String)>,
    Json(payload): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error":"name_required"})),
        ));
    }

    let record = state
        .store
        .rename_record(&collection_id, &record_id, name)
        .await
        .map_err(internal_error)?;
    match record {
        Some(record) => Ok((StatusCode::OK, Json(record))),
        None => Err(record_not_found()),
    }
}

async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((collection_id, record_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let record = state
        .store
        .get_record(&collection_id, &record_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(record_not_found)?;

    let deleted = state
        .store
        .delete_record(&collection_id, &record_id)
        .await
        .map_err(internal_error)?;
    if !deleted {
        return Err(record_not_found());
    }

    if let Err(err) = state.backend.delete_object(&record.storage_location).await {
        error!(
            record_id = %record_id,
            location = %record.storage_location,
            error = %err,
            "stored object of deleted record left behind"
        );
    }

    Ok((StatusCode::NO_CONTENT, Json(json!({}))))
}

async fn stream_records(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = state.store.records_changed(&collection_id).map(|change| {
        let event_type = match &change {
            RecordChange::Created { .. } => "record.created",
            RecordChange::Renamed { .. } => "record.renamed",
            RecordChange::Deleted { .. } => "record.deleted",
        };
        let data = serde_json::to_string(&change).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.require_bearer {
        return Ok(());
    }

    let token = state.auth_token.as_deref().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error":"auth_token_required_but_not_configured"})),
        )
    })?;

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided == format!("Bearer {token}") {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"invalid_or_missing_bearer_token"})),
        ))
    }
}

fn session_not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error":"session_not_found"})),
    )
}

fn record_not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error":"record_not_found"})),
    )
}

fn internal_error(error: anyhow::Error) -> ApiError {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}

#[cfg(test)]
mod tests {
    use super::{build_router, AppState};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use dealroom_contract::{NewUploadRecord, TransferStatus};
    use dealroom_queue::QueueConfig;
    use dealroom_storage::{MetadataStore, SqliteMetadataStore, StorageConfig};
    use dealroom_transfer::{FaultPlan, InMemoryStorageBackend};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        store: Arc<SqliteMetadataStore>,
        backend: Arc<InMemoryStorageBackend>,
    }

    impl Harness {
        async fn new(auth_token: Option<&str>) -> Self {
            let store = Arc::new(
                SqliteMetadataStore::connect(&StorageConfig {
                    sqlite_path: "sqlite::memory:".to_string(),
                    max_connections: 1,
                })
                .await
                .expect("connect"),
            );
            let backend = Arc::new(InMemoryStorageBackend::new());
            let state = AppState::new(
                store.clone(),
                backend.clone(),
                QueueConfig::default(),
                auth_token.map(str::to_string),
                auth_token.is_some(),
            );
            Self {
                state,
                store,
                backend,
            }
        }

        fn app(&self) -> Router {
            build_router(self.state.clone())
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app().oneshot(request).await.expect("response");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body")
                .to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn open_session(&self) -> String {
            let (status, body) = self
                .send(
                    Request::builder()
                        .method("POST")
                        .uri("/v1/sessions")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["session_id"].as_str().expect("session id").to_string()
        }
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_through_session_creates_records() {
        let harness = Harness::new(None).await;
        let session_id = harness.open_session().await;

        let (status, body) = harness
            .send(json_request(
                "POST",
                &format!("/v1/sessions/{session_id}/uploads"),
                json!({
                    "collection_id": "project-12",
                    "folder": "photos",
                    "tags": ["exterior"],
                    "actor_id": "seller-4",
                    "files": [
                        {"name": "front.jpg", "content_type": "image/jpeg", "payload_base64": STANDARD.encode(b"front")},
                        {"name": "back.jpg", "payload_base64": STANDARD.encode(b"back")}
                    ]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["item_ids"].as_array().map(Vec::len), Some(2));

        let queue = harness.state.session(&session_id).await.expect("session");
        let rows = queue.settled().await;
        assert!(rows.iter().all(|row| row.status == TransferStatus::Succeeded));

        let (status, body) = harness
            .send(
                Request::builder()
                    .uri(format!("/v1/sessions/{session_id}/items"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"][0]["status"], "succeeded");
        assert_eq!(body["items"][0]["progress_percent"], 100);

        let (status, body) = harness
            .send(
                Request::builder()
                    .uri("/v1/collections/project-12/records")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"].as_array().map(Vec::len), Some(2));
        assert_eq!(harness.backend.object_count().await, 2);

        let (status, body) = harness
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], 0);
        assert!(harness.state.session(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn bad_payloads_and_unknown_sessions_are_rejected() {
        let harness = Harness::new(None).await;
        let session_id = harness.open_session().await;

        let (status, body) = harness
            .send(json_request(
                "POST",
                &format!("/v1/sessions/{session_id}/uploads"),
                json!({
                    "collection_id": "project-12",
                    "files": [{"name": "deed.pdf", "payload_base64": "not base64!"}]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_base64");

        let (status, _) = harness
            .send(json_request(
                "POST",
                &format!("/v1/sessions/{session_id}/uploads"),
                json!({ "collection_id": "", "files": [] }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = harness
            .send(
                Request::builder()
                    .uri("/v1/sessions/missing/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");

        let (status, _) = harness
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/sessions/{session_id}/items/unknown-item"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn write_routes_require_bearer_when_configured() {
        let harness = Harness::new(Some("s3cret")).await;

        let (status, body) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_or_missing_bearer_token");

        let (status, _) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sessions")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = harness
            .send(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn records_can_be_renamed_and_deleted() {
        let harness = Harness::new(None).await;
        let record = harness
            .store
            .create_record(NewUploadRecord {
                collection_id: "project-5".to_string(),
                name: "draft.pdf".to_string(),
                destination_folder: String::new(),
                content_type: "application/pdf".to_string(),
                size_bytes: 3,
                tags: Default::default(),
                owner_id: "agent-1".to_string(),
                storage_location: "mem://project-5/draft.pdf".to_string(),
            })
            .await
            .expect("create");
        let uri = format!("/v1/collections/project-5/records/{}", record.record_id);

        let (status, body) = harness
            .send(json_request("PATCH", &uri, json!({ "name": "final.pdf" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "final.pdf");
        assert_eq!(body["version"], 2);

        let (status, _) = harness
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(harness
            .store
            .list_records("project-5")
            .await
            .expect("list")
            .is_empty());

        let (status, _) = harness
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_and_closed() {
        let store = Arc::new(
            SqliteMetadataStore::connect(&StorageConfig {
                sqlite_path: "sqlite::memory:".to_string(),
                max_connections: 1,
            })
            .await
            .expect("connect"),
        );
        let backend = Arc::new(
            InMemoryStorageBackend::new().with_fault("stuck", FaultPlan::Stall { after_percent: 0 }),
        );
        let harness = Harness {
            state: AppState::new(store.clone(), backend.clone(), QueueConfig::default(), None, false),
            store,
            backend: backend.clone(),
        };
        let done = harness.open_session().await;
        let stuck = harness.open_session().await;

        for (session_id, name) in [(&done, "deed.pdf"), (&stuck, "stuck.pdf")] {
            let (status, _) = harness
                .send(json_request(
                    "POST",
                    &format!("/v1/sessions/{session_id}/uploads"),
                    json!({
                        "collection_id": "project-3",
                        "actor_id": "seller-1",
                        "files": [{"name": name, "payload_base64": STANDARD.encode(b"bytes")}]
                    }),
                ))
                .await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }
        harness.state.session(&done).await.expect("done").settled().await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(harness.state.evict_idle_sessions(Duration::from_millis(200)).await, 1);
        {
            let sessions = harness.state.sessions.read().await;
            assert!(!sessions.contains_key(&done));
            assert!(sessions.contains_key(&stuck));
        }
        assert_eq!(backend.active_transfers(), 1);

        assert_eq!(harness.state.evict_idle_sessions(Duration::from_millis(50)).await, 1);
        assert!(harness.state.sessions.read().await.is_empty());
        assert_eq!(backend.active_transfers(), 0);
    }

    #[tokio::test]
    async fn blank_actor_is_a_bad_request() {
        let harness = Harness::new(None).await;
        let session_id = harness.open_session().await;

        let (status, body) = harness
            .send(json_request(
                "POST",
                &format!("/v1/sessions/{session_id}/uploads"),
                json!({
                    "collection_id": "project-12",
                    "actor_id": "  ",
                    "files": [{"name": "deed.pdf", "payload_base64": STANDARD.encode(b"deed")}]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "actor_id_required");
        assert!(harness.store.list_records("project-12").await.expect("list").is_empty());
    }
}

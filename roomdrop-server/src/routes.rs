use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use roomdrop_common::backend::UploadFile;
use roomdrop_common::error::StorageError;
use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::submit_upload;

const ROOM_ID_LEN: usize = 10;

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/room/create", post(create_room))
        .route("/api/upload", post(upload))
        .route("/api/files/{room_id}", get(list_files))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    #[serde(rename = "roomId")]
    room_id: RoomId,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend_name,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Issue a fresh room identifier: lowercase alphanumerics only, so it always
/// satisfies room identifier validation.
fn new_room_id() -> Result<RoomId, StorageError> {
    let raw: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    RoomId::parse(&raw)
}

async fn create_room() -> Result<Json<CreateRoomResponse>, ApiError> {
    let room_id = new_room_id().map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(room_id = %room_id, "Room created");
    Ok(Json(CreateRoomResponse { room_id }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<FileRecord>, ApiError> {
    let mut file = None;
    let mut room_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StorageError::validation(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let mime_type = match field.content_type() {
                    Some(ct) if ct != "application/octet-stream" => ct.to_string(),
                    _ => mime_guess::from_path(&filename).first_or_octet_stream().to_string(),
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| StorageError::validation(format!("Failed to read file: {}", e)))?;
                file = Some(UploadFile {
                    bytes,
                    filename,
                    mime_type,
                });
            }
            "roomId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| StorageError::validation(format!("Failed to read roomId: {}", e)))?;
                room_id = Some(text);
            }
            _ => {}
        }
    }

    let record = submit_upload(state.storage.as_ref(), file, room_id.as_deref()).await?;
    Ok(Json(record))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let room = RoomId::parse(&room_id)?;
    info!(room_id = %room, "Fetching files for room");

    let files = state.storage.list_by_room(&room).await?;
    info!(room_id = %room, count = files.len(), "Listed room files");
    Ok(Json(files))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::flat::FlatKeyspaceAdapter;
    use crate::backend::testing::FakeFlatStore;

    const BOUNDARY: &str = "roomdropboundary";

    fn app(store: Arc<FakeFlatStore>) -> Router {
        let adapter = Arc::new(FlatKeyspaceAdapter::new(store));
        build_router(Arc::new(AppState::new(adapter, "fake")), 1024 * 1024)
    }

    fn multipart_body(room_id: Option<&str>, file: Option<(&str, &[u8])>) -> Body {
        let mut body = Vec::new();
        if let Some(room_id) = room_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"roomId\"\r\n\r\n{room_id}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn upload_request(room_id: Option<&str>, file: Option<(&str, &[u8])>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(multipart_body(room_id, file))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_endpoint_returns_record() {
        let store = Arc::new(FakeFlatStore::default());
        let data = vec![0u8; 2048];

        let resp = app(store.clone())
            .oneshot(upload_request(Some("abc123"), Some(("notes.pdf", &data))))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert!(json["public_id"].as_str().unwrap().starts_with("abc123__"));
        assert_eq!(json["bytes"], 2048);
        assert_eq!(json["format"], "pdf");
        assert_eq!(json["original_filename"], "notes.pdf");
        assert_eq!(json["roomId"], "abc123");
    }

    #[tokio::test]
    async fn test_upload_missing_room_id_is_bad_request() {
        let store = Arc::new(FakeFlatStore::default());

        let resp = app(store.clone())
            .oneshot(upload_request(None, Some(("notes.pdf", b"data"))))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = json_body(resp).await;
        assert_eq!(json["error"], "Missing room identifier");
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_backend_failure_is_500() {
        let store = Arc::new(FakeFlatStore::default());
        store.fail_upload();

        let resp = app(store)
            .oneshot(upload_request(Some("abc123"), Some(("a.txt", b"data"))))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"], "Upload failed");
    }

    #[tokio::test]
    async fn test_list_empty_room_is_empty_array() {
        let resp = app(Arc::new(FakeFlatStore::default()))
            .oneshot(Request::get("/api/files/abc123").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_returns_only_room_files() {
        let store = Arc::new(FakeFlatStore::default());
        store.seed("abc123", 2);
        store.seed("other", 3);

        let resp = app(store)
            .oneshot(Request::get("/api/files/abc123").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = json_body(resp).await;
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i["roomId"] == "abc123"));
    }

    #[tokio::test]
    async fn test_list_failure_is_500() {
        let store = Arc::new(FakeFlatStore::default());
        store.fail_listing();

        let resp = app(store)
            .oneshot(Request::get("/api/files/abc123").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"], "Failed to fetch files");
    }

    #[tokio::test]
    async fn test_create_room() {
        let resp = app(Arc::new(FakeFlatStore::default()))
            .oneshot(Request::post("/api/room/create").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        let id = json["roomId"].as_str().unwrap();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(RoomId::parse(id).is_ok());
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app(Arc::new(FakeFlatStore::default()))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "fake");
    }

    #[test]
    fn test_new_room_ids_differ() {
        let a = new_room_id().unwrap();
        let b = new_room_id().unwrap();
        assert_ne!(a, b);
    }
}

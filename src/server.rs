//! HTTP front door: builds the merged `axum::Router` (§6) and drives the
//! listen loop with graceful shutdown.
//!
//! Grounded on `examples/yotaro-shimose-coder-mcp/src/server.rs` for the
//! overall shape (`TcpListener::bind` + `axum::serve` +
//! `with_graceful_shutdown`); the timing middleware and CORS/trace layers are
//! standard `tower-http`/`axum` idiom built on the teacher's existing
//! `tower-http` dependency (the teacher crate had no HTTP surface of its own
//! beyond `/health` and `/tree` to borrow a timing header from).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use bytes::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::archive::{self, ZipFileRequest, ZipFileResult};
use crate::browser::BrowserSession;
use crate::config::Config;
use crate::editor::{TextEditor, TextEditorAction, TextEditorActionResult};
use crate::error::{HostError, HostResult};
use crate::models::{
    DownloadedAttachment, FileUploadResponse, MultipartUploadRequest, MultipartUploadResponse,
    RequestDownloadAttachmentsRequest, RequestDownloadAttachmentsResponse,
};
use crate::secrets::{InitSandboxRequest, InitSandboxResult, SecretProvisioner};
use crate::storage::LocalStorage;
use crate::terminal::TerminalRegistry;
use crate::{logger, terminal};

#[derive(Clone)]
struct AppState {
    editor: Arc<TextEditor>,
    storage: Arc<LocalStorage>,
    secrets: Arc<SecretProvisioner>,
    http_client: reqwest::Client,
    upload_dir: PathBuf,
}

pub async fn run_server(workspace_path: PathBuf, port: u16, shutdown_rx: tokio::sync::oneshot::Receiver<()>) {
    logger::init_logging();

    let mut config = Config::from_env();
    config.workspace_dir = workspace_path.clone();
    config.port = port;

    let terminal_registry = Arc::new(TerminalRegistry::new(workspace_path.clone()));
    let browser_session = Arc::new(BrowserSession::new(
        config.chrome_instance_path.clone(),
        config.screenshots_dir(),
        LocalStorage::new(config.local_storage_dir()),
    ));

    let state = AppState {
        editor: Arc::new(TextEditor::new(workspace_path.clone())),
        storage: Arc::new(LocalStorage::new(config.local_storage_dir())),
        secrets: Arc::new(SecretProvisioner::new(config.secrets_dir())),
        http_client: reqwest::Client::new(),
        upload_dir: config.upload_dir(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/text_editor", post(text_editor))
        .route("/init-sandbox", post(init_sandbox))
        .route("/zip-file", post(zip_file))
        .route("/file/upload", post(file_upload))
        .route("/file/multipart_upload", post(multipart_upload))
        .route("/file", get(file_download))
        .route("/request-download-attachments", post(request_download_attachments))
        .with_state(state)
        .merge(terminal::rest::router(terminal_registry.clone()))
        .merge(terminal::ws::router(terminal_registry))
        .merge(crate::browser::rest::router(browser_session))
        .fallback(not_found)
        .layer(middleware::from_fn(timing_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.expect("failed to bind listen address");
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("server shutting down");
        })
        .await
        .expect("server loop failed");
}

async fn timing_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed:.6}")) {
        response.headers_mut().insert("x-process-time", value);
    }
    response
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[derive(serde::Serialize)]
struct HealthzResponse {
    status: &'static str,
}

async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

async fn text_editor(
    State(state): State<AppState>,
    Json(action): Json<TextEditorAction>,
) -> Json<TextEditorActionResult> {
    Json(state.editor.run(action).await)
}

async fn init_sandbox(
    State(state): State<AppState>,
    Json(request): Json<InitSandboxRequest>,
) -> HostResult<Json<InitSandboxResult>> {
    Ok(Json(state.secrets.apply(request)?))
}

async fn zip_file(Json(request): Json<ZipFileRequest>) -> HostResult<Json<ZipFileResult>> {
    Ok(Json(archive::create_archive(request)?))
}

async fn file_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> HostResult<Json<FileUploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HostError::Validation(format!("bad multipart body: {e}")))?
    {
        let filename = field.file_name().unwrap_or("upload.bin").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| HostError::Validation(format!("bad multipart field: {e}")))?;
        if bytes.len() as u64 >= crate::storage::MULTIPART_THRESHOLD {
            return Ok(Json(FileUploadResponse::requires_multipart(crate::storage::MULTIPART_THRESHOLD)));
        }
        let uploaded = state.storage.upload(&filename, &bytes).await?;
        return Ok(Json(FileUploadResponse::stored(uploaded.filename, uploaded.path, uploaded.size)));
    }
    Err(HostError::Validation("no file field in upload".into()))
}

async fn multipart_upload(
    State(state): State<AppState>,
    Json(request): Json<MultipartUploadRequest>,
) -> HostResult<Json<MultipartUploadResponse>> {
    let source_path = PathBuf::from(&request.path);
    let (combined, part_count) = state
        .storage
        .multipart_upload_from_path(&source_path, request.part_size)
        .await?;
    Ok(Json(MultipartUploadResponse {
        status: "success",
        filename: combined.filename,
        path: combined.path,
        size: combined.size,
        part_count,
    }))
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    path: String,
}

async fn file_download(Query(query): Query<FileQuery>) -> HostResult<Response> {
    let path = PathBuf::from(&query.path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| HostError::NotFound(format!("{} not found", path.display())))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        [(axum::http::header::CONTENT_TYPE, mime.to_string())],
        Bytes::from(bytes),
    )
        .into_response())
}

async fn request_download_attachments(
    State(state): State<AppState>,
    Json(request): Json<RequestDownloadAttachmentsRequest>,
) -> HostResult<Json<RequestDownloadAttachmentsResponse>> {
    let base = match &request.subfolder {
        Some(sub) => state.upload_dir.join(sub),
        None => state.upload_dir.clone(),
    };

    let mut downloaded = Vec::with_capacity(request.attachments.len());
    for attachment in &request.attachments {
        let dest = base.join(&attachment.filename);
        let size = crate::storage::download_to(&state.http_client, &attachment.url, &dest).await?;
        downloaded.push(DownloadedAttachment {
            filename: attachment.filename.clone(),
            path: dest.to_string_lossy().into_owned(),
            size,
        });
    }
    Ok(Json(RequestDownloadAttachmentsResponse {
        status: "success",
        downloaded,
    }))
}

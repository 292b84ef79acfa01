//! Non-streaming terminal REST operations (§6): reset, reset-all, view, kill,
//! and a one-shot `write` for out-of-band input without opening a websocket.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::HostResult;
use crate::terminal::registry::TerminalRegistry;

pub fn router(registry: Arc<TerminalRegistry>) -> Router {
    Router::new()
        .route("/terminal/reset-all", post(reset_all))
        .route("/terminal/{id}/reset", post(reset_one))
        .route("/terminal/{id}/view", get(view))
        .route("/terminal/{id}/kill", post(kill))
        .route("/terminal/{id}/write", post(write))
        .with_state(registry)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn reset_all(State(registry): State<Arc<TerminalRegistry>>) -> HostResult<Json<StatusResponse>> {
    registry.reset_all().await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

async fn reset_one(
    State(registry): State<Arc<TerminalRegistry>>,
    Path(id): Path<String>,
) -> HostResult<Json<StatusResponse>> {
    let session = registry.get_or_create(&id).await?;
    session.reset().await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    #[serde(default)]
    full: bool,
}

#[derive(Debug, Serialize)]
struct ViewResponse {
    output: Vec<String>,
}

async fn view(
    State(registry): State<Arc<TerminalRegistry>>,
    Path(id): Path<String>,
    Query(params): Query<ViewQuery>,
) -> HostResult<Json<ViewResponse>> {
    let session = registry.get_or_create(&id).await?;
    let output = if params.full {
        session.view_full().await
    } else {
        session.view_last().await
    };
    Ok(Json(ViewResponse { output }))
}

async fn kill(
    State(registry): State<Arc<TerminalRegistry>>,
    Path(id): Path<String>,
) -> HostResult<Json<StatusResponse>> {
    let session = registry.get_or_create(&id).await?;
    session.kill_process().await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    text: String,
    #[serde(default)]
    mode: WriteMode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WriteMode {
    #[default]
    Line,
    Key,
    Control,
}

async fn write(
    State(registry): State<Arc<TerminalRegistry>>,
    Path(id): Path<String>,
    Json(body): Json<WriteRequest>,
) -> HostResult<Json<StatusResponse>> {
    let session = registry.get_or_create(&id).await?;
    match body.mode {
        WriteMode::Line => session.send_line(&body.text).await?,
        WriteMode::Key => session.send_key(&body.text).await?,
        WriteMode::Control => session.send_control(&body.text).await?,
    }
    Ok(Json(StatusResponse { status: "ok" }))
}

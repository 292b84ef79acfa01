//! `GET /browser/status`, `POST /browser/action` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::browser::session::BrowserSession;
use crate::browser::types::{BrowserActionRequest, BrowserActionResult, BrowserStatus, BrowserStatusResponse};
use crate::error::HostResult;

pub fn router(session: Arc<BrowserSession>) -> Router {
    Router::new()
        .route("/browser/status", get(status))
        .route("/browser/action", post(action))
        .with_state(session)
}

async fn status(State(session): State<Arc<BrowserSession>>) -> Json<BrowserStatusResponse> {
    let healthy = session.status().await == BrowserStatus::Ready && session.health_check().await;
    Json(BrowserStatusResponse {
        healthy,
        tabs: if healthy { 1 } else { 0 },
    })
}

async fn action(
    State(session): State<Arc<BrowserSession>>,
    Json(request): Json<BrowserActionRequest>,
) -> HostResult<Json<BrowserActionResult>> {
    let result = session.execute_action(request).await;
    match result {
        Ok(r) => Ok(Json(r)),
        Err(e) => Ok(Json(BrowserActionResult {
            status: "error",
            error: Some(e.to_string()),
            ..Default::default()
        })),
    }
}

//! HTTP status endpoints for the worker daemon.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use vidsift::db::JobStore;
use vidsift::worker::JobRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub jobs: Arc<dyn JobStore>,
    /// When set, job endpoints require a matching `X-API-Key` header.
    pub api_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/worker/jobs/{id}", get(job_status))
        .route("/worker/jobs/{id}/cancel", post(cancel_job))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": state.runner.active_count(),
        "max_concurrent": state.runner.max_concurrent(),
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing API key" })),
        )
            .into_response())
    }
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    match state.jobs.find(&id) {
        Ok(Some(job)) => Json(json!({
            "id": job.id,
            "video_id": job.video_id,
            "mode": job.mode.as_str(),
            "status": job.status.as_str(),
            "progress": job.progress,
            "result_id": job.result_id,
            "error_message": job.error_message,
            "error_code": job.error_code,
            "created_at": job.created_at,
            "started_at": job.started_at,
            "completed_at": job.completed_at,
            "active": state.runner.is_active(&job.id),
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "job not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    // Cancellation only suppresses future claims. A job already running
    // finishes on its own.
    state.runner.request_cancel(&id);
    Json(json!({
        "id": id,
        "cancel_requested": true,
        "was_active": state.runner.is_active(&id),
    }))
    .into_response()
}

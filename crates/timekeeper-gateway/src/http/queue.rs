//! Deferred-dispatch queue inspection. 404s when no queue is configured.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use timekeeper_remote::{QueueApi, RemoteError};

use crate::app::AppState;
use crate::auth::Rejection;

fn queue_or_404(state: &AppState) -> Result<&Arc<dyn QueueApi>, Rejection> {
    state.queue.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({"error": "no queue configured", "code": "NOT_FOUND"})),
    ))
}

fn remote_error(e: RemoteError) -> Rejection {
    let status = match &e {
        RemoteError::NotFound(_) => StatusCode::NOT_FOUND,
        RemoteError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(json!({"error": e.to_string(), "code": "REMOTE_QUEUE_ERROR"})),
    )
}

/// GET /api/queue/ — tasks currently sitting in the remote queue.
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let queue = queue_or_404(&state)?;
    let tasks = queue.list().await.map_err(remote_error)?;
    Ok(Json(json!({
        "tasks": tasks
            .iter()
            .map(|t| json!({
                "name": t.name,
                "url": t.http_request.as_ref().map(|r| r.url.clone()),
            }))
            .collect::<Vec<_>>()
    })))
}

/// DELETE /api/queue/{name}/ — drop a queued task by its short name.
pub async fn delete_queued(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(name): Path<String>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let queue = queue_or_404(&state)?;
    queue.delete(&name).await.map_err(remote_error)?;
    Ok(Json(json!({"ok": format!("Queued task {name} deleted.")})))
}

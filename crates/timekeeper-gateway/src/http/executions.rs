//! Read-only task-execution endpoints. Executions are append-only audit
//! records; the gateway never mutates them directly.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use timekeeper_store::TaskExecution;

use crate::app::AppState;
use crate::auth::Rejection;
use crate::http::{not_found, store_error};

pub(crate) fn execution_json(execution: &TaskExecution) -> Value {
    json!({
        "id": execution.id,
        "task_id": execution.task_id,
        "status": execution.status.to_string(),
        "queued_time": execution.queued_time,
        "start_time": execution.start_time,
        "finish_time": execution.finish_time,
        "results": execution.results,
    })
}

#[derive(Debug, Deserialize)]
pub struct ExecutionFilter {
    pub task_id: Option<i64>,
}

/// GET /api/task_executions/?task_id=
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Query(filter): Query<ExecutionFilter>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let executions = state
        .store
        .list_executions(filter.task_id)
        .map_err(store_error)?;
    Ok(Json(json!({
        "task_executions": executions.iter().map(execution_json).collect::<Vec<_>>()
    })))
}

/// GET /api/task_executions/{id}/
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let execution = state
        .store
        .get_execution(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("task execution", id))?;
    Ok(Json(execution_json(&execution)))
}

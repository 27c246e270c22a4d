//! Task and step endpoints, plus the execute callback the queue delivers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use timekeeper_core::error::TimekeeperError;
use timekeeper_core::types::ExecutionStatus;
use timekeeper_store::{NewStep, Step};

use crate::app::AppState;
use crate::auth::Rejection;
use crate::http::executions::execution_json;
use crate::http::{engine_error, not_found, store_error};

fn step_json(step: &Step) -> Value {
    json!({
        "id": step.id,
        "task_id": step.task_id,
        "name": step.name,
        "action": step.action,
        "method": step.method.to_string(),
        "payload": step.payload,
        "success_pattern": step.success_pattern,
    })
}

/// GET /api/tasks/
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let tasks = state.store.list_tasks().map_err(store_error)?;
    Ok(Json(json!({
        "tasks": tasks
            .iter()
            .map(|t| json!({"id": t.id, "name": t.name}))
            .collect::<Vec<_>>()
    })))
}

#[derive(Debug, Deserialize)]
pub struct NewTask {
    pub name: String,
}

/// POST /api/tasks/
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(new): Json<NewTask>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let task = state.store.create_task(&new.name).map_err(store_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": task.id, "name": task.name})),
    ))
}

/// GET /api/tasks/{id}/ — the task with its steps in execution order.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let task = state
        .store
        .get_task(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("task", id))?;
    let steps = state.store.list_steps(id).map_err(store_error)?;
    Ok(Json(json!({
        "id": task.id,
        "name": task.name,
        "steps": steps.iter().map(step_json).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteTaskQuery {
    #[serde(default)]
    pub cascade: bool,
}

/// DELETE /api/tasks/{id}/?cascade=true — deleting a task with schedules is
/// always refused; steps are removed only with an explicit cascade.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
    Query(query): Query<DeleteTaskQuery>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    state
        .store
        .delete_task(id, query.cascade)
        .map_err(store_error)?;
    Ok(Json(json!({"ok": format!("Task {id} deleted.")})))
}

/// GET /api/tasks/{id}/steps/
pub async fn list_steps(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let steps = state.store.list_steps(id).map_err(store_error)?;
    Ok(Json(json!({
        "steps": steps.iter().map(step_json).collect::<Vec<_>>()
    })))
}

/// POST /api/tasks/{id}/steps/
pub async fn create_step(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
    Json(new): Json<NewStep>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let step = state.store.create_step(id, &new).map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(step_json(&step))))
}

/// GET /api/steps/{id}/
pub async fn get_step(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let step = state
        .store
        .get_step(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("step", id))?;
    Ok(Json(step_json(&step)))
}

/// DELETE /api/steps/{id}/
pub async fn delete_step(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    state.store.delete_step(id).map_err(store_error)?;
    Ok(Json(json!({"ok": format!("Step {id} deleted.")})))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    pub task_execution_id: Option<i64>,
}

/// GET|POST /api/tasks/{id}/execute/?task_execution_id= — run a task now,
/// optionally resuming the pending execution a queue callback names.
///
/// A failed run responds with the failing step's HTTP status folded into the
/// error code (`task_404`, `task_500`, ...) so callers can tell a missing
/// target from a broken one.
pub async fn execute_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
    Query(query): Query<ExecuteQuery>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_executor(&headers, &uri).await?;
    let execution = state
        .engine
        .execute(id, query.task_execution_id)
        .await
        .map_err(engine_error)?;
    info!(
        task = id,
        execution = execution.id,
        status = %execution.status,
        "execute handled"
    );

    if execution.status == ExecutionStatus::Failure {
        let (status, detail) = first_failure(execution.results.as_ref());
        let e = TimekeeperError::StepFailure {
            status,
            detail: detail.clone(),
        };
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": e.to_string(),
                "code": e.code(),
                "detail": detail,
                "task_execution_id": execution.id,
            })),
        ));
    }
    Ok(Json(execution_json(&execution)))
}

/// Pull the first failed step entry out of an execution's results.
fn first_failure(results: Option<&Value>) -> (i64, Value) {
    let entries = results
        .and_then(|r| r["results"].as_array())
        .cloned()
        .unwrap_or_default();
    for entry in entries {
        if entry["response"]["success"] == json!(false) {
            let status = entry["response"]["status"].as_i64().unwrap_or(500);
            return (status, entry);
        }
    }
    (500, Value::Null)
}

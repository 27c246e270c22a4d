//! Task-schedule endpoints: bindings of tasks to clocks, and manual runs.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use timekeeper_store::TaskSchedule;

use crate::app::AppState;
use crate::auth::Rejection;
use crate::http::{engine_error, not_found, store_error};

fn schedule_json(state: &AppState, schedule: &TaskSchedule) -> Result<Value, Rejection> {
    let clock = match schedule.clock_id {
        Some(id) => state.store.get_clock(id).map_err(store_error)?,
        None => None,
    };
    Ok(json!({
        "id": schedule.id,
        "name": schedule.name,
        "task_id": schedule.task_id,
        "clock_id": schedule.clock_id,
        "enabled": schedule.enabled,
        "status": schedule.status(clock.as_ref()),
    }))
}

/// GET /api/task_schedules/
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let schedules = state.store.list_schedules().map_err(store_error)?;
    let mut out = Vec::with_capacity(schedules.len());
    for schedule in &schedules {
        out.push(schedule_json(&state, schedule)?);
    }
    Ok(Json(json!({"task_schedules": out})))
}

#[derive(Debug, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    pub task_id: i64,
    pub clock_id: Option<i64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// POST /api/task_schedules/
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(new): Json<NewSchedule>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let schedule = state
        .store
        .create_schedule(&new.name, new.task_id, new.clock_id, new.enabled)
        .map_err(store_error)?;
    Ok((
        StatusCode::CREATED,
        Json(schedule_json(&state, &schedule)?),
    ))
}

/// GET /api/task_schedules/{id}/
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let schedule = state
        .store
        .get_schedule(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("task schedule", id))?;
    Ok(Json(schedule_json(&state, &schedule)?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleUpdate {
    pub enabled: bool,
}

/// PUT /api/task_schedules/{id}/ — the enabled flag is display state; a
/// ticking clock runs its schedules regardless.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    state
        .store
        .set_schedule_enabled(id, update.enabled)
        .map_err(store_error)?;
    let schedule = state
        .store
        .get_schedule(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("task schedule", id))?;
    Ok(Json(schedule_json(&state, &schedule)?))
}

/// DELETE /api/task_schedules/{id}/
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    state.store.delete_schedule(id).map_err(store_error)?;
    Ok(Json(json!({"ok": format!("Task schedule {id} deleted.")})))
}

/// GET|POST /api/task_schedules/{id}/run/ — run one schedule now, exactly
/// as a clock tick would: inline without a queue, deferred with one.
pub async fn run_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_executor(&headers, &uri).await?;
    let schedule = state
        .store
        .get_schedule(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("task schedule", id))?;
    let outcome = state.runner.run(&schedule).await.map_err(engine_error)?;
    let mut body = serde_json::Map::new();
    body.insert(schedule.name.clone(), outcome);
    Ok(Json(Value::Object(body)))
}

//! Clock endpoints: CRUD through the reconciler, operator actions, and the
//! tick callback the remote scheduler invokes.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use timekeeper_core::types::Management;
use timekeeper_store::{Clock, NewClock};

use crate::app::AppState;
use crate::auth::Rejection;
use crate::http::{engine_error, not_found, store_error};

fn clock_json(clock: &Clock) -> Value {
    json!({
        "id": clock.id,
        "name": clock.name,
        "gcp_name": clock.gcp_name,
        "description": clock.description,
        "cron": clock.cron,
        "time_zone": clock.time_zone,
        "management": clock.management.to_string(),
        "status": clock.status.to_string(),
        "service_account": clock.service_account,
        "created_at": clock.created_at,
        "updated_at": clock.updated_at,
    })
}

fn load_clock(state: &AppState, id: i64) -> Result<Clock, Rejection> {
    state
        .store
        .get_clock(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("clock", id))
}

/// GET /api/clocks/
pub async fn list_clocks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let clocks = state.store.list_clocks().map_err(store_error)?;
    Ok(Json(json!({
        "clocks": clocks.iter().map(clock_json).collect::<Vec<_>>()
    })))
}

/// POST /api/clocks/ — insert the row, then bring the remote job up. The
/// clock is returned even when the first reconciliation fails (it stays
/// `broken` until an operator runs `fix`).
pub async fn create_clock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(new): Json<NewClock>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let (clock, outcome) = state
        .reconciler
        .create_and_reconcile(&new)
        .await
        .map_err(engine_error)?;
    info!(clock = %clock.name, success = outcome.success, "clock created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "clock": clock_json(&clock),
            "reconcile": {"success": outcome.success, "message": outcome.message},
        })),
    ))
}

/// GET /api/clocks/{id}/
pub async fn get_clock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let clock = load_clock(&state, id)?;
    let schedules = state
        .store
        .list_schedules_for_clock(id)
        .map_err(store_error)?;
    Ok(Json(json!({
        "clock": clock_json(&clock),
        "schedules": schedules
            .iter()
            .map(|s| json!({"id": s.id, "name": s.name, "status": s.status(Some(&clock))}))
            .collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClockUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron: Option<String>,
    pub time_zone: Option<String>,
    pub management: Option<Management>,
    pub service_account: Option<String>,
}

/// PUT /api/clocks/{id}/ — persist field edits, then push them to the remote
/// job. `gcp_name` never changes; the remote job keeps its identity across
/// renames.
pub async fn update_clock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
    Json(update): Json<ClockUpdate>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let lock = state.clock_lock(id).await;
    let _guard = lock.lock().await;

    let mut clock = load_clock(&state, id)?;
    if let Some(name) = update.name {
        clock.name = name;
    }
    if let Some(description) = update.description {
        clock.description = description;
    }
    if let Some(cron) = update.cron {
        clock.cron = cron;
    }
    if let Some(time_zone) = update.time_zone {
        clock.time_zone = time_zone;
    }
    if let Some(management) = update.management {
        clock.management = management;
    }
    if let Some(service_account) = update.service_account {
        clock.service_account = Some(service_account);
    }

    let (clock, outcome) = state
        .reconciler
        .persist_and_reconcile(&clock)
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({
        "clock": clock_json(&clock),
        "reconcile": {"success": outcome.success, "message": outcome.message},
    })))
}

/// DELETE /api/clocks/{id}/ — remote job first, then the row. Blocked with
/// 409 when the remote job cannot be removed.
pub async fn delete_clock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let lock = state.clock_lock(id).await;
    let _guard = lock.lock().await;

    let clock = load_clock(&state, id)?;
    let outcome = state
        .reconciler
        .delete_clock(&clock)
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({"ok": outcome.message})))
}

/// GET|POST /api/clocks/{id}/{action}/ — operator actions.
///
/// `start` and `pause` move the status machine; `fix` is start followed by
/// an update, for repairing a broken clock whose remote job drifted; `sync`
/// additionally adopts manually managed clocks and forces the callback URL.
pub async fn clock_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path((id, action)): Path<(i64, String)>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let lock = state.clock_lock(id).await;
    let _guard = lock.lock().await;

    let clock = load_clock(&state, id)?;
    let outcome = match action.as_str() {
        "start" => state.reconciler.start(&clock).await,
        "pause" => state.reconciler.pause(&clock).await,
        "fix" => {
            let started = state.reconciler.start(&clock).await.map_err(engine_error)?;
            if started.success {
                let clock = load_clock(&state, id)?;
                state.reconciler.update(&clock, &[]).await
            } else {
                Ok(started)
            }
        }
        "sync" => state.reconciler.sync(&clock).await,
        other => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("unknown clock action: {other}"),
                    "code": "NOT_FOUND",
                })),
            ))
        }
    }
    .map_err(engine_error)?;

    if !outcome.success {
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": outcome.message, "code": "REMOTE_SCHEDULER_ERROR"})),
        ));
    }
    let clock = load_clock(&state, id)?;
    Ok(Json(json!({
        "ok": outcome.message,
        "status": clock.status.to_string(),
    })))
}

/// GET|POST /api/clocks/{id}/tick/ — the remote scheduler's callback. Runs
/// every schedule bound to the clock and reports per-schedule outcomes.
pub async fn tick(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let clock = load_clock(&state, id)?;
    info!(clock = %clock.name, "tick received");
    let outcomes = state.runner.tick(clock.id).await.map_err(engine_error)?;
    Ok(Json(outcomes))
}

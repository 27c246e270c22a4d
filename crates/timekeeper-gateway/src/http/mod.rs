//! HTTP handlers, grouped per resource.

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use timekeeper_engine::EngineError;
use timekeeper_store::StoreError;

use crate::auth::Rejection;

pub mod accounts;
pub mod clocks;
pub mod executions;
pub mod health;
pub mod queue;
pub mod schedules;
pub mod tasks;

pub(crate) fn store_error(e: StoreError) -> Rejection {
    let status = match &e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists { .. } | StoreError::ProtectedDelete(_) => StatusCode::CONFLICT,
        StoreError::InvalidValue(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = match &e {
        StoreError::NotFound { .. } => "NOT_FOUND",
        StoreError::AlreadyExists { .. } => "ALREADY_EXISTS",
        StoreError::ProtectedDelete(_) => "PROTECTED_DELETE",
        StoreError::InvalidValue(_) => "INVALID_VALUE",
        _ => "DATABASE_ERROR",
    };
    (status, Json(json!({"error": e.to_string(), "code": code})))
}

pub(crate) fn engine_error(e: EngineError) -> Rejection {
    match e {
        EngineError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": e.to_string(), "code": "NOT_FOUND"})),
        ),
        EngineError::DeleteBlocked(_) => (
            StatusCode::CONFLICT,
            Json(json!({"error": e.to_string(), "code": "DELETE_BLOCKED"})),
        ),
        EngineError::Queue(_) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string(), "code": "REMOTE_QUEUE_ERROR"})),
        ),
        EngineError::Store(inner) => store_error(inner),
    }
}

pub(crate) fn not_found(kind: &str, id: i64) -> Rejection {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("{kind} not found: {id}"), "code": "NOT_FOUND"})),
    )
}

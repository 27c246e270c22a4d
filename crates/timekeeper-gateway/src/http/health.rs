use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::Rejection;

/// GET /health — liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "auth": format!("{:?}", state.config.auth.mode).to_lowercase(),
    }))
}

/// GET|POST /api/test-auth/ — exercises the full verification path and
/// nothing else; used to check a caller's token and account mapping.
pub async fn test_auth(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_executor(&headers, &uri).await?;
    Ok(Json(json!({"ok": "You did good."})))
}

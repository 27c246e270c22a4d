//! Account endpoints: the email → role mapping the auth contract resolves
//! inbound tokens against.
//!
//! Bootstrap note: with `auth.mode = "open-id"` the very first account has
//! to exist before anyone can call these endpoints — create it with auth
//! disabled, or insert it directly.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use timekeeper_store::{Account, AccountRole};

use crate::app::AppState;
use crate::auth::Rejection;
use crate::http::store_error;

fn account_json(account: &Account) -> Value {
    json!({
        "id": account.id,
        "email": account.email,
        "role": account.role.to_string(),
    })
}

/// GET /api/accounts/
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let accounts = state.store.list_accounts().map_err(store_error)?;
    Ok(Json(json!({
        "accounts": accounts.iter().map(account_json).collect::<Vec<_>>()
    })))
}

#[derive(Debug, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub role: AccountRole,
}

/// POST /api/accounts/
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(new): Json<NewAccount>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    let account = state
        .store
        .create_account(&new.email, new.role)
        .map_err(store_error)?;
    info!(email = %account.email, role = %account.role, "account created");
    Ok((StatusCode::CREATED, Json(account_json(&account))))
}

/// DELETE /api/accounts/{id}/
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Rejection> {
    state.auth.require_timekeeper(&headers, &uri).await?;
    state.store.delete_account(id).map_err(store_error)?;
    Ok(Json(json!({"ok": format!("Account {id} deleted.")})))
}

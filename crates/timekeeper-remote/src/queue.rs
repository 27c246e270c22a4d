//! Wrapper over the remote task queue, used for deferred task dispatch.
//!
//! The queue's only job here is to call back into the gateway's execute
//! endpoint later; this client seeds that callback with an OIDC identity so
//! the gateway's auth contract holds for queue-delivered requests too.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::scheduler::{classify_status, error_message};
use crate::token::TokenProvider;

const QUEUE_BASE_URL: &str = "https://cloudtasks.googleapis.com/v2";

/// A deferred dispatch request.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    /// Callback URL the queue will POST to.
    pub url: String,
    /// Readable name hint; sanitized and suffixed with the scheduled epoch
    /// second so re-enqueues of the same hint do not collide.
    pub name_hint: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// Seconds to hold the task before delivery.
    pub delay_secs: i64,
}

/// A queued task as the provider reports it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTask {
    pub name: String,
    #[serde(default)]
    pub http_request: Option<QueueHttpRequest>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueHttpRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub http_method: String,
}

/// Remote queue enqueue/list/delete.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Returns the provider-assigned task name (an opaque handle).
    async fn enqueue(&self, req: &EnqueueRequest) -> Result<String>;
    async fn list(&self) -> Result<Vec<QueueTask>>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// REST client for the provider's task queue API.
pub struct HttpQueueClient {
    client: reqwest::Client,
    config: RemoteConfig,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl HttpQueueClient {
    pub fn new(config: RemoteConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tokens,
            base_url: QUEUE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn queue_path(&self) -> Result<String> {
        self.config
            .queue_path()
            .ok_or_else(|| RemoteError::Token("no queue configured".to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = error_message(&resp.text().await.unwrap_or_default());
        Err(classify_status(status.as_u16(), message))
    }
}

/// Build the provider task name for a hint: sanitize, then suffix with the
/// scheduled epoch second.
pub fn task_name_for_hint(hint: &str, scheduled_epoch: i64) -> String {
    format!(
        "{}-{}",
        timekeeper_core::types::queue_task_name(hint),
        scheduled_epoch
    )
}

#[async_trait]
impl QueueApi for HttpQueueClient {
    async fn enqueue(&self, req: &EnqueueRequest) -> Result<String> {
        let queue = self.queue_path()?;
        let scheduled = Utc::now() + Duration::seconds(req.delay_secs);

        let mut http_request = serde_json::json!({
            "httpMethod": "POST",
            "url": req.url,
            "oidcToken": {"serviceAccountEmail": self.config.service_account},
        });
        if let Some(payload) = &req.payload {
            http_request["body"] = serde_json::Value::String(STANDARD.encode(payload.to_string()));
            http_request["headers"] = serde_json::json!({"Content-Type": "application/json"});
        }

        let mut task = serde_json::json!({
            "scheduleTime": scheduled.to_rfc3339(),
            "httpRequest": http_request,
        });
        if let Some(hint) = &req.name_hint {
            let name = task_name_for_hint(hint, scheduled.timestamp());
            task["name"] = serde_json::Value::String(format!("{queue}/tasks/{name}"));
        }

        let url = format!("{}/{}/tasks", self.base_url, queue);
        debug!(url = %req.url, delay = req.delay_secs, "enqueueing deferred task");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.tokens.access_token().await?)
            .json(&serde_json::json!({"task": task}))
            .send()
            .await?;
        let created: QueueTask = Self::check(resp).await?.json().await?;
        Ok(created.name)
    }

    async fn list(&self) -> Result<Vec<QueueTask>> {
        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            tasks: Vec<QueueTask>,
        }

        let url = format!("{}/{}/tasks", self.base_url, self.queue_path()?);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.tokens.access_token().await?)
            .send()
            .await?;
        let list: ListResponse = Self::check(resp).await?.json().await?;
        Ok(list.tasks)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let queue = self.queue_path()?;
        // Accept both short and fully-qualified names.
        let short = name
            .strip_prefix(&format!("{queue}/tasks/"))
            .unwrap_or(name);
        let url = format!("{}/{}/tasks/{}", self.base_url, queue, short);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(self.tokens.access_token().await?)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_are_sanitized_and_suffixed() {
        assert_eq!(
            task_name_for_hint("nightly run #3", 1_700_000_000),
            "nightly-run--3-1700000000"
        );
    }
}

//! Typed wrapper over the remote scheduler's job CRUD RPCs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::token::TokenProvider;

const SCHEDULER_BASE_URL: &str = "https://cloudscheduler.googleapis.com/v1";

/// Job attributes the provider allows updating in place.
pub const MUTABLE_JOB_FIELDS: [&str; 4] = ["description", "schedule", "time_zone", "http_target"];

/// Desired state of a remote job, built from a clock's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Short job name (the clock's frozen `gcp_name`).
    pub name: String,
    pub description: String,
    /// Cron expression, forwarded verbatim.
    pub schedule: String,
    pub time_zone: String,
    /// Callback URL the scheduler invokes on each tick.
    pub target_url: String,
    /// Identity the scheduler presents on the callback.
    pub service_account: String,
}

impl JobSpec {
    fn wire_body(&self, config: &RemoteConfig) -> serde_json::Value {
        serde_json::json!({
            "name": config.job_path(&self.name),
            "description": self.description,
            "schedule": self.schedule,
            "timeZone": self.time_zone,
            "httpTarget": {
                "uri": self.target_url,
                "oidcToken": {"serviceAccountEmail": self.service_account}
            }
        })
    }
}

/// A job as the provider reports it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    /// Fully-qualified resource name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub http_target: Option<HttpTarget>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTarget {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub oidc_token: Option<OidcToken>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcToken {
    #[serde(default)]
    pub service_account_email: String,
}

impl RemoteJob {
    fn target_uri(&self) -> &str {
        self.http_target.as_ref().map(|t| t.uri.as_str()).unwrap_or("")
    }

    fn target_service_account(&self) -> &str {
        self.http_target
            .as_ref()
            .and_then(|t| t.oidc_token.as_ref())
            .map(|o| o.service_account_email.as_str())
            .unwrap_or("")
    }
}

/// Compute which field paths differ between the provider's job and the
/// desired spec, restricted to [`MUTABLE_JOB_FIELDS`].
///
/// Paths named in `forced` are included even when the values match — `sync`
/// forces `http_target` to repair a callback URL the diff can't see as stale
/// (for example after a deployment root URL change mid-flight).
pub fn update_mask(old: &RemoteJob, new: &JobSpec, forced: &[&str]) -> Vec<&'static str> {
    let mut paths = Vec::new();
    let forced_or_changed = |path: &str, changed: bool| changed || forced.contains(&path);

    if forced_or_changed("description", old.description != new.description) {
        paths.push("description");
    }
    if forced_or_changed("schedule", old.schedule != new.schedule) {
        paths.push("schedule");
    }
    if forced_or_changed("time_zone", old.time_zone != new.time_zone) {
        paths.push("time_zone");
    }
    let target_changed = old.target_uri() != new.target_url
        || old.target_service_account() != new.service_account;
    if forced_or_changed("http_target", target_changed) {
        paths.push("http_target");
    }
    paths
}

/// Remote scheduler job CRUD.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Fetch a job by its short name.
    async fn get_job(&self, name: &str) -> Result<RemoteJob>;
    async fn create_job(&self, spec: &JobSpec) -> Result<RemoteJob>;
    /// Submit only the fields named in `field_paths`.
    async fn update_job(&self, spec: &JobSpec, field_paths: &[&str]) -> Result<RemoteJob>;
    async fn pause_job(&self, name: &str) -> Result<()>;
    async fn resume_job(&self, name: &str) -> Result<()>;
    async fn delete_job(&self, name: &str) -> Result<()>;
}

/// REST client for the provider's scheduler API.
pub struct HttpSchedulerClient {
    client: reqwest::Client,
    config: RemoteConfig,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl HttpSchedulerClient {
    pub fn new(config: RemoteConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tokens,
            base_url: SCHEDULER_BASE_URL.to_string(),
        }
    }

    /// Point at a different API endpoint (emulators, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens.access_token().await
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

/// Map a provider error status onto the typed taxonomy.
pub(crate) fn classify_status(status: u16, message: String) -> RemoteError {
    match status {
        404 => RemoteError::NotFound(message),
        401 | 403 => RemoteError::PermissionDenied(message),
        _ => RemoteError::Denied { status, message },
    }
}

/// Pull the human-readable message out of a provider error body, falling
/// back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl SchedulerApi for HttpSchedulerClient {
    async fn get_job(&self, name: &str) -> Result<RemoteJob> {
        let url = format!("{}/{}", self.base_url, self.config.job_path(name));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn create_job(&self, spec: &JobSpec) -> Result<RemoteJob> {
        let url = format!("{}/{}/jobs", self.base_url, self.config.location_path());
        debug!(job = %spec.name, "creating remote job");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&spec.wire_body(&self.config))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn update_job(&self, spec: &JobSpec, field_paths: &[&str]) -> Result<RemoteJob> {
        let url = format!(
            "{}/{}?updateMask={}",
            self.base_url,
            self.config.job_path(&spec.name),
            field_paths.join(",")
        );
        debug!(job = %spec.name, mask = %field_paths.join(","), "updating remote job");
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(self.bearer().await?)
            .json(&spec.wire_body(&self.config))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn pause_job(&self, name: &str) -> Result<()> {
        let url = format!("{}/{}:pause", self.base_url, self.config.job_path(name));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn resume_job(&self, name: &str) -> Result<()> {
        let url = format!("{}/{}:resume", self.base_url, self.config.job_path(name));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, self.config.job_path(name));
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_job() -> RemoteJob {
        RemoteJob {
            name: "projects/acme/locations/us-central1/jobs/Every-Day".into(),
            description: "daily".into(),
            schedule: "0 3 * * *".into(),
            time_zone: "UTC".into(),
            http_target: Some(HttpTarget {
                uri: "https://acme.appspot.com/api/clocks/1/tick/".into(),
                oidc_token: Some(OidcToken {
                    service_account_email: "acme@appspot.gserviceaccount.com".into(),
                }),
            }),
            state: Some("ENABLED".into()),
        }
    }

    fn matching_spec() -> JobSpec {
        JobSpec {
            name: "Every-Day".into(),
            description: "daily".into(),
            schedule: "0 3 * * *".into(),
            time_zone: "UTC".into(),
            target_url: "https://acme.appspot.com/api/clocks/1/tick/".into(),
            service_account: "acme@appspot.gserviceaccount.com".into(),
        }
    }

    #[test]
    fn mask_is_empty_when_nothing_changed() {
        assert!(update_mask(&remote_job(), &matching_spec(), &[]).is_empty());
    }

    #[test]
    fn mask_contains_only_changed_fields() {
        let mut spec = matching_spec();
        spec.schedule = "0 4 * * *".into();
        spec.description = "daily, but later".into();
        assert_eq!(
            update_mask(&remote_job(), &spec, &[]),
            vec!["description", "schedule"]
        );
    }

    #[test]
    fn target_changes_collapse_into_http_target() {
        let mut spec = matching_spec();
        spec.service_account = "other@acme.iam.gserviceaccount.com".into();
        assert_eq!(update_mask(&remote_job(), &spec, &[]), vec!["http_target"]);
    }

    #[test]
    fn forced_fields_are_included_even_when_equal() {
        assert_eq!(
            update_mask(&remote_job(), &matching_spec(), &["http_target"]),
            vec!["http_target"]
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(404, "gone".into()),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(403, "iam".into()),
            RemoteError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(500, "boom".into()),
            RemoteError::Denied { status: 500, .. }
        ));
    }

    #[test]
    fn error_message_prefers_provider_body() {
        let body = r#"{"error": {"code": 403, "message": "The principal lacks IAM permission"}}"#;
        assert_eq!(error_message(body), "The principal lacks IAM permission");
        assert_eq!(error_message("plain text"), "plain text");
    }
}

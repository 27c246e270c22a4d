//! Single-step execution: one authenticated HTTP call, judged and recorded.
//!
//! A step never returns an error upward. Whatever goes wrong — token minting,
//! transport, a bad pattern, a non-2xx status — becomes a failed
//! [`StepRecord`], because the task engine needs every step accounted for in
//! the execution's results.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use timekeeper_core::types::HttpMethod;
use timekeeper_remote::TokenProvider;
use timekeeper_store::Step;

/// Values threaded between steps. Seeded with `timestamp` at task start;
/// named captures from success patterns accumulate into it.
pub type Context = BTreeMap<String, String>;

/// The audit entry for one step, attempted or not.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    /// `None` when the step was never attempted (an earlier step failed).
    pub success: Option<bool>,
    pub entry: Value,
}

impl StepRecord {
    /// Placeholder for a step skipped because an earlier one failed.
    pub fn unattempted(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            success: None,
            entry: json!({
                "step": step_entry(step, &step.payload),
                "response": {"success": null, "status": -1, "content": null, "error": null},
            }),
        }
    }

    fn attempted(step: &Step, payload: &Option<Value>, response: Value, success: bool) -> Self {
        Self {
            name: step.name.clone(),
            success: Some(success),
            entry: json!({
                "step": step_entry(step, payload),
                "response": response,
            }),
        }
    }
}

fn step_entry(step: &Step, payload: &Option<Value>) -> Value {
    json!({
        "name": step.name,
        "url": step.action,
        "method": step.method.to_string(),
        "payload": payload,
    })
}

/// Runs one step against its target. Trait-object seam so tests can script
/// step outcomes without a network.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step: &Step, context: Context) -> (StepRecord, Context);
}

/// Fill `${key}` placeholders from the context. Substitution happens on the
/// serialised form so placeholders work at any nesting depth; if the result
/// no longer parses the raw text is kept as a string payload.
pub fn substitute(payload: &Value, context: &Context) -> Value {
    let mut text = payload.to_string();
    for (key, value) in context {
        text = text.replace(&format!("${{{key}}}"), value);
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// A response counts as successful below the redirect range.
pub fn status_ok(status: u16) -> bool {
    status <= 299
}

/// Production step runner: mints an identity token for the step's target and
/// performs the call.
pub struct HttpStepExecutor {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpStepExecutor {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
        }
    }

    fn reqwest_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }

    fn failure_record(step: &Step, payload: Option<Value>, status: i64, error: String) -> StepRecord {
        let response = json!({
            "success": false,
            "status": status,
            "content": null,
            "error": error,
        });
        StepRecord::attempted(step, &payload, response, false)
    }
}

#[async_trait]
impl StepRunner for HttpStepExecutor {
    async fn run(&self, step: &Step, mut context: Context) -> (StepRecord, Context) {
        let payload = step.payload.as_ref().map(|p| substitute(p, &context));
        debug!(step = %step.name, url = %step.action, "running step");

        let token = match self.tokens.identity_token(&step.action).await {
            Ok(t) => t,
            Err(e) => {
                let record =
                    Self::failure_record(step, payload, 500, format!("token error: {e}"));
                return (record, context);
            }
        };

        let mut request = self
            .client
            .request(Self::reqwest_method(step.method), &step.action)
            .bearer_auth(token);
        if let Some(body) = &payload {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let record =
                    Self::failure_record(step, payload, 500, format!("transport error: {e}"));
                return (record, context);
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let content: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));

        let (success, error) = if !status_ok(status) {
            (false, Some("HTTP Error".to_string()))
        } else {
            match &step.success_pattern {
                None => (true, None),
                Some(pattern) => match Regex::new(pattern) {
                    Err(e) => (false, Some(format!("invalid success pattern: {e}"))),
                    Ok(re) => match re.captures(&body) {
                        None => (
                            false,
                            Some(format!("success pattern not matched: {pattern}")),
                        ),
                        Some(caps) => {
                            for name in re.capture_names().flatten() {
                                if let Some(m) = caps.name(name) {
                                    context.insert(name.to_string(), m.as_str().to_string());
                                }
                            }
                            (true, None)
                        }
                    },
                },
            }
        };

        let response_entry = json!({
            "success": success,
            "status": status,
            "content": content,
            "error": error,
        });
        (
            StepRecord::attempted(step, &payload, response_entry, success),
            context,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_range_is_not_success() {
        assert!(status_ok(200));
        assert!(status_ok(299));
        assert!(!status_ok(300));
        assert!(!status_ok(404));
    }

    #[test]
    fn substitution_reaches_nested_values() {
        let mut ctx = Context::new();
        ctx.insert("run_id".to_string(), "r-42".to_string());
        let payload = json!({"outer": {"id": "${run_id}"}, "untouched": true});
        assert_eq!(
            substitute(&payload, &ctx),
            json!({"outer": {"id": "r-42"}, "untouched": true})
        );
    }

    #[test]
    fn unknown_placeholders_are_left_verbatim() {
        let ctx = Context::new();
        let payload = json!({"id": "${missing}"});
        assert_eq!(substitute(&payload, &ctx), json!({"id": "${missing}"}));
    }

    #[test]
    fn unattempted_record_uses_placeholder_response() {
        let step = Step {
            id: 1,
            task_id: 1,
            name: "notify".to_string(),
            action: "https://example.com/notify".to_string(),
            method: timekeeper_core::types::HttpMethod::Post,
            payload: None,
            success_pattern: None,
        };
        let record = StepRecord::unattempted(&step);
        assert_eq!(record.success, None);
        assert_eq!(record.entry["response"]["status"], json!(-1));
        assert_eq!(record.entry["response"]["success"], Value::Null);
    }
}
//! The real HTTP step executor against a local server: pattern
//! classification and capture propagation over an actual request cycle.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::any, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use timekeeper_core::types::HttpMethod;
use timekeeper_engine::{Context, HttpStepExecutor, StepRunner};
use timekeeper_remote::{RemoteError, TokenProvider};
use timekeeper_store::Step;

struct FixedToken;

#[async_trait]
impl TokenProvider for FixedToken {
    async fn access_token(&self) -> Result<String, RemoteError> {
        Ok("access".into())
    }

    async fn identity_token(&self, _audience: &str) -> Result<String, RemoteError> {
        Ok("identity".into())
    }
}

async fn spawn_json_server(status: u16, body: serde_json::Value) -> SocketAddr {
    let app = Router::new().route(
        "/target",
        any(move || {
            let body = body.clone();
            async move {
                (
                    axum::http::StatusCode::from_u16(status).expect("valid status"),
                    Json(body),
                )
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn step_for(addr: SocketAddr, pattern: Option<&str>) -> Step {
    Step {
        id: 1,
        task_id: 1,
        name: "report".into(),
        action: format!("http://{addr}/target"),
        method: HttpMethod::Post,
        payload: None,
        success_pattern: pattern.map(str::to_string),
    }
}

#[tokio::test]
async fn named_capture_lands_in_the_returned_context() {
    let addr = spawn_json_server(200, json!({"state": "done", "build": "b-42"})).await;
    let executor = HttpStepExecutor::new(Arc::new(FixedToken));
    let step = step_for(addr, Some(r#""build":"(?P<build_id>[a-z0-9-]+)""#));

    let mut context = Context::new();
    context.insert("timestamp".into(), "2026-08-31T00:00:00Z".into());
    let (record, context) = executor.run(&step, context).await;

    assert_eq!(record.success, Some(true));
    assert_eq!(context.get("build_id").map(String::as_str), Some("b-42"));
    // earlier context entries survive the merge
    assert!(context.contains_key("timestamp"));
}

#[tokio::test]
async fn unmatched_pattern_fails_and_names_the_pattern() {
    let addr = spawn_json_server(200, json!({"state": "running"})).await;
    let executor = HttpStepExecutor::new(Arc::new(FixedToken));
    let pattern = r#""state":"done""#;
    let step = step_for(addr, Some(pattern));

    let (record, _) = executor.run(&step, Context::new()).await;

    assert_eq!(record.success, Some(false));
    let error = record.entry["response"]["error"]
        .as_str()
        .expect("error reason");
    assert!(error.contains(pattern), "reason was: {error}");
}

#[tokio::test]
async fn error_status_fails_regardless_of_body() {
    let addr = spawn_json_server(500, json!({"state": "done"})).await;
    let executor = HttpStepExecutor::new(Arc::new(FixedToken));
    let step = step_for(addr, Some(r#""state":"done""#));

    let (record, _) = executor.run(&step, Context::new()).await;

    assert_eq!(record.success, Some(false));
    assert_eq!(record.entry["response"]["status"], json!(500));
    assert_eq!(record.entry["response"]["error"], json!("HTTP Error"));
}

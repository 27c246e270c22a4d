//! Task execution and schedule dispatch against scripted step runners.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use timekeeper_core::types::{ExecutionStatus, Management};
use timekeeper_engine::{Context, EngineError, ScheduleRunner, StepRecord, StepRunner, TaskEngine};
use timekeeper_remote::{EnqueueRequest, QueueApi, QueueTask, RemoteConfig, RemoteError};
use timekeeper_store::{NewClock, NewStep, Step, Store, Task};

/// Step runner fake: every step succeeds unless its name is listed, and
/// the context each step received is kept for inspection. Steps whose name
/// appears in `extract` add a capture to the context, like a success
/// pattern would.
#[derive(Default)]
struct ScriptedRunner {
    fail_names: HashSet<String>,
    extract: BTreeMap<String, (String, String)>,
    seen: Mutex<Vec<(String, Context)>>,
}

impl ScriptedRunner {
    fn failing(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, step: &Step, mut context: Context) -> (StepRecord, Context) {
        self.seen
            .lock()
            .unwrap()
            .push((step.name.clone(), context.clone()));
        let success = !self.fail_names.contains(&step.name);
        if success {
            if let Some((key, value)) = self.extract.get(&step.name) {
                context.insert(key.clone(), value.clone());
            }
        }
        let record = StepRecord {
            name: step.name.clone(),
            success: Some(success),
            entry: json!({
                "step": {"name": step.name},
                "response": {"success": success, "status": if success { 200 } else { 500 }},
            }),
        };
        (record, context)
    }
}

fn store_with_task(step_names: &[&str]) -> (Store, Task) {
    let store = Store::in_memory().unwrap();
    let task = store.create_task("reporting").unwrap();
    for name in step_names {
        store
            .create_step(
                task.id,
                &NewStep {
                    name: name.to_string(),
                    action: format!("https://example.com/{name}/"),
                    method: timekeeper_core::types::HttpMethod::Post,
                    payload: Some(json!({"run": "${timestamp}"})),
                    success_pattern: None,
                },
            )
            .unwrap();
    }
    (store, task)
}

#[tokio::test]
async fn a_clean_run_finishes_as_success() {
    let (store, task) = store_with_task(&["extract", "transform", "load"]);
    let runner = Arc::new(ScriptedRunner::default());
    let engine = TaskEngine::new(store.clone(), runner.clone());

    let execution = engine.execute(task.id, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.start_time.is_some());
    assert!(execution.finish_time.is_some());

    let results = execution.results.unwrap();
    assert_eq!(results["steps_total"], json!(3));
    assert_eq!(results["steps_completed"], json!(3));
    assert_eq!(results["all_completed"], json!(true));

    // every step ran, in creation order, with the seeded timestamp visible
    let seen = runner.seen.lock().unwrap();
    let order: Vec<&str> = seen.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(order, vec!["extract", "transform", "load"]);
    assert!(seen.iter().all(|(_, ctx)| ctx.contains_key("timestamp")));
}

#[tokio::test]
async fn captures_flow_into_later_steps() {
    let (store, task) = store_with_task(&["create", "poll"]);
    let mut runner = ScriptedRunner::default();
    runner.extract.insert(
        "create".to_string(),
        ("order_id".to_string(), "ord-7".to_string()),
    );
    let runner = Arc::new(runner);
    let engine = TaskEngine::new(store, runner.clone());

    engine.execute(task.id, None).await.unwrap();

    let seen = runner.seen.lock().unwrap();
    let (_, poll_ctx) = &seen[1];
    assert_eq!(poll_ctx.get("order_id").map(String::as_str), Some("ord-7"));
}

#[tokio::test]
async fn a_failed_step_stops_the_run_but_every_step_is_recorded() {
    let (store, task) = store_with_task(&["extract", "transform", "load"]);
    let runner = Arc::new(ScriptedRunner::failing(&["transform"]));
    let engine = TaskEngine::new(store, runner.clone());

    let execution = engine.execute(task.id, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failure);

    let results = execution.results.unwrap();
    assert_eq!(results["steps_total"], json!(3));
    assert_eq!(results["steps_completed"], json!(1));
    assert_eq!(results["steps_failed"], json!(1));
    assert_eq!(results["all_completed"], json!(false));
    // the step after the failure is an unattempted placeholder
    assert_eq!(results["results"][2]["response"]["status"], json!(-1));

    let seen = runner.seen.lock().unwrap();
    assert_eq!(seen.len(), 2, "load must never reach the runner");
}

#[tokio::test]
async fn a_task_without_steps_still_succeeds() {
    let (store, task) = store_with_task(&[]);
    let engine = TaskEngine::new(store, Arc::new(ScriptedRunner::default()));

    let execution = engine.execute(task.id, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.results.unwrap()["all_completed"], json!(true));
}

#[tokio::test]
async fn resuming_a_pending_execution_reuses_the_row() {
    let (store, task) = store_with_task(&["extract"]);
    let pending = store
        .create_execution(task.id, ExecutionStatus::Pending)
        .unwrap();
    assert!(pending.queued_time.is_some());

    let engine = TaskEngine::new(store.clone(), Arc::new(ScriptedRunner::default()));
    let finished = engine.execute(task.id, Some(pending.id)).await.unwrap();

    assert_eq!(finished.id, pending.id);
    assert_eq!(finished.status, ExecutionStatus::Success);
    assert_eq!(finished.queued_time, pending.queued_time);
    assert!(finished.start_time.is_some());
    assert_eq!(store.list_executions(Some(task.id)).unwrap().len(), 1);
}

#[tokio::test]
async fn resuming_another_tasks_execution_is_refused() {
    let (store, task) = store_with_task(&["extract"]);
    let other = store.create_task("billing").unwrap();
    let pending = store
        .create_execution(other.id, ExecutionStatus::Pending)
        .unwrap();

    let engine = TaskEngine::new(store.clone(), Arc::new(ScriptedRunner::default()));
    let err = engine.execute(task.id, Some(pending.id)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotFound {
            kind: "task execution",
            ..
        }
    ));

    // the mismatched row is untouched
    let untouched = store.get_execution(pending.id).unwrap().unwrap();
    assert_eq!(untouched.status, ExecutionStatus::Pending);
    assert!(untouched.start_time.is_none());
}

#[tokio::test]
async fn executing_a_missing_task_is_an_error() {
    let store = Store::in_memory().unwrap();
    let engine = TaskEngine::new(store, Arc::new(ScriptedRunner::default()));
    let err = engine.execute(99, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "task", .. }));
}

// ── Schedule dispatch ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MockQueue {
    requests: Mutex<Vec<EnqueueRequest>>,
    fail: bool,
}

#[async_trait]
impl QueueApi for MockQueue {
    async fn enqueue(&self, req: &EnqueueRequest) -> Result<String, RemoteError> {
        if self.fail {
            return Err(RemoteError::Denied {
                status: 500,
                message: "queue unavailable".into(),
            });
        }
        self.requests.lock().unwrap().push(req.clone());
        Ok(format!("queued-{}", self.requests.lock().unwrap().len()))
    }

    async fn list(&self) -> Result<Vec<QueueTask>, RemoteError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _name: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

fn config() -> RemoteConfig {
    RemoteConfig {
        project_id: "acme".into(),
        region: "us-central1".into(),
        root_url: "https://acme.appspot.com".into(),
        service_account: "acme@appspot.gserviceaccount.com".into(),
        queue: Some("executions".into()),
        time_zone: "UTC".into(),
    }
}

fn clock_with_schedule(store: &Store, task_id: i64) -> (i64, String) {
    let clock = store
        .create_clock(&NewClock {
            name: "Every Minute".into(),
            description: String::new(),
            cron: "* * * * *".into(),
            time_zone: None,
            management: Management::Manual,
            service_account: None,
        })
        .unwrap();
    let schedule = store
        .create_schedule("minute-report", task_id, Some(clock.id), true)
        .unwrap();
    (clock.id, schedule.name)
}

#[tokio::test]
async fn tick_runs_schedules_inline_when_no_queue_is_configured() {
    let (store, task) = store_with_task(&["extract"]);
    let (clock_id, schedule_name) = clock_with_schedule(&store, task.id);
    let engine = Arc::new(TaskEngine::new(
        store.clone(),
        Arc::new(ScriptedRunner::default()),
    ));
    let runner = ScheduleRunner::new(store.clone(), engine, None, config());

    let outcomes = runner.tick(clock_id).await.unwrap();
    assert_eq!(outcomes[&schedule_name]["all_completed"], json!(true));
    assert_eq!(store.list_executions(Some(task.id)).unwrap().len(), 1);
}

#[tokio::test]
async fn tick_defers_through_the_queue_when_one_is_configured() {
    let (store, task) = store_with_task(&["extract"]);
    let (clock_id, schedule_name) = clock_with_schedule(&store, task.id);
    let queue = Arc::new(MockQueue::default());
    let engine = Arc::new(TaskEngine::new(
        store.clone(),
        Arc::new(ScriptedRunner::default()),
    ));
    let runner = ScheduleRunner::new(store.clone(), engine, Some(queue.clone()), config());

    let outcomes = runner.tick(clock_id).await.unwrap();
    assert_eq!(outcomes[&schedule_name]["status"], json!("pending"));

    let executions = store.list_executions(Some(task.id)).unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Pending);

    let requests = queue.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        format!(
            "https://acme.appspot.com/api/tasks/{}/execute/?task_execution_id={}",
            task.id, executions[0].id
        )
    );
    assert_eq!(requests[0].name_hint.as_deref(), Some("minute-report"));
}

#[tokio::test]
async fn a_failed_hand_off_finalises_the_execution_as_failed() {
    let (store, task) = store_with_task(&["extract"]);
    let (clock_id, schedule_name) = clock_with_schedule(&store, task.id);
    let queue = Arc::new(MockQueue {
        fail: true,
        ..MockQueue::default()
    });
    let engine = Arc::new(TaskEngine::new(
        store.clone(),
        Arc::new(ScriptedRunner::default()),
    ));
    let runner = ScheduleRunner::new(store.clone(), engine, Some(queue), config());

    // tick itself survives; the failure lands in the outcome map
    let outcomes = runner.tick(clock_id).await.unwrap();
    assert!(outcomes[&schedule_name]["error"].is_string());

    let executions = store.list_executions(Some(task.id)).unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failure);
}

//! Schedule dispatch: what happens when a clock ticks.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use timekeeper_core::types::ExecutionStatus;
use timekeeper_remote::{EnqueueRequest, QueueApi, RemoteConfig};
use timekeeper_store::{Store, TaskSchedule};

use crate::error::{EngineError, Result};
use crate::task::TaskEngine;

/// Runs the schedules bound to a clock, either inline or deferred through
/// the remote queue when one is configured.
pub struct ScheduleRunner {
    store: Store,
    engine: Arc<TaskEngine>,
    queue: Option<Arc<dyn QueueApi>>,
    config: RemoteConfig,
}

impl ScheduleRunner {
    pub fn new(
        store: Store,
        engine: Arc<TaskEngine>,
        queue: Option<Arc<dyn QueueApi>>,
        config: RemoteConfig,
    ) -> Self {
        Self {
            store,
            engine,
            queue,
            config,
        }
    }

    /// Run one schedule. Without a queue the task executes inline and its
    /// results come back directly; with a queue a pending execution is
    /// recorded and handed off, and only the handle comes back.
    ///
    /// A failed hand-off finalises the pending execution as failed — an
    /// execution row never stays pending with nothing in flight for it.
    pub async fn run(&self, schedule: &TaskSchedule) -> Result<Value> {
        match &self.queue {
            None => {
                let execution = self.engine.execute(schedule.task_id, None).await?;
                Ok(execution.results.unwrap_or(Value::Null))
            }
            Some(queue) => {
                let execution = self
                    .store
                    .create_execution(schedule.task_id, ExecutionStatus::Pending)?;
                let request = EnqueueRequest {
                    url: self.config.execute_url(schedule.task_id, execution.id),
                    name_hint: Some(schedule.name.clone()),
                    payload: None,
                    delay_secs: 0,
                };
                match queue.enqueue(&request).await {
                    Ok(handle) => {
                        info!(
                            schedule = %schedule.name,
                            execution = execution.id,
                            handle = %handle,
                            "execution queued"
                        );
                        Ok(json!({
                            "status": "pending",
                            "task_execution_id": execution.id,
                        }))
                    }
                    Err(e) => {
                        self.store.finalize_execution(
                            execution.id,
                            ExecutionStatus::Failure,
                            &json!({"error": format!("queue dispatch failed: {e}")}),
                        )?;
                        Err(EngineError::Queue(e.to_string()))
                    }
                }
            }
        }
    }

    /// Handle a clock tick: run every schedule bound to the clock and map
    /// schedule names to their outcomes. The enabled flag is advisory
    /// display state, not a gate — a ticking clock runs what it's bound to.
    ///
    /// One schedule's dispatch failure is recorded in the map instead of
    /// aborting the rest of the tick.
    pub async fn tick(&self, clock_id: i64) -> Result<Value> {
        let schedules = self.store.list_schedules_for_clock(clock_id)?;
        let mut outcomes = Map::new();
        for schedule in &schedules {
            let outcome = match self.run(schedule).await {
                Ok(value) => value,
                Err(EngineError::Queue(message)) => {
                    warn!(schedule = %schedule.name, error = %message, "schedule dispatch failed");
                    json!({"error": message})
                }
                Err(e) => return Err(e),
            };
            outcomes.insert(schedule.name.clone(), outcome);
        }
        Ok(Value::Object(outcomes))
    }
}

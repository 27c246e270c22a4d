//! Task execution: run a task's steps in order and record the outcome.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use timekeeper_core::types::{now_rfc3339, ExecutionStatus};
use timekeeper_store::{Store, TaskExecution};

use crate::error::{EngineError, Result};
use crate::step::{Context, StepRecord, StepRunner};

pub struct TaskEngine {
    store: Store,
    runner: Arc<dyn StepRunner>,
}

impl TaskEngine {
    pub fn new(store: Store, runner: Arc<dyn StepRunner>) -> Self {
        Self { store, runner }
    }

    /// Run every step of a task in creation order, stopping at the first
    /// failure. Steps after the failure still appear in the results as
    /// unattempted placeholders, so an execution always carries one entry
    /// per step.
    ///
    /// Pass `execution_id` to resume a pending execution handed off through
    /// the queue; without it a fresh execution row is created.
    pub async fn execute(
        &self,
        task_id: i64,
        execution_id: Option<i64>,
    ) -> Result<TaskExecution> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or(EngineError::NotFound {
                kind: "task",
                id: task_id.to_string(),
            })?;
        let execution = match execution_id {
            Some(id) => {
                // a queue callback can only resume an execution of its own task
                let pending = self.store.get_execution(id)?.filter(|e| e.task_id == task.id);
                if pending.is_none() {
                    return Err(EngineError::NotFound {
                        kind: "task execution",
                        id: id.to_string(),
                    });
                }
                self.store.mark_execution_started(id)?
            }
            None => self.store.create_execution(task.id, ExecutionStatus::Started)?,
        };

        let steps = self.store.list_steps(task.id)?;
        let mut context = Context::new();
        context.insert("timestamp".to_string(), now_rfc3339());

        let mut records: Vec<StepRecord> = Vec::with_capacity(steps.len());
        let mut failed = false;
        for step in &steps {
            if failed {
                records.push(StepRecord::unattempted(step));
                continue;
            }
            let (record, next_context) = self.runner.run(step, context.clone()).await;
            if record.success != Some(true) {
                failed = true;
            }
            context = next_context;
            records.push(record);
        }

        let results = summarize(&records);
        let status = if failed {
            ExecutionStatus::Failure
        } else {
            ExecutionStatus::Success
        };
        info!(
            task = %task.name,
            execution = execution.id,
            status = %status,
            "task execution finished"
        );
        Ok(self
            .store
            .finalize_execution(execution.id, status, &results)?)
    }
}

fn summarize(records: &[StepRecord]) -> Value {
    let completed = records
        .iter()
        .filter(|r| r.success == Some(true))
        .count();
    let failed = records
        .iter()
        .filter(|r| r.success == Some(false))
        .count();
    json!({
        "steps_total": records.len(),
        "steps_completed": completed,
        "steps_failed": failed,
        "all_completed": failed == 0 && completed == records.len(),
        "results": records.iter().map(|r| r.entry.clone()).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, success: Option<bool>) -> StepRecord {
        StepRecord {
            name: name.to_string(),
            success,
            entry: json!({"step": {"name": name}}),
        }
    }

    #[test]
    fn summary_counts_and_completion() {
        let records = vec![
            record("a", Some(true)),
            record("b", Some(false)),
            record("c", None),
        ];
        let summary = summarize(&records);
        assert_eq!(summary["steps_total"], json!(3));
        assert_eq!(summary["steps_completed"], json!(1));
        assert_eq!(summary["steps_failed"], json!(1));
        assert_eq!(summary["all_completed"], json!(false));
    }

    #[test]
    fn empty_task_counts_as_complete() {
        let summary = summarize(&[]);
        assert_eq!(summary["all_completed"], json!(true));
    }
}

use rusqlite::{params, Connection};
use serde_json::Value;
use timekeeper_core::types::{now_rfc3339, ExecutionStatus};

use crate::db::{row_to_execution, EXECUTION_SELECT_SQL};
use crate::error::{Result, StoreError};
use crate::types::TaskExecution;

/// Create a fresh execution record.
///
/// `Pending` records (deferred dispatch) get `queued_time` stamped;
/// `Started` records (synchronous dispatch) get `start_time` stamped.
pub fn create_execution(
    conn: &Connection,
    task_id: i64,
    status: ExecutionStatus,
) -> Result<TaskExecution> {
    let now = now_rfc3339();
    let (queued_time, start_time) = match status {
        ExecutionStatus::Pending => (Some(now.clone()), None),
        _ => (None, Some(now.clone())),
    };
    conn.execute(
        "INSERT INTO task_executions (task_id, status, queued_time, start_time)
         VALUES (?1,?2,?3,?4)",
        params![task_id, status.to_string(), queued_time, start_time],
    )?;
    Ok(TaskExecution {
        id: conn.last_insert_rowid(),
        task_id,
        status,
        queued_time,
        start_time,
        finish_time: None,
        results: None,
    })
}

pub fn get_execution(conn: &Connection, id: i64) -> Result<Option<TaskExecution>> {
    let sql = format!("{EXECUTION_SELECT_SQL} WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    match stmt.query_row(params![id], row_to_execution) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn list_executions(conn: &Connection, task_id: Option<i64>) -> Result<Vec<TaskExecution>> {
    let (sql, args) = match task_id {
        Some(id) => (
            format!("{EXECUTION_SELECT_SQL} WHERE task_id = ?1 ORDER BY id"),
            vec![id],
        ),
        None => (format!("{EXECUTION_SELECT_SQL} ORDER BY id"), vec![]),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_execution)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Move an execution into `started`. `start_time` is written only on the
/// first transition — COALESCE keeps the original stamp if a queued
/// execution was somehow started twice.
pub fn mark_started(conn: &Connection, id: i64) -> Result<TaskExecution> {
    let now = now_rfc3339();
    let n = conn.execute(
        "UPDATE task_executions
         SET status = ?2, start_time = COALESCE(start_time, ?3)
         WHERE id = ?1",
        params![id, ExecutionStatus::Started.to_string(), now],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "task execution",
            id: id.to_string(),
        });
    }
    get_execution(conn, id)?.ok_or(StoreError::NotFound {
        kind: "task execution",
        id: id.to_string(),
    })
}

/// Finalize an execution with its verdict and results. `finish_time` is
/// written exactly once, on the transition into success/failure.
pub fn finalize_execution(
    conn: &Connection,
    id: i64,
    status: ExecutionStatus,
    results: &Value,
) -> Result<TaskExecution> {
    let now = now_rfc3339();
    let n = conn.execute(
        "UPDATE task_executions
         SET status = ?2, results = ?3, finish_time = COALESCE(finish_time, ?4)
         WHERE id = ?1",
        params![id, status.to_string(), serde_json::to_string(results)?, now],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "task execution",
            id: id.to_string(),
        });
    }
    get_execution(conn, id)?.ok_or(StoreError::NotFound {
        kind: "task execution",
        id: id.to_string(),
    })
}

use rusqlite::{params, Connection};
use timekeeper_core::types::MAX_NAME_LENGTH;

use crate::db::{row_to_step, STEP_SELECT_SQL};
use crate::error::{Result, StoreError};
use crate::types::{NewStep, Step, Task};

pub fn create_task(conn: &Connection, name: &str) -> Result<Task> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(StoreError::InvalidValue(format!(
            "task name must be 1..={MAX_NAME_LENGTH} characters"
        )));
    }
    match conn.execute("INSERT INTO tasks (name) VALUES (?1)", params![name]) {
        Ok(_) => Ok(Task {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        }),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::AlreadyExists {
                kind: "task",
                name: name.to_string(),
            })
        }
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let mut stmt = conn.prepare("SELECT id, name FROM tasks WHERE id = ?1")?;
    match stmt.query_row(params![id], |row| {
        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare("SELECT id, name FROM tasks ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Delete a task. Refuses while steps or schedules still reference it
/// unless `cascade` removes the steps too (schedules always block).
pub fn delete_task(conn: &Connection, id: i64, cascade: bool) -> Result<()> {
    let schedules: i64 = conn.query_row(
        "SELECT COUNT(*) FROM task_schedules WHERE task_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if schedules > 0 {
        return Err(StoreError::ProtectedDelete(format!(
            "task {id} has {schedules} schedule(s); delete them first"
        )));
    }
    let steps: i64 = conn.query_row(
        "SELECT COUNT(*) FROM steps WHERE task_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if steps > 0 && !cascade {
        return Err(StoreError::ProtectedDelete(format!(
            "task {id} has {steps} step(s); pass cascade to delete them too"
        )));
    }
    conn.execute("DELETE FROM steps WHERE task_id = ?1", params![id])?;
    let n = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        });
    }
    Ok(())
}

// ── Steps ─────────────────────────────────────────────────────────────────────

pub fn create_step(conn: &Connection, task_id: i64, new: &NewStep) -> Result<Step> {
    let payload_json = new
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    match conn.execute(
        "INSERT INTO steps (task_id, name, action, method, payload, success_pattern)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            task_id,
            new.name,
            new.action,
            new.method.to_string(),
            payload_json,
            new.success_pattern,
        ],
    ) {
        Ok(_) => Ok(Step {
            id: conn.last_insert_rowid(),
            task_id,
            name: new.name.clone(),
            action: new.action.clone(),
            method: new.method,
            payload: new.payload.clone(),
            success_pattern: new.success_pattern.clone(),
        }),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::AlreadyExists {
                kind: "step",
                name: new.name.clone(),
            })
        }
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn get_step(conn: &Connection, id: i64) -> Result<Option<Step>> {
    let sql = format!("{STEP_SELECT_SQL} WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    match stmt.query_row(params![id], row_to_step) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

/// Steps of a task in execution order — ascending primary key, i.e. the
/// order they were created in.
pub fn list_steps(conn: &Connection, task_id: i64) -> Result<Vec<Step>> {
    let sql = format!("{STEP_SELECT_SQL} WHERE task_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![task_id], row_to_step)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_step(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM steps WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "step",
            id: id.to_string(),
        });
    }
    Ok(())
}

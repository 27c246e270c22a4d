use rusqlite::{params, Connection};
use timekeeper_core::types::MAX_NAME_LENGTH;

use crate::db::{row_to_schedule, SCHEDULE_SELECT_SQL};
use crate::error::{Result, StoreError};
use crate::types::TaskSchedule;

pub fn create_schedule(
    conn: &Connection,
    name: &str,
    task_id: i64,
    clock_id: Option<i64>,
    enabled: bool,
) -> Result<TaskSchedule> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(StoreError::InvalidValue(format!(
            "schedule name must be 1..={MAX_NAME_LENGTH} characters"
        )));
    }
    match conn.execute(
        "INSERT INTO task_schedules (name, task_id, clock_id, enabled) VALUES (?1,?2,?3,?4)",
        params![name, task_id, clock_id, enabled as i64],
    ) {
        Ok(_) => Ok(TaskSchedule {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            task_id,
            clock_id,
            enabled,
        }),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::AlreadyExists {
                kind: "task schedule",
                name: name.to_string(),
            })
        }
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn get_schedule(conn: &Connection, id: i64) -> Result<Option<TaskSchedule>> {
    let sql = format!("{SCHEDULE_SELECT_SQL} WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    match stmt.query_row(params![id], row_to_schedule) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn list_schedules(conn: &Connection) -> Result<Vec<TaskSchedule>> {
    let sql = format!("{SCHEDULE_SELECT_SQL} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_schedule)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Every schedule attached to a clock, enabled or not — the tick path runs
/// them all and treats `enabled` as advisory.
pub fn list_schedules_for_clock(conn: &Connection, clock_id: i64) -> Result<Vec<TaskSchedule>> {
    let sql = format!("{SCHEDULE_SELECT_SQL} WHERE clock_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![clock_id], row_to_schedule)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn set_schedule_enabled(conn: &Connection, id: i64, enabled: bool) -> Result<()> {
    let n = conn.execute(
        "UPDATE task_schedules SET enabled = ?2 WHERE id = ?1",
        params![id, enabled as i64],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "task schedule",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_schedule(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM task_schedules WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "task schedule",
            id: id.to_string(),
        });
    }
    Ok(())
}

use rusqlite::Connection;
use std::str::FromStr;
use timekeeper_core::types::{ClockStatus, ExecutionStatus, HttpMethod, Management};

use crate::error::Result;
use crate::types::{Account, AccountRole, Clock, Step, TaskExecution, TaskSchedule};

/// Initialise the full schema. CREATE IF NOT EXISTS throughout, so it is
/// safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clocks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            gcp_name        TEXT    NOT NULL,
            description     TEXT    NOT NULL DEFAULT '',
            cron            TEXT    NOT NULL,
            time_zone       TEXT    NOT NULL,
            management      TEXT    NOT NULL DEFAULT 'gcp',
            status          TEXT    NOT NULL DEFAULT 'broken',
            service_account TEXT,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS tasks (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT    NOT NULL UNIQUE
        ) STRICT;

        CREATE TABLE IF NOT EXISTS steps (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id         INTEGER NOT NULL REFERENCES tasks(id),
            name            TEXT    NOT NULL,
            action          TEXT    NOT NULL,
            method          TEXT    NOT NULL DEFAULT 'POST',
            payload         TEXT,               -- JSON or NULL
            success_pattern TEXT,
            UNIQUE (name, task_id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_schedules (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            name     TEXT    NOT NULL UNIQUE,
            task_id  INTEGER NOT NULL REFERENCES tasks(id),
            clock_id INTEGER REFERENCES clocks(id) ON DELETE SET NULL,
            enabled  INTEGER NOT NULL DEFAULT 1
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_executions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            status      TEXT    NOT NULL DEFAULT 'started',
            queued_time TEXT,
            start_time  TEXT,
            finish_time TEXT,
            results     TEXT                    -- JSON or NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS accounts (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT    NOT NULL UNIQUE COLLATE NOCASE,
            role  TEXT    NOT NULL DEFAULT 'executor'
        ) STRICT;

        -- tick fan-out: SELECT … WHERE clock_id = ?
        CREATE INDEX IF NOT EXISTS idx_schedules_clock ON task_schedules (clock_id);
        -- step ordering within a task is ascending primary key
        CREATE INDEX IF NOT EXISTS idx_steps_task ON steps (task_id, id);
        CREATE INDEX IF NOT EXISTS idx_executions_task ON task_executions (task_id, id);
        ",
    )?;
    Ok(())
}

// ── Row mappers ───────────────────────────────────────────────────────────────
// Centralised here so every query in this crate stays consistent.

pub(crate) fn row_to_clock(row: &rusqlite::Row<'_>) -> rusqlite::Result<Clock> {
    let management = Management::from_str(&row.get::<_, String>(6)?).unwrap_or(Management::Manual);
    let status = ClockStatus::from_str(&row.get::<_, String>(7)?).unwrap_or(ClockStatus::Unknown);
    Ok(Clock {
        id: row.get(0)?,
        name: row.get(1)?,
        gcp_name: row.get(2)?,
        description: row.get(3)?,
        cron: row.get(4)?,
        time_zone: row.get(5)?,
        management,
        status,
        service_account: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) const CLOCK_SELECT_SQL: &str = "SELECT id, name, gcp_name, description, cron, \
     time_zone, management, status, service_account, created_at, updated_at FROM clocks";

pub(crate) fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<Step> {
    let method = HttpMethod::from_str(&row.get::<_, String>(4)?).unwrap_or(HttpMethod::Post);
    let payload = row
        .get::<_, Option<String>>(5)?
        .and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(Step {
        id: row.get(0)?,
        task_id: row.get(1)?,
        name: row.get(2)?,
        action: row.get(3)?,
        method,
        payload,
        success_pattern: row.get(6)?,
    })
}

pub(crate) const STEP_SELECT_SQL: &str =
    "SELECT id, task_id, name, action, method, payload, success_pattern FROM steps";

pub(crate) fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskSchedule> {
    Ok(TaskSchedule {
        id: row.get(0)?,
        name: row.get(1)?,
        task_id: row.get(2)?,
        clock_id: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
    })
}

pub(crate) const SCHEDULE_SELECT_SQL: &str =
    "SELECT id, name, task_id, clock_id, enabled FROM task_schedules";

pub(crate) fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskExecution> {
    let status =
        ExecutionStatus::from_str(&row.get::<_, String>(2)?).unwrap_or(ExecutionStatus::Failure);
    let results = row
        .get::<_, Option<String>>(6)?
        .and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(TaskExecution {
        id: row.get(0)?,
        task_id: row.get(1)?,
        status,
        queued_time: row.get(3)?,
        start_time: row.get(4)?,
        finish_time: row.get(5)?,
        results,
    })
}

pub(crate) const EXECUTION_SELECT_SQL: &str = "SELECT id, task_id, status, queued_time, \
     start_time, finish_time, results FROM task_executions";

pub(crate) fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let role = AccountRole::from_str(&row.get::<_, String>(2)?).unwrap_or(AccountRole::Executor);
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        role,
    })
}

pub(crate) const ACCOUNT_SELECT_SQL: &str = "SELECT id, email, role FROM accounts";

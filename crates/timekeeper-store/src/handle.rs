use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::Value;
use timekeeper_core::types::{ClockStatus, ExecutionStatus, Management};
use tracing::debug;

use crate::error::Result;
use crate::types::{Account, AccountRole, Clock, NewClock, NewStep, Step, Task, TaskExecution, TaskSchedule};
use crate::{accounts, clocks, db, executions, schedules, tasks};

/// Shared store handle. Clone-cheap; every subsystem holds one and the
/// connection is serialised behind a Mutex (rusqlite connections are not
/// Sync, and our write volume is tiny).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    default_time_zone: String,
}

impl Store {
    pub fn new(conn: Connection, default_time_zone: &str) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_time_zone: default_time_zone.to_string(),
        })
    }

    pub fn open(path: &str, default_time_zone: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        debug!(path, "database opened, schema ensured");
        Self::new(conn, default_time_zone)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?, "UTC")
    }

    // ── Clocks ────────────────────────────────────────────────────────────────

    pub fn create_clock(&self, new: &NewClock) -> Result<Clock> {
        let conn = self.conn.lock().unwrap();
        clocks::create_clock(&conn, new, &self.default_time_zone)
    }

    pub fn get_clock(&self, id: i64) -> Result<Option<Clock>> {
        let conn = self.conn.lock().unwrap();
        clocks::get_clock(&conn, id)
    }

    pub fn list_clocks(&self) -> Result<Vec<Clock>> {
        let conn = self.conn.lock().unwrap();
        clocks::list_clocks(&conn)
    }

    pub fn update_clock_fields(&self, clock: &Clock) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        clocks::update_clock_fields(&conn, clock)
    }

    pub fn set_clock_status(&self, id: i64, status: ClockStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        clocks::set_clock_status(&conn, id, status)
    }

    pub fn set_clock_management(&self, id: i64, management: Management) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        clocks::set_clock_management(&conn, id, management)
    }

    pub fn delete_clock_row(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        clocks::delete_clock_row(&conn, id)
    }

    // ── Tasks & steps ─────────────────────────────────────────────────────────

    pub fn create_task(&self, name: &str) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        tasks::create_task(&conn, name)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        tasks::get_task(&conn, id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        tasks::list_tasks(&conn)
    }

    pub fn delete_task(&self, id: i64, cascade: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        tasks::delete_task(&conn, id, cascade)
    }

    pub fn create_step(&self, task_id: i64, new: &NewStep) -> Result<Step> {
        let conn = self.conn.lock().unwrap();
        tasks::create_step(&conn, task_id, new)
    }

    pub fn get_step(&self, id: i64) -> Result<Option<Step>> {
        let conn = self.conn.lock().unwrap();
        tasks::get_step(&conn, id)
    }

    pub fn list_steps(&self, task_id: i64) -> Result<Vec<Step>> {
        let conn = self.conn.lock().unwrap();
        tasks::list_steps(&conn, task_id)
    }

    pub fn delete_step(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        tasks::delete_step(&conn, id)
    }

    // ── Schedules ─────────────────────────────────────────────────────────────

    pub fn create_schedule(
        &self,
        name: &str,
        task_id: i64,
        clock_id: Option<i64>,
        enabled: bool,
    ) -> Result<TaskSchedule> {
        let conn = self.conn.lock().unwrap();
        schedules::create_schedule(&conn, name, task_id, clock_id, enabled)
    }

    pub fn get_schedule(&self, id: i64) -> Result<Option<TaskSchedule>> {
        let conn = self.conn.lock().unwrap();
        schedules::get_schedule(&conn, id)
    }

    pub fn list_schedules(&self) -> Result<Vec<TaskSchedule>> {
        let conn = self.conn.lock().unwrap();
        schedules::list_schedules(&conn)
    }

    pub fn list_schedules_for_clock(&self, clock_id: i64) -> Result<Vec<TaskSchedule>> {
        let conn = self.conn.lock().unwrap();
        schedules::list_schedules_for_clock(&conn, clock_id)
    }

    pub fn set_schedule_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schedules::set_schedule_enabled(&conn, id, enabled)
    }

    pub fn delete_schedule(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schedules::delete_schedule(&conn, id)
    }

    // ── Executions ────────────────────────────────────────────────────────────

    pub fn create_execution(&self, task_id: i64, status: ExecutionStatus) -> Result<TaskExecution> {
        let conn = self.conn.lock().unwrap();
        executions::create_execution(&conn, task_id, status)
    }

    pub fn get_execution(&self, id: i64) -> Result<Option<TaskExecution>> {
        let conn = self.conn.lock().unwrap();
        executions::get_execution(&conn, id)
    }

    pub fn list_executions(&self, task_id: Option<i64>) -> Result<Vec<TaskExecution>> {
        let conn = self.conn.lock().unwrap();
        executions::list_executions(&conn, task_id)
    }

    pub fn mark_execution_started(&self, id: i64) -> Result<TaskExecution> {
        let conn = self.conn.lock().unwrap();
        executions::mark_started(&conn, id)
    }

    pub fn finalize_execution(
        &self,
        id: i64,
        status: ExecutionStatus,
        results: &Value,
    ) -> Result<TaskExecution> {
        let conn = self.conn.lock().unwrap();
        executions::finalize_execution(&conn, id, status, results)
    }

    // ── Accounts ──────────────────────────────────────────────────────────────

    pub fn create_account(&self, email: &str, role: AccountRole) -> Result<Account> {
        let conn = self.conn.lock().unwrap();
        accounts::create_account(&conn, email, role)
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        accounts::find_account_by_email(&conn, email)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        accounts::list_accounts(&conn)
    }

    pub fn delete_account(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        accounts::delete_account(&conn, id)
    }
}

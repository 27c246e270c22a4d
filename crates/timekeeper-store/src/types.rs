use serde::{Deserialize, Serialize};
use serde_json::Value;
use timekeeper_core::types::{ClockStatus, ExecutionStatus, HttpMethod, Management};

/// Local mirror of one remote cron job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clock {
    pub id: i64,
    /// Display name, editable.
    pub name: String,
    /// Remote job identity. Derived from `name` at creation and frozen:
    /// the remote job is addressed by it even after renames.
    pub gcp_name: String,
    pub description: String,
    /// Cron-style schedule forwarded verbatim to the remote provider.
    pub cron: String,
    pub time_zone: String,
    pub management: Management,
    pub status: ClockStatus,
    /// Identity the remote provider presents when calling back; falls back
    /// to the deployment-wide service account when absent.
    pub service_account: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for clock creation. `gcp_name` and `status` are derived, never
/// caller-supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClock {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cron: String,
    pub time_zone: Option<String>,
    #[serde(default = "default_management")]
    pub management: Management,
    pub service_account: Option<String>,
}

fn default_management() -> Management {
    Management::Gcp
}

/// An ordered set of steps executed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
}

/// One HTTP call with optional success-pattern validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    /// Target URL.
    pub action: String,
    pub method: HttpMethod,
    /// JSON request body; may contain `${key}` placeholders filled from the
    /// execution context.
    pub payload: Option<Value>,
    /// Regex searched against the response body; named captures feed the
    /// context of later steps.
    pub success_pattern: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStep {
    pub name: String,
    pub action: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    pub payload: Option<Value>,
    pub success_pattern: Option<String>,
}

fn default_method() -> HttpMethod {
    HttpMethod::Post
}

/// Binding of a task to a clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub id: i64,
    pub name: String,
    pub task_id: i64,
    pub clock_id: Option<i64>,
    pub enabled: bool,
}

impl TaskSchedule {
    /// Display status derived from the enabled flag and the clock's state.
    /// Advisory only — `tick` runs schedules regardless.
    pub fn status(&self, clock: Option<&Clock>) -> String {
        if !self.enabled {
            return "disabled".to_string();
        }
        match clock {
            None => "unscheduled".to_string(),
            Some(c) if c.status == ClockStatus::Running => "active".to_string(),
            Some(c) => format!("clock {}", c.status),
        }
    }
}

/// Append-only record of one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: i64,
    pub task_id: i64,
    pub status: ExecutionStatus,
    pub queued_time: Option<String>,
    pub start_time: Option<String>,
    pub finish_time: Option<String>,
    pub results: Option<Value>,
}

/// Role attached to a local account. Timekeepers can do everything an
/// executor can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Timekeeper,
    Executor,
}

impl AccountRole {
    pub fn is_timekeeper(self) -> bool {
        matches!(self, AccountRole::Timekeeper)
    }

    pub fn can_execute(self) -> bool {
        true
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountRole::Timekeeper => "timekeeper",
            AccountRole::Executor => "executor",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timekeeper" => Ok(AccountRole::Timekeeper),
            "executor" => Ok(AccountRole::Executor),
            other => Err(format!("unknown account role: {other}")),
        }
    }
}

/// Identity accepted by the OpenID verification contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub role: AccountRole,
}

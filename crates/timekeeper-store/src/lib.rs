//! `timekeeper-store` — SQLite persistence for the orchestration model.
//!
//! # Tables
//!
//! | Table             | Contents                                        |
//! |-------------------|-------------------------------------------------|
//! | `clocks`          | Local mirror of a remote cron job               |
//! | `tasks` / `steps` | A task and its ordered HTTP steps               |
//! | `task_schedules`  | Binding of a task to a clock                    |
//! | `task_executions` | Append-only history of task runs                |
//! | `accounts`        | Identities accepted by the OpenID auth contract |
//!
//! Writes here are plain field writes. Nothing in this crate talks to the
//! remote scheduler: reconciliation is an explicit engine-level operation,
//! so a store update can never recurse into a remote RPC.

pub mod accounts;
pub mod clocks;
pub mod db;
pub mod error;
pub mod executions;
pub mod handle;
pub mod schedules;
pub mod tasks;
pub mod types;

pub use error::{Result, StoreError};
pub use handle::Store;
pub use types::{
    Account, AccountRole, Clock, NewClock, NewStep, Step, Task, TaskExecution, TaskSchedule,
};

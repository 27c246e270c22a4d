//! `timekeeper-engine` — the orchestration core.
//!
//! # Overview
//!
//! | Component          | Responsibility                                        |
//! |--------------------|-------------------------------------------------------|
//! | [`ClockReconciler`]| Keep a clock's local status truthful vs. the remote job |
//! | [`StepRunner`]     | Execute one HTTP step and classify the outcome        |
//! | [`TaskEngine`]     | Run a task's steps in order, record one execution     |
//! | [`ScheduleRunner`] | Fan a clock tick out to its schedules                 |
//!
//! The reconciler and runner are built on trait objects
//! (`SchedulerApi` / `QueueApi` / `StepRunner`) so tests drive them with
//! scripted fakes instead of live remote services.

pub mod error;
pub mod reconciler;
pub mod runner;
pub mod step;
pub mod task;

pub use error::{EngineError, Result};
pub use reconciler::{ClockOutcome, ClockReconciler};
pub use runner::ScheduleRunner;
pub use step::{Context, HttpStepExecutor, StepRecord, StepRunner};
pub use task::TaskEngine;

//! Clock ↔ remote-job reconciliation.
//!
//! The local `status` column is a claim about remote state, so every
//! operation here follows the same shape: talk to the remote scheduler
//! first, then record what was learned. Status writes go through the
//! store's field-only API — persistence never triggers another
//! reconciliation, which is what made the original save-hook design loop.
//!
//! Status machine: `running ⇄ paused` via start/pause; any unexpected
//! remote failure lands in `broken`; `start` is the only way out of
//! `broken` (it recreates the job if the provider lost it). `unknown` is
//! pinned to manually managed clocks and unreachable otherwise.

use std::sync::Arc;

use tracing::{info, warn};

use timekeeper_core::types::{ClockStatus, Management};
use timekeeper_remote::{update_mask, JobSpec, RemoteConfig, RemoteError, SchedulerApi};
use timekeeper_store::{Clock, NewClock, Store};

use crate::error::{EngineError, Result};

/// What a reconciliation attempt concluded, in operator-facing terms.
/// Remote failures are data here, not errors — only clock deletion
/// escalates, because proceeding would orphan the remote job.
#[derive(Debug, Clone)]
pub struct ClockOutcome {
    pub success: bool,
    pub message: String,
}

impl ClockOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

pub struct ClockReconciler {
    store: Store,
    scheduler: Arc<dyn SchedulerApi>,
    config: RemoteConfig,
}

impl ClockReconciler {
    pub fn new(store: Store, scheduler: Arc<dyn SchedulerApi>, config: RemoteConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Desired remote job derived from the clock's current fields.
    fn job_spec(&self, clock: &Clock) -> JobSpec {
        JobSpec {
            name: clock.gcp_name.clone(),
            description: clock.description.clone(),
            schedule: clock.cron.clone(),
            time_zone: clock.time_zone.clone(),
            target_url: self.config.tick_url(clock.id),
            service_account: clock
                .service_account
                .clone()
                .unwrap_or_else(|| self.config.service_account.clone()),
        }
    }

    fn set_status(&self, clock: &Clock, status: ClockStatus) -> Result<()> {
        self.store.set_clock_status(clock.id, status)?;
        Ok(())
    }

    fn manual_noop(clock: &Clock) -> Option<ClockOutcome> {
        if clock.management == Management::Manual {
            Some(ClockOutcome::ok(format!(
                "Clock {} is manually managed; nothing to do.",
                clock.name
            )))
        } else {
            None
        }
    }

    /// Ensure the remote job exists and is running.
    ///
    /// A missing job is recreated from the clock's fields; a permission
    /// failure is reported without touching the stored status (the claim we
    /// hold may still be right); anything else unexpected marks the clock
    /// broken.
    pub async fn start(&self, clock: &Clock) -> Result<ClockOutcome> {
        if let Some(outcome) = Self::manual_noop(clock) {
            return Ok(outcome);
        }
        match self.scheduler.get_job(&clock.gcp_name).await {
            Ok(_) => match self.scheduler.resume_job(&clock.gcp_name).await {
                Ok(()) => {
                    self.set_status(clock, ClockStatus::Running)?;
                    info!(clock = %clock.name, "clock resumed");
                    Ok(ClockOutcome::ok(format!("Clock {} is running.", clock.name)))
                }
                Err(e) => {
                    self.set_status(clock, ClockStatus::Broken)?;
                    Ok(ClockOutcome::failed(format!(
                        "Could not resume the remote job: {e}"
                    )))
                }
            },
            Err(RemoteError::NotFound(_)) => {
                match self.scheduler.create_job(&self.job_spec(clock)).await {
                    Ok(_) => {
                        self.set_status(clock, ClockStatus::Running)?;
                        info!(clock = %clock.name, job = %clock.gcp_name, "remote job created");
                        Ok(ClockOutcome::ok(format!(
                            "Clock {} was created and is running.",
                            clock.name
                        )))
                    }
                    Err(e) => {
                        self.set_status(clock, ClockStatus::Broken)?;
                        Ok(ClockOutcome::failed(format!(
                            "Could not create the remote job: {e}"
                        )))
                    }
                }
            }
            Err(e @ RemoteError::PermissionDenied(_)) => Ok(ClockOutcome::failed(format!(
                "Could not retrieve the remote job: {e}"
            ))),
            Err(e) => {
                self.set_status(clock, ClockStatus::Broken)?;
                Ok(ClockOutcome::failed(format!(
                    "Could not retrieve the remote job: {e}"
                )))
            }
        }
    }

    /// Pause the remote job. A job the provider no longer knows about means
    /// local and remote state have diverged — that is `broken`, not paused.
    pub async fn pause(&self, clock: &Clock) -> Result<ClockOutcome> {
        if let Some(outcome) = Self::manual_noop(clock) {
            return Ok(outcome);
        }
        match self.scheduler.get_job(&clock.gcp_name).await {
            Ok(_) => match self.scheduler.pause_job(&clock.gcp_name).await {
                Ok(()) => {
                    self.set_status(clock, ClockStatus::Paused)?;
                    info!(clock = %clock.name, "clock paused");
                    Ok(ClockOutcome::ok(format!("Clock {} is paused.", clock.name)))
                }
                Err(e) => Ok(ClockOutcome::failed(format!(
                    "Could not pause the remote job: {e}"
                ))),
            },
            Err(e) => {
                self.set_status(clock, ClockStatus::Broken)?;
                Ok(ClockOutcome::failed(format!(
                    "Could not retrieve the remote job: {e}"
                )))
            }
        }
    }

    /// Push local field changes to the remote job.
    ///
    /// Only the fields that differ are submitted; `forced_fields` are
    /// submitted regardless, which lets `sync` repair a stale callback URL
    /// the value diff cannot detect as ours.
    pub async fn update(&self, clock: &Clock, forced_fields: &[&str]) -> Result<ClockOutcome> {
        if let Some(outcome) = Self::manual_noop(clock) {
            return Ok(outcome);
        }
        let existing = match self.scheduler.get_job(&clock.gcp_name).await {
            Ok(job) => job,
            Err(e) => {
                return Ok(ClockOutcome::failed(format!(
                    "Could not retrieve the remote job: {e}"
                )))
            }
        };
        let spec = self.job_spec(clock);
        let mask = update_mask(&existing, &spec, forced_fields);
        if mask.is_empty() {
            return Ok(ClockOutcome::ok(format!(
                "Clock {} is already in sync.",
                clock.name
            )));
        }
        match self.scheduler.update_job(&spec, &mask).await {
            Ok(_) => {
                info!(clock = %clock.name, fields = %mask.join(","), "remote job updated");
                Ok(ClockOutcome::ok(format!("Clock {} was updated.", clock.name)))
            }
            Err(e) => {
                self.set_status(clock, ClockStatus::Broken)?;
                Ok(ClockOutcome::failed(format!(
                    "Could not update the remote job: {e}"
                )))
            }
        }
    }

    /// Delete the remote job ahead of local deletion. "Not found" counts as
    /// already deleted; no local status is written on success since the row
    /// is about to go away.
    pub async fn delete(&self, clock: &Clock) -> Result<ClockOutcome> {
        if let Some(outcome) = Self::manual_noop(clock) {
            return Ok(outcome);
        }
        match self.scheduler.get_job(&clock.gcp_name).await {
            Err(RemoteError::NotFound(_)) => {
                return Ok(ClockOutcome::ok(format!(
                    "Remote job for clock {} was already gone.",
                    clock.name
                )))
            }
            Err(e) => {
                return Ok(ClockOutcome::failed(format!(
                    "Could not retrieve the remote job: {e}"
                )))
            }
            Ok(_) => {}
        }
        match self.scheduler.delete_job(&clock.gcp_name).await {
            Ok(()) => Ok(ClockOutcome::ok(format!(
                "Remote job for clock {} was deleted.",
                clock.name
            ))),
            Err(e) => {
                self.set_status(clock, ClockStatus::Broken)?;
                Ok(ClockOutcome::failed(format!(
                    "Could not delete the remote job: {e}"
                )))
            }
        }
    }

    /// Force the clock back under remote management and repair drift:
    /// start (recreating the job if needed), then update with the HTTP
    /// target forced into the mask so a stale callback URL is rewritten.
    pub async fn sync(&self, clock: &Clock) -> Result<ClockOutcome> {
        if clock.management == Management::Manual {
            self.store
                .set_clock_management(clock.id, Management::Gcp)?;
        }
        let clock = self.reload(clock.id)?;

        let started = self.start(&clock).await?;
        if !started.success {
            return Ok(ClockOutcome::failed(format!(
                "Could not sync clock: {}",
                started.message
            )));
        }
        let updated = self.update(&clock, &["http_target"]).await?;
        if !updated.success {
            return Ok(ClockOutcome::failed(format!(
                "Could not sync clock: {}",
                updated.message
            )));
        }
        Ok(ClockOutcome::ok(format!(
            "Clock {} is synced and running.",
            clock.name
        )))
    }

    // ── Persistence entry points ──────────────────────────────────────────────
    // These are what the gateway calls: the write and the reconciliation are
    // one explicit operation each, replacing implicit save hooks.

    /// Insert a clock and bring its remote job up. The clock row exists even
    /// when the first `start` fails — it just stays `broken` until an
    /// operator fixes it.
    pub async fn create_and_reconcile(&self, new: &NewClock) -> Result<(Clock, ClockOutcome)> {
        let clock = self.store.create_clock(new)?;
        let outcome = self.start(&clock).await?;
        if !outcome.success {
            warn!(clock = %clock.name, message = %outcome.message, "initial reconciliation failed");
        }
        Ok((self.reload(clock.id)?, outcome))
    }

    /// Persist edited fields, then push them to the remote job. The update
    /// result is reported but does not fail the edit — a broken remote job
    /// self-heals on the next successful update or `start`.
    pub async fn persist_and_reconcile(&self, clock: &Clock) -> Result<(Clock, ClockOutcome)> {
        self.store.update_clock_fields(clock)?;
        let clock = self.reload(clock.id)?;
        let outcome = self.update(&clock, &[]).await?;
        if !outcome.success {
            warn!(clock = %clock.name, message = %outcome.message, "post-edit reconciliation failed");
        }
        Ok((self.reload(clock.id)?, outcome))
    }

    /// Delete remote job then local row, in that order. A remote failure
    /// aborts the whole deletion so local and remote state never silently
    /// diverge.
    pub async fn delete_clock(&self, clock: &Clock) -> Result<ClockOutcome> {
        let outcome = self.delete(clock).await?;
        if !outcome.success {
            return Err(EngineError::DeleteBlocked(outcome.message));
        }
        self.store.delete_clock_row(clock.id)?;
        info!(clock = %clock.name, "clock deleted");
        Ok(ClockOutcome::ok(format!("Clock {} was deleted.", clock.name)))
    }

    fn reload(&self, id: i64) -> Result<Clock> {
        self.store
            .get_clock(id)?
            .ok_or(EngineError::NotFound {
                kind: "clock",
                id: id.to_string(),
            })
    }
}

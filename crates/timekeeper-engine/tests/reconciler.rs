//! Reconciler behaviour against a scripted in-memory scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use timekeeper_core::types::{ClockStatus, Management};
use timekeeper_engine::{ClockReconciler, EngineError};
use timekeeper_remote::scheduler::{HttpTarget, OidcToken};
use timekeeper_remote::{JobSpec, RemoteConfig, RemoteError, RemoteJob, SchedulerApi};
use timekeeper_store::{Clock, NewClock, Store};

#[derive(Clone, Copy)]
enum Fail {
    NotFound,
    Permission,
    Server,
}

impl Fail {
    fn error(self) -> RemoteError {
        match self {
            Fail::NotFound => RemoteError::NotFound("no such job".into()),
            Fail::Permission => RemoteError::PermissionDenied("iam says no".into()),
            Fail::Server => RemoteError::Denied {
                status: 500,
                message: "backend unavailable".into(),
            },
        }
    }
}

/// Scheduler fake: jobs live in a map, and each RPC can be told to fail.
#[derive(Default)]
struct MockScheduler {
    jobs: Mutex<HashMap<String, RemoteJob>>,
    get_fail: Mutex<Option<Fail>>,
    resume_fail: Mutex<bool>,
    pause_fail: Mutex<bool>,
    delete_fail: Mutex<bool>,
    create_calls: AtomicUsize,
    contacts: AtomicUsize,
}

impl MockScheduler {
    fn job_from_spec(spec: &JobSpec) -> RemoteJob {
        RemoteJob {
            name: spec.name.clone(),
            description: spec.description.clone(),
            schedule: spec.schedule.clone(),
            time_zone: spec.time_zone.clone(),
            http_target: Some(HttpTarget {
                uri: spec.target_url.clone(),
                oidc_token: Some(OidcToken {
                    service_account_email: spec.service_account.clone(),
                }),
            }),
            state: Some("ENABLED".into()),
        }
    }

    fn fail_get_with(&self, fail: Fail) {
        *self.get_fail.lock().unwrap() = Some(fail);
    }

    fn contacts(&self) -> usize {
        self.contacts.load(Ordering::SeqCst)
    }

    fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulerApi for MockScheduler {
    async fn get_job(&self, name: &str) -> Result<RemoteJob, RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        if let Some(fail) = *self.get_fail.lock().unwrap() {
            return Err(fail.error());
        }
        self.jobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Fail::NotFound.error())
    }

    async fn create_job(&self, spec: &JobSpec) -> Result<RemoteJob, RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let job = Self::job_from_spec(spec);
        self.jobs
            .lock()
            .unwrap()
            .insert(spec.name.clone(), job.clone());
        Ok(job)
    }

    async fn update_job(
        &self,
        spec: &JobSpec,
        _field_paths: &[&str],
    ) -> Result<RemoteJob, RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        let job = Self::job_from_spec(spec);
        self.jobs
            .lock()
            .unwrap()
            .insert(spec.name.clone(), job.clone());
        Ok(job)
    }

    async fn pause_job(&self, name: &str) -> Result<(), RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        if *self.pause_fail.lock().unwrap() {
            return Err(Fail::Server.error());
        }
        if !self.jobs.lock().unwrap().contains_key(name) {
            return Err(Fail::NotFound.error());
        }
        Ok(())
    }

    async fn resume_job(&self, name: &str) -> Result<(), RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        if *self.resume_fail.lock().unwrap() {
            return Err(Fail::Server.error());
        }
        if !self.jobs.lock().unwrap().contains_key(name) {
            return Err(Fail::NotFound.error());
        }
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<(), RemoteError> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        if *self.delete_fail.lock().unwrap() {
            return Err(Fail::Server.error());
        }
        self.jobs
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Fail::NotFound.error())
    }
}

fn config() -> RemoteConfig {
    RemoteConfig {
        project_id: "acme".into(),
        region: "us-central1".into(),
        root_url: "https://acme.appspot.com".into(),
        service_account: "acme@appspot.gserviceaccount.com".into(),
        queue: None,
        time_zone: "UTC".into(),
    }
}

fn fixture(management: Management) -> (Store, Arc<MockScheduler>, ClockReconciler, Clock) {
    let store = Store::in_memory().unwrap();
    let scheduler = Arc::new(MockScheduler::default());
    let reconciler = ClockReconciler::new(store.clone(), scheduler.clone(), config());
    let clock = store
        .create_clock(&NewClock {
            name: "Nightly Reports".into(),
            description: "runs the reporting task".into(),
            cron: "0 3 * * *".into(),
            time_zone: None,
            management,
            service_account: None,
        })
        .unwrap();
    (store, scheduler, reconciler, clock)
}

fn reload(store: &Store, id: i64) -> Clock {
    store.get_clock(id).unwrap().unwrap()
}

#[tokio::test]
async fn start_creates_a_missing_job_and_marks_running() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    assert_eq!(clock.status, ClockStatus::Broken);

    let outcome = reconciler.start(&clock).await.unwrap();
    assert!(outcome.success);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Running);
    assert_eq!(scheduler.create_calls(), 1);

    let job = scheduler.get_job(&clock.gcp_name).await.unwrap();
    assert_eq!(
        job.http_target.unwrap().uri,
        "https://acme.appspot.com/api/clocks/1/tick/"
    );
}

#[tokio::test]
async fn pause_and_resume_round_trip_without_recreating() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    let paused = reconciler.pause(&clock).await.unwrap();
    assert!(paused.success);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Paused);

    let resumed = reconciler.start(&clock).await.unwrap();
    assert!(resumed.success);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Running);
    assert_eq!(scheduler.create_calls(), 1);
}

#[tokio::test]
async fn permission_failure_reports_but_keeps_the_status_claim() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    scheduler.fail_get_with(Fail::Permission);
    let outcome = reconciler.start(&clock).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Running);
}

#[tokio::test]
async fn unexpected_failure_marks_the_clock_broken() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    scheduler.fail_get_with(Fail::Server);
    let outcome = reconciler.pause(&clock).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Broken);
}

#[tokio::test]
async fn manual_clocks_never_contact_the_remote() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Manual);
    assert_eq!(clock.status, ClockStatus::Unknown);

    assert!(reconciler.start(&clock).await.unwrap().success);
    assert!(reconciler.pause(&clock).await.unwrap().success);
    assert!(reconciler.update(&clock, &[]).await.unwrap().success);
    assert!(reconciler.delete(&clock).await.unwrap().success);

    assert_eq!(scheduler.contacts(), 0);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Unknown);
}

#[tokio::test]
async fn sync_adopts_a_manual_clock_and_is_idempotent() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Manual);

    let first = reconciler.sync(&clock).await.unwrap();
    assert!(first.success, "{}", first.message);
    let adopted = reload(&store, clock.id);
    assert_eq!(adopted.management, Management::Gcp);
    assert_eq!(adopted.status, ClockStatus::Running);

    let second = reconciler.sync(&adopted).await.unwrap();
    assert!(second.success);
    assert_eq!(scheduler.create_calls(), 1);
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Running);
}

#[tokio::test]
async fn deleting_a_clock_removes_the_remote_job_and_the_row() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    let outcome = reconciler.delete_clock(&clock).await.unwrap();
    assert!(outcome.success);
    assert!(store.get_clock(clock.id).unwrap().is_none());
    assert!(scheduler.get_job(&clock.gcp_name).await.is_err());
}

#[tokio::test]
async fn delete_succeeds_when_the_remote_job_is_already_gone() {
    let (store, _scheduler, reconciler, clock) = fixture(Management::Gcp);

    let outcome = reconciler.delete_clock(&clock).await.unwrap();
    assert!(outcome.success);
    assert!(store.get_clock(clock.id).unwrap().is_none());
}

#[tokio::test]
async fn delete_is_blocked_when_the_remote_job_cannot_be_removed() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    *scheduler.delete_fail.lock().unwrap() = true;
    let err = reconciler.delete_clock(&clock).await.unwrap_err();
    assert!(matches!(err, EngineError::DeleteBlocked(_)));
    assert!(store.get_clock(clock.id).unwrap().is_some());
    assert_eq!(reload(&store, clock.id).status, ClockStatus::Broken);
}

#[tokio::test]
async fn edits_flow_to_the_remote_job() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();

    let mut edited = reload(&store, clock.id);
    edited.cron = "30 4 * * *".into();
    let (saved, outcome) = reconciler.persist_and_reconcile(&edited).await.unwrap();
    assert!(outcome.success);
    assert_eq!(saved.cron, "30 4 * * *");

    let job = scheduler.get_job(&clock.gcp_name).await.unwrap();
    assert_eq!(job.schedule, "30 4 * * *");
}

#[tokio::test]
async fn renaming_keeps_the_remote_job_identity() {
    let (store, scheduler, reconciler, clock) = fixture(Management::Gcp);
    reconciler.start(&clock).await.unwrap();
    let original_gcp_name = clock.gcp_name.clone();

    let mut edited = reload(&store, clock.id);
    edited.name = "Nightly Reports v2".into();
    let (saved, _) = reconciler.persist_and_reconcile(&edited).await.unwrap();
    assert_eq!(saved.gcp_name, original_gcp_name);
    assert!(scheduler.get_job(&original_gcp_name).await.is_ok());
}

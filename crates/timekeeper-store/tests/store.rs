// CRUD and referential behavior over an in-memory database.

use timekeeper_core::types::{ClockStatus, ExecutionStatus, HttpMethod, Management};
use timekeeper_store::{NewClock, NewStep, Store, StoreError};

fn new_clock(name: &str, management: Management) -> NewClock {
    NewClock {
        name: name.to_string(),
        description: "test clock".to_string(),
        cron: "0 3 * * *".to_string(),
        time_zone: None,
        management,
        service_account: None,
    }
}

#[test]
fn clock_gcp_name_is_frozen_across_renames() {
    let store = Store::in_memory().unwrap();
    let mut clock = store
        .create_clock(&new_clock("Every Day", Management::Gcp))
        .unwrap();
    assert_eq!(clock.gcp_name, "Every-Day");

    clock.name = "Every Single Day".to_string();
    store.update_clock_fields(&clock).unwrap();

    let reloaded = store.get_clock(clock.id).unwrap().unwrap();
    assert_eq!(reloaded.name, "Every Single Day");
    assert_eq!(reloaded.gcp_name, "Every-Day");
}

#[test]
fn manual_clock_status_is_pinned_to_unknown() {
    let store = Store::in_memory().unwrap();
    let mut clock = store
        .create_clock(&new_clock("Manual", Management::Manual))
        .unwrap();
    assert_eq!(clock.status, ClockStatus::Unknown);

    // A field write cannot smuggle in a different status.
    clock.status = ClockStatus::Running;
    store.update_clock_fields(&clock).unwrap();
    let reloaded = store.get_clock(clock.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ClockStatus::Unknown);
}

#[test]
fn gcp_clock_starts_broken_until_reconciled() {
    let store = Store::in_memory().unwrap();
    let clock = store
        .create_clock(&new_clock("Managed", Management::Gcp))
        .unwrap();
    assert_eq!(clock.status, ClockStatus::Broken);

    store
        .set_clock_status(clock.id, ClockStatus::Running)
        .unwrap();
    let reloaded = store.get_clock(clock.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ClockStatus::Running);
}

#[test]
fn deleting_a_clock_unlinks_its_schedules() {
    let store = Store::in_memory().unwrap();
    let clock = store
        .create_clock(&new_clock("Nightly", Management::Gcp))
        .unwrap();
    let task = store.create_task("Backups").unwrap();
    let schedule = store
        .create_schedule("nightly-backups", task.id, Some(clock.id), true)
        .unwrap();

    store.delete_clock_row(clock.id).unwrap();

    let reloaded = store.get_schedule(schedule.id).unwrap().unwrap();
    assert_eq!(reloaded.clock_id, None);
    assert_eq!(reloaded.status(None), "unscheduled");
}

#[test]
fn task_delete_is_protected_by_steps_and_schedules() {
    let store = Store::in_memory().unwrap();
    let task = store.create_task("Reports").unwrap();
    store
        .create_step(
            task.id,
            &NewStep {
                name: "generate".to_string(),
                action: "https://example.com/generate".to_string(),
                method: HttpMethod::Post,
                payload: None,
                success_pattern: None,
            },
        )
        .unwrap();

    // Steps block a plain delete, cascade removes them.
    assert!(matches!(
        store.delete_task(task.id, false),
        Err(StoreError::ProtectedDelete(_))
    ));

    let schedule = store
        .create_schedule("weekly-reports", task.id, None, true)
        .unwrap();
    // Schedules block even a cascade.
    assert!(matches!(
        store.delete_task(task.id, true),
        Err(StoreError::ProtectedDelete(_))
    ));

    store.delete_schedule(schedule.id).unwrap();
    store.delete_task(task.id, true).unwrap();
    assert!(store.get_task(task.id).unwrap().is_none());
}

#[test]
fn step_names_are_unique_per_task_not_globally() {
    let store = Store::in_memory().unwrap();
    let t1 = store.create_task("T1").unwrap();
    let t2 = store.create_task("T2").unwrap();
    let step = NewStep {
        name: "ping".to_string(),
        action: "https://example.com/ping".to_string(),
        method: HttpMethod::Get,
        payload: None,
        success_pattern: None,
    };
    store.create_step(t1.id, &step).unwrap();
    store.create_step(t2.id, &step).unwrap();
    assert!(matches!(
        store.create_step(t1.id, &step),
        Err(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn steps_list_in_creation_order() {
    let store = Store::in_memory().unwrap();
    let task = store.create_task("Ordered").unwrap();
    for name in ["first", "second", "third"] {
        store
            .create_step(
                task.id,
                &NewStep {
                    name: name.to_string(),
                    action: format!("https://example.com/{name}"),
                    method: HttpMethod::Post,
                    payload: None,
                    success_pattern: None,
                },
            )
            .unwrap();
    }
    let names: Vec<String> = store
        .list_steps(task.id)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[test]
fn execution_timestamps_are_set_exactly_once() {
    let store = Store::in_memory().unwrap();
    let task = store.create_task("Timed").unwrap();
    let pending = store
        .create_execution(task.id, ExecutionStatus::Pending)
        .unwrap();
    assert!(pending.queued_time.is_some());
    assert!(pending.start_time.is_none());

    let started = store.mark_execution_started(pending.id).unwrap();
    let first_start = started.start_time.clone().unwrap();

    // A second start transition keeps the original stamp.
    let restarted = store.mark_execution_started(pending.id).unwrap();
    assert_eq!(restarted.start_time.unwrap(), first_start);

    let results = serde_json::json!({"steps_total": 0});
    let finished = store
        .finalize_execution(pending.id, ExecutionStatus::Success, &results)
        .unwrap();
    let first_finish = finished.finish_time.clone().unwrap();

    let refinished = store
        .finalize_execution(pending.id, ExecutionStatus::Success, &results)
        .unwrap();
    assert_eq!(refinished.finish_time.unwrap(), first_finish);
    assert_eq!(refinished.status, ExecutionStatus::Success);
    assert_eq!(refinished.results.unwrap()["steps_total"], 0);
}

#[test]
fn account_lookup_is_case_insensitive() {
    let store = Store::in_memory().unwrap();
    store
        .create_account(
            "scheduler@acme.iam.gserviceaccount.com",
            timekeeper_store::AccountRole::Timekeeper,
        )
        .unwrap();
    let found = store
        .find_account_by_email("Scheduler@ACME.iam.gserviceaccount.com")
        .unwrap()
        .unwrap();
    assert!(found.role.is_timekeeper());
    assert!(store
        .find_account_by_email("nobody@example.com")
        .unwrap()
        .is_none());
}

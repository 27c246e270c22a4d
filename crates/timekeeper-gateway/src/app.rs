use axum::{
    routing::{delete, get},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;

use timekeeper_core::config::TimekeeperConfig;
use timekeeper_engine::{ClockReconciler, ScheduleRunner, TaskEngine};
use timekeeper_remote::QueueApi;
use timekeeper_store::Store;

use crate::auth::Verifier;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: TimekeeperConfig,
    pub store: Store,
    pub reconciler: ClockReconciler,
    pub engine: Arc<TaskEngine>,
    pub runner: ScheduleRunner,
    /// Direct queue handle for the inspection endpoints; the runner holds
    /// its own clone for dispatch.
    pub queue: Option<Arc<dyn QueueApi>>,
    pub auth: Verifier,
    /// One async mutex per clock id. Reconciliation is a remote RPC followed
    /// by a status write; concurrent actions on the same clock must not
    /// interleave between the two.
    clock_locks: tokio::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        config: TimekeeperConfig,
        store: Store,
        reconciler: ClockReconciler,
        engine: Arc<TaskEngine>,
        runner: ScheduleRunner,
        queue: Option<Arc<dyn QueueApi>>,
        auth: Verifier,
    ) -> Self {
        Self {
            config,
            store,
            reconciler,
            engine,
            runner,
            queue,
            auth,
            clock_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Lock handle for one clock. Entries are created on demand and live for
    /// the process lifetime; the set of clocks is small.
    pub async fn clock_lock(&self, clock_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.clock_locks.lock().await;
        locks
            .entry(clock_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/api/test-auth/",
            get(crate::http::health::test_auth).post(crate::http::health::test_auth),
        )
        .route(
            "/api/clocks/",
            get(crate::http::clocks::list_clocks).post(crate::http::clocks::create_clock),
        )
        .route(
            "/api/clocks/{id}/",
            get(crate::http::clocks::get_clock)
                .put(crate::http::clocks::update_clock)
                .delete(crate::http::clocks::delete_clock),
        )
        .route(
            "/api/clocks/{id}/tick/",
            get(crate::http::clocks::tick).post(crate::http::clocks::tick),
        )
        .route(
            "/api/clocks/{id}/{action}/",
            get(crate::http::clocks::clock_action).post(crate::http::clocks::clock_action),
        )
        .route(
            "/api/tasks/",
            get(crate::http::tasks::list_tasks).post(crate::http::tasks::create_task),
        )
        .route(
            "/api/tasks/{id}/",
            get(crate::http::tasks::get_task).delete(crate::http::tasks::delete_task),
        )
        .route(
            "/api/tasks/{id}/steps/",
            get(crate::http::tasks::list_steps).post(crate::http::tasks::create_step),
        )
        .route(
            "/api/steps/{id}/",
            get(crate::http::tasks::get_step).delete(crate::http::tasks::delete_step),
        )
        .route(
            "/api/tasks/{id}/execute/",
            get(crate::http::tasks::execute_task).post(crate::http::tasks::execute_task),
        )
        .route(
            "/api/task_schedules/",
            get(crate::http::schedules::list_schedules)
                .post(crate::http::schedules::create_schedule),
        )
        .route(
            "/api/task_schedules/{id}/",
            get(crate::http::schedules::get_schedule)
                .put(crate::http::schedules::update_schedule)
                .delete(crate::http::schedules::delete_schedule),
        )
        .route(
            "/api/task_schedules/{id}/run/",
            get(crate::http::schedules::run_schedule).post(crate::http::schedules::run_schedule),
        )
        .route(
            "/api/task_executions/",
            get(crate::http::executions::list_executions),
        )
        .route(
            "/api/task_executions/{id}/",
            get(crate::http::executions::get_execution),
        )
        .route(
            "/api/accounts/",
            get(crate::http::accounts::list_accounts).post(crate::http::accounts::create_account),
        )
        .route(
            "/api/accounts/{id}/",
            delete(crate::http::accounts::delete_account),
        )
        .route("/api/queue/", get(crate::http::queue::list_queue))
        .route("/api/queue/{name}/", delete(crate::http::queue::delete_queued))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}

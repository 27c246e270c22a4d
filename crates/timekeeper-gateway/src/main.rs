use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use timekeeper_engine::{ClockReconciler, HttpStepExecutor, ScheduleRunner, TaskEngine};
use timekeeper_remote::{
    HttpQueueClient, HttpSchedulerClient, QueueApi, RemoteConfig, RemoteError,
    ServiceAccountTokens, TokenProvider,
};
use timekeeper_store::Store;

mod app;
mod auth;
mod http;

#[derive(Parser)]
#[command(name = "timekeeper-gateway", version, about = "Task orchestration gateway")]
struct Args {
    /// Config file path (default: ~/.timekeeper/timekeeper.toml)
    #[arg(long)]
    config: Option<String>,
    /// Override the bind address from the config.
    #[arg(long)]
    bind: Option<String>,
    /// Override the port from the config.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timekeeper_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    // load config: --config > TIMEKEEPER_CONFIG env > ~/.timekeeper/timekeeper.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("TIMEKEEPER_CONFIG").ok());
    let mut config = timekeeper_core::config::TimekeeperConfig::load(config_path.as_deref())?;
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = Store::open(&db_path, &config.remote.time_zone)?;

    let remote = RemoteConfig::from_settings(&config.remote);
    info!(
        project = %remote.project_id,
        region = %remote.region,
        root_url = %remote.root_url,
        deferred = remote.queue.is_some(),
        "remote provider configured"
    );

    // Outbound tokens come from a service-account key file. Without one the
    // gateway still serves: manual clocks and the read surface keep working,
    // managed clocks just fail reconciliation until a key is configured.
    let tokens: Arc<dyn TokenProvider> = match &config.remote.key_file {
        Some(path) => Arc::new(ServiceAccountTokens::from_file(path)?),
        None => {
            warn!("no remote.key_file configured; remote calls will be rejected");
            Arc::new(NoKeyTokens)
        }
    };

    let scheduler = Arc::new(HttpSchedulerClient::new(remote.clone(), tokens.clone()));
    let queue: Option<Arc<dyn QueueApi>> = remote
        .queue
        .as_ref()
        .map(|_| Arc::new(HttpQueueClient::new(remote.clone(), tokens.clone())) as _);

    let reconciler = ClockReconciler::new(store.clone(), scheduler, remote.clone());
    let engine = Arc::new(TaskEngine::new(
        store.clone(),
        Arc::new(HttpStepExecutor::new(tokens)),
    ));
    let runner = ScheduleRunner::new(store.clone(), engine.clone(), queue.clone(), remote);
    let verifier = auth::Verifier::new(config.auth.clone(), store.clone());

    let state = Arc::new(app::AppState::new(
        config.clone(),
        store,
        reconciler,
        engine,
        runner,
        queue,
        verifier,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("Timekeeper gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Placeholder provider when no key file is configured.
struct NoKeyTokens;

#[async_trait::async_trait]
impl TokenProvider for NoKeyTokens {
    async fn access_token(&self) -> Result<String, RemoteError> {
        Err(RemoteError::Token(
            "no service-account key configured; set remote.key_file in timekeeper.toml".into(),
        ))
    }

    async fn identity_token(&self, _audience: &str) -> Result<String, RemoteError> {
        Err(RemoteError::Token(
            "no service-account key configured; set remote.key_file in timekeeper.toml".into(),
        ))
    }
}

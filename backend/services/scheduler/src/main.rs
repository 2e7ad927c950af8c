use std::sync::Arc;

use rollup_config::{init_tracing, AppConfig, SchedulerConfig};
use rollup_db::document::pg_repository::PgDocumentStore;
use rollup_db::transform::document_repository::DocumentTransformRepository;
use rollup_engine::{ExecutionCoordinator, PgProjectionExecutor, Scheduler, TickPolicy};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    let scheduler_config = SchedulerConfig::from_env().expect("failed to load scheduler config");
    tracing::info!(
        service = "rollup-scheduler",
        primary_term = config.primary_term,
        poll_interval_secs = scheduler_config.poll_interval.as_secs(),
        max_attempts = scheduler_config.max_attempts,
        "starting"
    );

    let pool = rollup_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let store = PgDocumentStore::new(pool.clone(), config.primary_term);
    store
        .ensure_schema()
        .await
        .expect("failed to prepare document schema");

    let executor = PgProjectionExecutor::new(pool);
    executor
        .ensure_schema()
        .await
        .expect("failed to prepare index schema");

    let coordinator = Arc::new(ExecutionCoordinator::new(
        DocumentTransformRepository::new(store),
        executor,
        TickPolicy::from(&scheduler_config),
    ));
    let scheduler = Scheduler::new(coordinator, scheduler_config.poll_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = scheduler.run(shutdown_rx).await {
        tracing::error!(error = %e, "scheduler exited with error");
        std::process::exit(1);
    }
}

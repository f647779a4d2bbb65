//! `pcore-server`: the composition root.
//!
//! Builds every shared collaborator (`Store`, `ProviderRegistry`,
//! `WorkflowEngine`, `GraphModel`, `LogStream`, `CancellationRegistry`) once,
//! then hands the same `Arc`s to both `PlatformCore` (the HTTP surface) and
//! `ResourceReconciler` (the background tick loop), mirroring the way the
//! teacher's own server binary builds one router over one set of shared
//! services.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use pcore_common::{init_tracing, Clock, CoreConfig, SystemClock};
use pcore_core::{PlatformCore, PlatformCoreConfig};
use pcore_graph::GraphModel;
use pcore_providers::ProviderRegistry;
use pcore_reconciler::{ReconcilerConfig, ResourceReconciler};
use pcore_store::{PgStore, Store};
use pcore_workflow_engine::{CancellationRegistry, EngineConfig, ExecutorRegistry, LogStream, Scheduler, SchedulerConfig, WorkflowEngine};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Scans `providers_dir` for `<name>/provider.yaml` manifests and an
/// optional top-level `golden-paths.yaml`, loading every one it finds.
/// A provider directory that fails to load is logged and skipped rather
/// than aborting startup.
fn load_providers(providers_dir: &Path, core_version: &semver::Version, known_step_types: &[&str]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let Ok(entries) = std::fs::read_dir(providers_dir) else {
        tracing::warn!(dir = %providers_dir.display(), "providers directory not found, starting with no providers");
        return registry;
    };

    for entry in entries.flatten() {
        let manifest_path = entry.path().join("provider.yaml");
        if !manifest_path.is_file() {
            continue;
        }
        match registry.load_provider(&manifest_path, core_version, known_step_types) {
            Ok(()) => tracing::info!(path = %manifest_path.display(), "loaded provider"),
            Err(err) => tracing::error!(path = %manifest_path.display(), error = %err, "failed to load provider"),
        }
    }

    let golden_paths_path = providers_dir.join("golden-paths.yaml");
    if golden_paths_path.is_file() {
        match registry.load_golden_paths(&golden_paths_path) {
            Ok(()) => tracing::info!(path = %golden_paths_path.display(), "loaded golden paths index"),
            Err(err) => tracing::error!(path = %golden_paths_path.display(), error = %err, "failed to load golden paths index"),
        }
    }

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let config = CoreConfig::load().context("loading configuration from the environment")?;
    let core_version = semver::Version::parse(&config.core_version).context("parsing core_version as semver")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.db.connection_string())
        .await
        .context("connecting to Postgres")?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let executors = Arc::new(ExecutorRegistry::with_builtins());
    let known_step_types: Vec<&str> = executors.known_types();

    let providers_dir = std::env::var("PROVIDERS_DIR").unwrap_or_else(|_| "./providers".to_string());
    let registry = Arc::new(load_providers(Path::new(&providers_dir), &core_version, &known_step_types));

    let log_stream = Arc::new(LogStream::new(Arc::clone(&store)));
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig {
        global_concurrency: config.max_concurrent_runs,
        queue_depth: config.queue_depth,
        ..SchedulerConfig::default()
    }));
    let engine_config = EngineConfig {
        default_step_timeout: std::time::Duration::from_secs(config.step_timeout_default_secs),
        default_workflow_timeout: std::time::Duration::from_secs(config.workflow_timeout_default_secs),
        ..EngineConfig::default()
    };
    let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), Arc::clone(&executors), scheduler, Arc::clone(&log_stream), engine_config));

    let graph = Arc::new(GraphModel::new(Arc::clone(&store)));
    let cancellations = Arc::new(CancellationRegistry::new());

    let core_config = PlatformCoreConfig {
        known_step_types: known_step_types.iter().map(|s| (*s).to_string()).collect(),
        strict_properties: config.strict_properties,
    };
    let core = Arc::new(PlatformCore::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&engine),
        Arc::clone(&graph),
        log_stream,
        Arc::clone(&cancellations),
        core_config,
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reconciler_config = ReconcilerConfig { tick_interval: std::time::Duration::from_secs(config.reconciler_interval_secs), ..ReconcilerConfig::default() };
    let reconciler = ResourceReconciler::new(store, registry, engine, clock, reconciler_config, cancellations);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reconciler_task = tokio::spawn(async move { reconciler.run(shutdown_rx).await });

    let app_state = pcore_server::AppState { core };
    let app: Router = pcore_server::api_routes()
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "starting platform-core server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    shutdown_tx.send(true).ok();
    reconciler_task.await.ok();
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown signal received");
}

//! Administrative CLI over `PlatformCore`.
//!
//! Connects directly to the same Postgres-backed `Store` the server uses;
//! there is no HTTP hop. Every command goes through `PlatformCore`, never
//! the Store or engine directly, so this binary enforces the same
//! invariants (ingest validation, retry semantics, RBAC read gating) the
//! server does.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pcore_common::{init_tracing, CoreConfig};
use pcore_core::PlatformCore;
use pcore_domain::{AllowAll, AppId, CallerIdentity, StepRunId, WorkflowRunId};
use pcore_graph::GraphModel;
use pcore_providers::ProviderRegistry;
use pcore_store::{PgStore, Store};
use pcore_workflow_engine::{CancellationRegistry, EngineConfig, ExecutorRegistry, LogStream, Scheduler, SchedulerConfig, WorkflowEngine};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "pcore")]
#[command(about = "platform-core administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spec/App operations
    App {
        #[command(subcommand)]
        action: AppCommands,
    },
    /// Workflow run operations
    Run {
        #[command(subcommand)]
        action: RunCommands,
    },
}

#[derive(Subcommand)]
enum AppCommands {
    /// Ingest a Score-style Spec document
    Ingest {
        /// Path to the Spec YAML file
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch an App by id
    Get {
        #[arg(long)]
        id: AppId,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// Launch a named golden path for an App
    GoldenPath {
        #[arg(long)]
        app: AppId,
        #[arg(long)]
        path: String,
        /// JSON object of parameters, e.g. '{"size":"small"}'
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Retry a failed run
    Retry {
        #[arg(long)]
        id: WorkflowRunId,
    },
    /// Cancel a live run
    Cancel {
        #[arg(long)]
        id: WorkflowRunId,
    },
    /// Fetch a run by id
    Get {
        #[arg(long)]
        id: WorkflowRunId,
    },
    /// List a run's step runs
    Steps {
        #[arg(long)]
        id: WorkflowRunId,
    },
    /// Tail a step's log from the beginning
    Log {
        #[arg(long)]
        step: StepRunId,
    },
}

async fn build_core(config: &CoreConfig) -> Result<PlatformCore> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db.connection_string())
        .await
        .context("connecting to Postgres")?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let executors = Arc::new(ExecutorRegistry::with_builtins());
    let known_step_types: Vec<&str> = executors.known_types();

    let log_stream = Arc::new(LogStream::new(Arc::clone(&store)));
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
    let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), executors, scheduler, Arc::clone(&log_stream), EngineConfig::default()));
    let graph = Arc::new(GraphModel::new(Arc::clone(&store)));
    let registry = Arc::new(ProviderRegistry::new());
    let cancellations = Arc::new(CancellationRegistry::new());

    let core_config = pcore_core::PlatformCoreConfig {
        known_step_types: known_step_types.iter().map(|s| (*s).to_string()).collect(),
        strict_properties: config.strict_properties,
    };
    Ok(PlatformCore::new(store, registry, engine, graph, log_stream, cancellations, core_config))
}

fn caller() -> CallerIdentity {
    CallerIdentity::new(std::env::var("USER").unwrap_or_else(|_| "cli".to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = CoreConfig::load().context("loading configuration from the environment")?;
    let core = build_core(&config).await?;

    match cli.command {
        Commands::App { action } => match action {
            AppCommands::Ingest { file } => {
                let yaml = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
                let app_id = core.ingest_spec(caller(), &yaml).await?;
                println!("{app_id}");
            }
            AppCommands::Get { id } => {
                let app = core.get_app(caller(), &AllowAll, id).await?;
                println!("{}", serde_json::to_string_pretty(&app)?);
            }
        },
        Commands::Run { action } => match action {
            RunCommands::GoldenPath { app, path, params } => {
                let params: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&params).context("parsing --params as a JSON object")?;
                let run_id = core.run_golden_path(caller(), app, &path, params).await?;
                println!("{run_id}");
            }
            RunCommands::Retry { id } => {
                let new_run_id = core.retry_run(caller(), id).await?;
                println!("{new_run_id}");
            }
            RunCommands::Cancel { id } => {
                core.cancel_run(caller(), id).await?;
                println!("cancelled {id}");
            }
            RunCommands::Get { id } => {
                let run = core.get_run(caller(), &AllowAll, id).await?;
                println!("{}", serde_json::to_string_pretty(&run)?);
            }
            RunCommands::Steps { id } => {
                let steps = core.list_step_runs(caller(), &AllowAll, id).await?;
                println!("{}", serde_json::to_string_pretty(&steps)?);
            }
            RunCommands::Log { step } => {
                let (bytes, _receiver) = core.tail_log(caller(), &AllowAll, step, 0).await?;
                print!("{}", String::from_utf8_lossy(&bytes));
            }
        },
    }

    Ok(())
}

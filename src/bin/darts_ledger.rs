use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use darts_ledger::config::EngineConfig;
use darts_ledger::db;
use darts_ledger::ledger::{
    DeliveryDispatcher, IngestEngine, MatchReportQuery, ReprocessDriver, SeaOrmWebhookCallLog,
    SharedCallLog,
};

const LOG_TARGET: &str = "bin::darts_ledger";

#[derive(Debug, Parser)]
#[command(name = "darts_ledger")]
#[command(about = "Operator tools for the darts telemetry ledger", long_about = None)]
struct Args {
    /// SeaORM-compatible Postgres URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Maximum pooled database connections
    #[arg(long, env = "INGEST_DB_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Worker lanes used by process-pending
    #[arg(long, env = "INGEST_LANES", default_value_t = 4)]
    lanes: usize,

    /// Per-lane queue capacity
    #[arg(long, env = "INGEST_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "INGEST_LOG_JSON", default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild one match from its recorded webhook calls
    Reprocess {
        #[arg(long)]
        match_id: String,
    },
    /// Re-run every webhook call that was never marked processed
    ProcessPending {
        #[arg(long)]
        match_id: Option<String>,
    },
    /// Print the ingested state of one match as JSON
    Show {
        #[arg(long)]
        match_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let connection = db::connect_with(&args.database_url, args.max_connections).await?;
    let config = EngineConfig::default()
        .with_lanes(args.lanes)
        .with_queue_capacity(args.queue_capacity);
    let engine = Arc::new(IngestEngine::from_sea_orm(connection.clone(), config));
    let calls: SharedCallLog = Arc::new(SeaOrmWebhookCallLog::new(connection));

    match args.command {
        Command::Reprocess { match_id } => {
            let driver = ReprocessDriver::for_engine(&engine, calls);
            let summary = driver
                .reprocess(&match_id)
                .await
                .with_context(|| format!("failed to reprocess match {match_id}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::ProcessPending { match_id } => {
            let dispatcher = DeliveryDispatcher::start(Arc::clone(&engine), calls);
            let report = dispatcher.process_pending(match_id.as_deref()).await;
            dispatcher.shutdown().await;
            let report = report.context("failed to process pending calls")?;
            info!(
                target: LOG_TARGET,
                processed = report.processed,
                failed = report.failed,
                "process-pending finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Show { match_id } => {
            let report = MatchReportQuery::new(engine.storage())
                .execute(&match_id)
                .await
                .with_context(|| format!("failed to load match {match_id}"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

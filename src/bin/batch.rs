use ad_pipeline::{
    app_state::{self, StartupError},
    config::{AppConfig, ConfigError},
    db,
    models::batch::{BatchRequest, BatchRow},
    pipeline::BatchOrchestrator,
};
use serde::Deserialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: batch <rows.json> [--dry-run] [--concurrency N]";

/// Input file: either a bare array of rows or a full batch request.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchInput {
    Request(BatchRequest),
    Rows(Vec<BatchRow>),
}

struct Args {
    path: String,
    dry_run: bool,
    concurrency: Option<usize>,
}

/// Anything that stops the CLI from running the batch at all.
#[derive(Debug, thiserror::Error)]
enum SetupError {
    #[error("Failed to load configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error(transparent)]
    Policy(#[from] ConfigError),

    #[error("Database setup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to initialize pipeline collaborators: {0}")]
    Startup(#[from] StartupError),
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut path = None;
    let mut dry_run = false;
    let mut concurrency = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--concurrency" => {
                let value = args.next().ok_or("--concurrency needs a value")?;
                concurrency = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid concurrency '{value}'"))?,
                );
            }
            other if path.is_none() && !other.starts_with("--") => path = Some(other.to_string()),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    Ok(Args {
        path: path.ok_or("missing rows file")?,
        dry_run,
        concurrency,
    })
}

fn read_request(args: &Args) -> Result<BatchRequest, String> {
    let raw = std::fs::read_to_string(&args.path)
        .map_err(|e| format!("cannot read {}: {e}", args.path))?;
    let input: BatchInput =
        serde_json::from_str(&raw).map_err(|e| format!("invalid rows file {}: {e}", args.path))?;

    let mut request = match input {
        BatchInput::Request(request) => request,
        BatchInput::Rows(rows) => BatchRequest {
            rows,
            concurrency: None,
            dry_run: None,
        },
    };
    if args.dry_run {
        request.dry_run = Some(true);
    }
    if args.concurrency.is_some() {
        request.concurrency = args.concurrency;
    }
    Ok(request)
}

/// Wire the pipeline from configuration. Migrations only run when the
/// batch will publish, so dry runs work without a reachable database.
async fn build_orchestrator(config: &AppConfig, dry_run: bool) -> Result<BatchOrchestrator, SetupError> {
    let policy = config.load_policy()?;
    let pool = db::lazy_pool(&config.database_url)?;
    if !dry_run {
        db::run_migrations(&pool).await?;
    }
    let context = app_state::build_context(config, Arc::new(policy), pool)?;
    Ok(BatchOrchestrator::new(Arc::new(context)))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the result JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let request = match parse_args(std::env::args().skip(1)).and_then(|args| read_request(&args)) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let setup = match AppConfig::from_env() {
        Ok(config) => {
            let dry_run = request.dry_run.unwrap_or(config.dry_run);
            build_orchestrator(&config, dry_run).await
        }
        Err(e) => Err(SetupError::from(e)),
    };
    let orchestrator = match setup {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "Cannot run batch");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(rows = request.rows.len(), "Running batch");
    let result = orchestrator.submit_batch(request).await;

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize batch result"),
    }
    ExitCode::SUCCESS
}

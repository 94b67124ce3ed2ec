use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ad_pipeline::app_state::{self, AppState};
use ad_pipeline::config::{AppConfig, PolicyConfig};
use ad_pipeline::db;
use ad_pipeline::pipeline::BatchOrchestrator;
use ad_pipeline::routes;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ad-pipeline server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    describe_metrics();

    let (policy, policy_loaded) = match config.load_policy() {
        Ok(policy) => (policy, true),
        Err(e) => {
            tracing::error!(error = %e, "Policy failed to load, using built-in policy");
            (PolicyConfig::default(), false)
        }
    };

    // Record sync database
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let context = app_state::build_context(&config, Arc::new(policy), db_pool)
        .expect("Failed to initialize pipeline collaborators");
    let orchestrator = BatchOrchestrator::new(Arc::new(context));
    let state = AppState::new(orchestrator, policy_loaded, config.settled_batch_capacity);

    let app = routes::router(state, prometheus_handle);

    tracing::info!("Starting ad-pipeline on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

fn describe_metrics() {
    metrics::describe_counter!("pipeline_batches_total", "Batches submitted");
    metrics::describe_counter!(
        "pipeline_jobs_total",
        "Jobs that reached a terminal state, by status"
    );
    metrics::describe_counter!(
        "pipeline_retries_total",
        "Collaborator retries consumed, by stage"
    );
    metrics::describe_counter!(
        "review_revisions_total",
        "Drafts sent to the reviser after review"
    );
    metrics::describe_gauge!("pipeline_active_jobs", "Jobs currently running a stage");
    metrics::describe_histogram!(
        "pipeline_job_duration_seconds",
        "Wall time from admission to terminal state"
    );
}

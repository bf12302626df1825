mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use grader_engine::alloc::TrackingAllocator;
use grader_engine::config::GraderConfig;
use grader_engine::isolation::{serve_child, CHILD_SUBCOMMAND};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[derive(Parser)]
#[command(name = "grader-api")]
#[command(about = "Grader API - HTTP front end for the grading engine", long_about = None)]
struct Cli {
    /// Grader config file (defaults to config/grader.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "GRADER_API_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,
}

pub struct AppState {
    pub config: Arc<GraderConfig>,
    /// Held for the whole run; heap deltas are process-wide
    pub grading: Mutex<()>,
}

fn main() -> Result<()> {
    // Subprocess isolation re-executes this binary as the child
    if std::env::args().nth(1).as_deref() == Some(CHILD_SUBCOMMAND) {
        return serve_child(std::io::stdin().lock(), std::io::stdout().lock());
    }

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    serve(cli)
}

#[tokio::main]
async fn serve(cli: Cli) -> Result<()> {
    info!("Grader API booting...");

    let config = GraderConfig::load_default(cli.config.as_deref())
        .context("Failed to load grader configuration")?;
    info!(
        isolation = ?config.isolation,
        binding = ?config.binding,
        fault_policy = ?config.fault_policy,
        failure_report = ?config.failure_report,
        case_timeout_ms = config.limits.case_timeout_ms,
        "Grader configuration loaded"
    );

    let state = Arc::new(AppState {
        config: Arc::new(config),
        grading: Mutex::new(()),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cli.addr))?;

    info!("HTTP server listening on {}", cli.addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

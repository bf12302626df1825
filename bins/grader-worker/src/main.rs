mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grader_engine::alloc::TrackingAllocator;
use grader_engine::config::GraderConfig;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[derive(Parser)]
#[command(name = "grader-worker")]
#[command(about = "Grader Worker - Grade function submissions against test cases", long_about = None)]
struct Cli {
    /// Grader config file (defaults to config/grader.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one request event and print the response (default)
    Handle {
        /// Event file; reads stdin when omitted
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Pretty-print the response
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Grade newline-delimited request events from stdin
    Serve,

    /// Print the unit synthesized from a request event
    Synth {
        /// Event file; reads stdin when omitted
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Run one isolated invocation (spawned by the grader itself)
    #[command(hide = true)]
    InvokeChild,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.unwrap_or(Commands::Handle {
        event: None,
        pretty: false,
    });

    match command {
        Commands::Handle { event, pretty } => {
            let config = load_config(cli.config.as_deref())?;
            commands::handle(&config, event.as_deref(), pretty)
        }
        Commands::Serve => {
            let config = load_config(cli.config.as_deref())?;
            info!(isolation = ?config.isolation, binding = ?config.binding, "Grader worker serving stdin");
            commands::serve(&config)
        }
        Commands::Synth { event } => commands::synth(event.as_deref()),
        // The child takes its limits from the request, not from config
        Commands::InvokeChild => commands::invoke_child(),
    }
}

fn load_config(path: Option<&Path>) -> Result<GraderConfig> {
    GraderConfig::load_default(path).map_err(|e| {
        error!("Failed to load grader configuration: {:#}", e);
        e
    })
}

//! Mint Sniffer - launch detection service
//!
//! Loads configuration, starts the detection pipeline and logs every
//! enriched candidate until Ctrl-C.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mint_sniffer::config::LogFormat;
use mint_sniffer::{endpoints, EnrichedCandidate, Pipeline, PipelineConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MINT_SNIFFER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let json = args.json_logs || config.monitoring.log_format == LogFormat::Json;
    init_logging(args.verbose, json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mint sniffer");
    info!(
        rpc = %config.rpc.http_url,
        ws = %config.stream.ws_url,
        programs = config.stream.programs.len(),
        "Configuration loaded"
    );

    if let Some(port) = config.monitoring.metrics_port {
        info!(port, "Starting metrics server");
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let stats_interval = match config.monitoring.stats_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
    let candidates = pipeline.start().context("Failed to start pipeline")?;

    run_event_loop(&pipeline, candidates, stats_interval).await;

    info!("Shutting down gracefully");
    pipeline.stop().await;
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "mint_sniffer=debug,info"
    } else {
        "mint_sniffer=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file '{}' not found", path.display())
        }
        _ => PipelineConfig::load(path).context("Failed to load configuration"),
    }
}

/// Log candidates and periodic stats until Ctrl-C or the pipeline ends
async fn run_event_loop(
    pipeline: &Pipeline,
    mut candidates: mpsc::Receiver<EnrichedCandidate>,
    stats_interval: Option<Duration>,
) {
    let mut stats_ticker = tokio::time::interval(stats_interval.unwrap_or(Duration::from_secs(60)));
    stats_ticker.tick().await;

    loop {
        tokio::select! {
            candidate = candidates.recv() => match candidate {
                Some(candidate) => match serde_json::to_string(&candidate) {
                    Ok(json) => info!(target: "mint_sniffer::candidates", candidate = %json, "Candidate"),
                    Err(e) => warn!(mint = %candidate.mint, error = %e, "Failed to serialize candidate"),
                },
                None => {
                    warn!("Candidate channel closed");
                    break;
                }
            },

            _ = stats_ticker.tick(), if stats_interval.is_some() => {
                let stats = pipeline.stats();
                info!(
                    state = ?stats.state,
                    pending = stats.pending_transactions,
                    quarantined = stats.quarantined,
                    seen = stats.seen_signatures,
                    rpc_in_flight = stats.rpc_in_flight,
                    "Pipeline stats"
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
}

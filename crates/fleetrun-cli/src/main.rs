//! Fleetrun CLI - fan-out sweeps across a fleet of hosts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetrun_engine::{RunConfig, Scheduler};

mod hosts;
mod probe;
mod render;

use probe::TcpProbeFactory;

/// Fleetrun - run work against many hosts with bounded concurrency
#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(about = "Concurrent fan-out runner for network sweeps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// TCP reachability sweep over a hosts file
    Sweep {
        /// Hosts file: one host per line, optional comma-separated ports
        #[arg(long, default_value = "hosts.txt")]
        hosts: PathBuf,

        /// Ports probed for hosts without their own port list
        #[arg(long, value_delimiter = ',', default_values_t = vec![22u16, 80, 443])]
        ports: Vec<u16>,

        /// Maximum simultaneous hosts being probed
        #[arg(long, default_value_t = 10)]
        concurrency: usize,

        /// Per-attempt timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,

        /// Attempts per host before giving up
        #[arg(long, default_value_t = 3)]
        attempts: u32,

        /// Delay between attempts in seconds
        #[arg(long, default_value_t = 2)]
        retry_delay: u64,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Write one output file per succeeded host into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep {
            hosts,
            ports,
            concurrency,
            timeout,
            attempts,
            retry_delay,
            json,
            output_dir,
        } => {
            let endpoints = hosts::load_hosts(&hosts, &ports)?;
            if endpoints.is_empty() {
                warn!(file = %hosts.display(), "no usable hosts found");
                return Ok(());
            }

            let config = RunConfig {
                max_concurrency: concurrency,
                per_attempt_timeout: Duration::from_secs(timeout),
                max_attempts: attempts,
                retry_delay: Duration::from_secs(retry_delay),
            };

            let scheduler = Scheduler::new(config);

            // Ctrl-C cancels the batch; in-flight probes wind down and
            // the partial report is still rendered.
            let token = scheduler.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, cancelling batch");
                    token.cancel();
                }
            });

            let report = scheduler.run(endpoints, Arc::new(TcpProbeFactory)).await?;

            if json {
                println!("{}", render::to_json(&report)?);
            } else {
                render::print_summary(&report);
            }

            if let Some(dir) = output_dir {
                render::write_outputs(&report, &dir)?;
            }

            if !report.all_succeeded() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

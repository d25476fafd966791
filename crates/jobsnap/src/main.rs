//! Namespace job watcher CLI.
//!
//! Watches a single namespace for newly created batch jobs and captures
//! a best-effort diagnostic bundle for each one (describe output,
//! events, manifests, files harvested from the first init container,
//! aggregated logs) into a per-job directory, until no new job has
//! appeared for the idle timeout.

mod capture;
mod cluster;
mod config;
mod events;
#[cfg(test)]
mod fakes;
mod sink;
mod watcher;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use cluster::Kubectl;
use config::WatchConfig;
use events::{EventEmitter, WatchEvent};
use sink::FsSink;
use watcher::JobWatcher;

/// Namespace job watcher - captures per-job diagnostic bundles
#[derive(Parser)]
#[command(name = "jobsnap")]
#[command(about = "Watches a namespace for new batch jobs and captures diagnostic bundles")]
#[command(version)]
struct Cli {
    /// Namespace to watch for batch jobs
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Root directory for per-job diagnostic bundles
    #[arg(long, default_value = "job-diagnostics")]
    output_dir: PathBuf,

    /// Poll interval between discovery cycles, in seconds
    #[arg(long, default_value = "5")]
    poll_interval: u64,

    /// Stop once no new job has appeared for this many seconds
    #[arg(long, default_value = "300")]
    idle_timeout: u64,

    /// Bounded wait for a job's pod to appear, in seconds
    #[arg(long, default_value = "120")]
    pod_wait_timeout: u64,

    /// In-container directory to harvest from the init container (repeatable)
    #[arg(long = "target-dir")]
    target_dirs: Vec<String>,

    /// Output file for JSONL events (in addition to stdout)
    #[arg(long)]
    events_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "jobsnap=debug"
    } else {
        "jobsnap=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut config = WatchConfig {
        namespace: cli.namespace,
        output_root: cli.output_dir,
        poll_interval: Duration::from_secs(cli.poll_interval),
        idle_timeout: Duration::from_secs(cli.idle_timeout),
        pod_wait_timeout: Duration::from_secs(cli.pod_wait_timeout),
        ..WatchConfig::default()
    };
    if !cli.target_dirs.is_empty() {
        config.target_dirs = cli.target_dirs;
    }

    println!(
        "{}",
        format!(
            "Watching namespace '{}' for new jobs (idle timeout {}s, output {})",
            config.namespace,
            config.idle_timeout.as_secs(),
            config.output_root.display()
        )
        .cyan()
        .bold()
    );

    let emitter = EventEmitter::new(cli.events_file);
    emitter.emit(&WatchEvent::started(&config.namespace));

    let watcher = JobWatcher::new(Kubectl, FsSink, config, emitter);
    watcher.run().await;

    println!(
        "{}",
        "Idle timeout reached with no new jobs - done".green()
    );
    Ok(())
}

//! statuscast one-shot cycle runner
//!
//! Runs exactly one poll cycle over Statuspage documents saved on disk and
//! logs every notification instead of sending it. Meant to be driven by an
//! external timer (cron, systemd timer, a scheduler).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;

use statuscast::state::open_state_store;
use statuscast::{CycleConfig, DirectoryFeed, DispatchCoordinator, InMemoryDirectory, LogDelivery, WatchError, WatchResult};

/// Runner configuration
struct Args {
    /// Directory holding incidents.json, maintenance_active.json, maintenance_upcoming.json
    feed_dir: PathBuf,
    /// Directory holding the persisted change state
    state_dir: PathBuf,
    /// JSON array of subscription records
    subscribers: Option<PathBuf>,
    /// JSON cycle configuration
    config: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            feed_dir: PathBuf::from("./feed"),
            state_dir: PathBuf::from("./state"),
            subscribers: None,
            config: None,
        }
    }
}

fn value_for(args: &[String], i: usize, flag: &str) -> PathBuf {
    match args.get(i + 1) {
        Some(v) => PathBuf::from(v),
        None => {
            eprintln!("error: {flag} requires a value");
            std::process::exit(2);
        }
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--feed-dir" | "-f" => {
                parsed.feed_dir = value_for(&args, i, "--feed-dir");
                i += 2;
            }
            "--state-dir" | "-s" => {
                parsed.state_dir = value_for(&args, i, "--state-dir");
                i += 2;
            }
            "--subscribers" => {
                parsed.subscribers = Some(value_for(&args, i, "--subscribers"));
                i += 2;
            }
            "--config" | "-c" => {
                parsed.config = Some(value_for(&args, i, "--config"));
                i += 2;
            }
            "--help" | "-h" => {
                println!("statuscast-cycle - run one status feed poll cycle");
                println!();
                println!("USAGE:");
                println!("    statuscast-cycle [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -f, --feed-dir <DIR>        Saved feed documents [default: ./feed]");
                println!("    -s, --state-dir <DIR>       Change state directory [default: ./state]");
                println!("        --subscribers <FILE>    JSON array of subscriptions");
                println!("    -c, --config <FILE>         JSON cycle configuration");
                println!("    -h, --help                  Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(2);
            }
        }
    }

    parsed
}

fn load_directory(path: Option<&PathBuf>) -> WatchResult<InMemoryDirectory> {
    let directory = InMemoryDirectory::new();
    let Some(path) = path else {
        tracing::warn!("no --subscribers file given; the cycle will only advance state");
        return Ok(directory);
    };

    let body = std::fs::read_to_string(path)
        .map_err(|e| WatchError::internal(format!("reading {}: {e}", path.display())))?;
    let records: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| WatchError::internal(format!("parsing {}: {e}", path.display())))?;
    let loaded = directory.load_records(&records, Utc::now())?;
    tracing::info!(path = %path.display(), loaded, "subscriptions loaded");
    Ok(directory)
}

fn run(args: &Args) -> WatchResult<()> {
    let cfg = match &args.config {
        Some(path) => CycleConfig::from_json_file(path)?,
        None => CycleConfig::default(),
    };
    let directory = load_directory(args.subscribers.as_ref())?;
    let store = open_state_store(&args.state_dir, None)?;

    let coordinator = DispatchCoordinator::new(
        cfg,
        Arc::new(DirectoryFeed::new(&args.feed_dir)),
        Arc::new(directory),
        Arc::new(LogDelivery),
        Arc::new(store),
    )?;

    let report = coordinator.run_cycle()?;
    match serde_json::to_string(&report) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to render cycle report"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "cycle failed");
            ExitCode::FAILURE
        }
    }
}

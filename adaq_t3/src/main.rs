//! # ADAQ T3 Maker Binary
//!
//! # Usage
//!
//! ```bash
//! adaq_t3 --config /etc/adaq/adaq.toml
//!
//! # Verbose, JSON logs
//! adaq_t3 -v --json
//! ```

#![deny(warnings)]

use adaq::config::{DaqConfig, LogLevel};
use adaq::consts::DEFAULT_CONFIG_PATH;
use adaq_t3::TriggerEngine;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// ADAQ T3 maker - multi-station coincidence trigger
#[derive(Parser, Debug)]
#[command(name = "adaq_t3")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Correlates station T2 hits into array T3 triggers")]
#[command(long_about = None)]
struct Args {
    /// Path to the deployment configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("T3 maker failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = DaqConfig::from_file(&args.config);
    let log_level = config
        .as_ref()
        .map_or(LogLevel::default(), |config| config.shared.log_level);
    setup_tracing(&args, log_level);

    info!("ADAQ T3 maker v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = config?;
    info!(
        "Loaded {} stations from {}",
        config.stations.len(),
        args.config.display()
    );

    let mut engine = TriggerEngine::open(&config)?;

    let running = engine.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    engine.run();
    engine.shutdown();
    Ok(())
}

/// Setup tracing subscriber from CLI arguments and `[shared] log_level`.
///
/// `RUST_LOG` overrides both.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        log_level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

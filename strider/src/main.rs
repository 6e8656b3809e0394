//! # Strider Controller
//!
//! Onboard controller for a SpotMicro-class quadruped: drives the twelve
//! leg joints from operator commands and onboard sensors, publishes live
//! telemetry and serves the WebSocket/BLE control API.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulation backends
//! strider --simulate
//!
//! # Explicit config path, verbose logging
//! strider -c /etc/strider/strider.toml -v
//!
//! # JSON logs for ingestion
//! strider --json
//! ```

mod app;
mod rt;
mod supervisor;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strider_common::config::StriderConfig;

/// Strider - onboard quadruped controller
#[derive(Parser, Debug)]
#[command(name = "strider")]
#[command(version)]
#[command(about = "Onboard controller for a SpotMicro-class quadruped")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/strider.toml")]
    config: PathBuf,

    /// Force the simulation actuator/sensor backends
    #[arg(short, long)]
    simulate: bool,

    /// Override the WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("startup failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Peek the configured log level with a silent strict load; the real
    // load (fallback + defaults write-back) happens after tracing is up so
    // its warnings are visible.
    let level_probe = StriderConfig::load(&args.config)
        .ok()
        .map(|c| c.shared.log_level);
    setup_tracing(&args, level_probe);

    let mut config = StriderConfig::load_or_default(&args.config);
    if let Some(addr) = &args.ws_addr {
        config.comm.ws_addr = addr.clone();
        config.comm.validate()?;
    }
    info!("strider v{} starting...", env!("CARGO_PKG_VERSION"));

    let app = app::App::new(config, args.simulate)?;
    app.run()?;

    info!("strider shutdown complete");
    Ok(())
}

fn setup_tracing(args: &Args, configured: Option<strider_common::config::LogLevel>) {
    let default_level = if args.verbose {
        "debug"
    } else {
        configured
            .map(|l| l.as_filter())
            .unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

//! Hostscan Daemon - Main entry point
//!
//! Serves subnet scan requests over TCP: one CIDR per connection, answered
//! with the live hosts found and what could be learned about them.

mod config;
mod server;
mod session;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::session::Session;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "hostscan")]
#[command(about = "Subnet host discovery and enrichment daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hostscan.toml")]
    config: PathBuf,

    /// Bind address for the scan listener
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    init_config: bool,

    /// Run a single scan of CIDR, print the response and exit
    #[arg(long, value_name = "CIDR")]
    scan: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Hostscan v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        bind = %config.daemon.bind,
        link_layer = config.discovery.use_link_layer,
        online_vendor_lookup = config.vendor.online_lookup,
        "Configuration loaded"
    );

    let state = AppState::new(&config)?;

    match args.scan {
        Some(cidr) => scan_once(&state, &cidr).await,
        None => server::run(state, &config.daemon.bind).await,
    }
}

/// Feed one request through a session over an in-memory pipe and print
/// exactly what a network client would receive
async fn scan_once(state: &AppState, cidr: &str) -> Result<()> {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let session = Session::new(server, state.pipeline.clone(), state.session.clone());
    let handle = tokio::spawn(session.run());

    client.write_all(format!("{}\n", cidr).as_bytes()).await?;
    let mut response = String::new();
    client.read_to_string(&mut response).await?;
    print!("{}", response);

    let outcome = handle.await.context("session task")??;
    info!(outcome = ?outcome, "Scan finished");
    Ok(())
}

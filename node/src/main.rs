// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Hashchain Node
//!
//! Entry point for the `hashchain-node` binary. Parses CLI arguments,
//! initializes logging, opens the chain under `--data-dir`, and runs one
//! subcommand:
//!
//! - `init`     create genesis if the chain is empty
//! - `append`   seal and store one block
//! - `show`     print a block as JSON
//! - `height`   print the tip height
//! - `validate` re-verify one block or the whole chain
//! - `demo`     append, tamper and re-validate in a temporary store
//! - `serve`    run the HTTP API and the metrics endpoint
//! - `version`  print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use hashchain::config::{
    DEMO_BLOCK_COUNT, DEMO_TAMPERED_HEIGHTS, DEMO_TAMPER_BODY, HASH_FUNCTION,
    RECORD_FORMAT_VERSION,
};
use hashchain::storage::{BlockStore, ChainEngine, ChainReport, InitOutcome, SledStore};

use cli::{Commands, HashchainCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HashchainCli::parse();

    if matches!(cli.command, Commands::Version) {
        print_version();
        return Ok(());
    }

    logging::init_logging(&cli.global.log_level, cli.global.log_format);
    let data_dir = cli.global.data_dir.as_path();

    match cli.command {
        Commands::Init => init_chain(data_dir),
        Commands::Append(args) => append_block(data_dir, args),
        Commands::Show(args) => show_block(data_dir, args),
        Commands::Height => print_height(data_dir),
        Commands::Validate(args) => validate(data_dir, args),
        Commands::Demo => run_demo(),
        Commands::Serve(args) => serve(data_dir, args).await,
        Commands::Version => unreachable!("handled above"),
    }
}

/// Opens (creating if needed) the sled store under `data_dir`.
fn open_store(data_dir: &Path) -> Result<SledStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let store = SledStore::open(data_dir)
        .with_context(|| format!("failed to open chain store at {}", data_dir.display()))?;
    tracing::debug!(path = %data_dir.display(), "chain store opened");
    Ok(store)
}

/// Opens the chain for writing, creating genesis if the store is empty.
fn open_chain(data_dir: &Path) -> Result<ChainEngine<SledStore>> {
    ChainEngine::open(open_store(data_dir)?).context("failed to initialize chain")
}

/// Opens the chain for queries. Never writes, not even genesis.
fn open_chain_read_only(data_dir: &Path) -> Result<ChainEngine<SledStore>> {
    Ok(ChainEngine::new(open_store(data_dir)?))
}

fn init_chain(data_dir: &Path) -> Result<()> {
    let chain = ChainEngine::new(open_store(data_dir)?);

    match chain.initialize().context("failed to initialize chain")? {
        InitOutcome::Created(genesis) => {
            println!("created genesis block {}", genesis.hash);
        }
        InitOutcome::Existing { height } => {
            println!("chain already initialized at height {height}");
        }
    }
    Ok(())
}

fn append_block(data_dir: &Path, args: cli::AppendArgs) -> Result<()> {
    let body = if args.json {
        serde_json::from_str::<Value>(&args.body).context("block body is not valid JSON")?
    } else {
        Value::String(args.body)
    };

    let chain = open_chain(data_dir)?;
    let block = chain.append(body).context("failed to append block")?;
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

fn show_block(data_dir: &Path, args: cli::ShowArgs) -> Result<()> {
    let chain = open_chain_read_only(data_dir)?;
    let block = chain
        .get_block(args.height)
        .with_context(|| format!("failed to read block #{}", args.height))?;
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

fn print_height(data_dir: &Path) -> Result<()> {
    let chain = open_chain_read_only(data_dir)?;
    match chain.height()? {
        Some(height) => println!("{height} ({} blocks stored)", chain.block_count()?),
        None => println!("empty"),
    }
    Ok(())
}

fn validate(data_dir: &Path, args: cli::ValidateArgs) -> Result<()> {
    let chain = open_chain_read_only(data_dir)?;

    if let Some(height) = args.height {
        let valid = chain
            .validate_block(height)
            .with_context(|| format!("failed to validate block #{height}"))?;
        println!("block #{height}: {}", if valid { "valid" } else { "INVALID" });
        if !valid {
            bail!("block #{height} failed validation");
        }
        return Ok(());
    }

    let report = chain.validate_chain().context("failed to validate chain")?;
    print_report(&report);
    if !report.is_valid() {
        bail!(
            "chain validation failed at heights {:?}",
            report.invalid_heights()
        );
    }
    Ok(())
}

fn print_report(report: &ChainReport) {
    if report.is_valid() {
        println!("chain valid ({} blocks checked)", report.checked);
        return;
    }
    println!(
        "chain INVALID ({} blocks checked, {} faults)",
        report.checked,
        report.faults.len()
    );
    for fault in &report.faults {
        match fault.through {
            Some(last) => println!("  #{}..#{} {}", fault.height, last, fault.kind),
            None => println!("  #{:<6} {}", fault.height, fault.kind),
        }
    }
}

/// Builds a short chain in a temporary store, overwrites two block bodies
/// behind the engine's back, and shows validation catching both.
fn run_demo() -> Result<()> {
    let store = SledStore::open_temporary().context("failed to open temporary store")?;
    let chain = ChainEngine::open(store).context("failed to initialize chain")?;

    for i in 0..DEMO_BLOCK_COUNT {
        let block = chain.append(Value::String(format!("Test block {i}")))?;
        println!("appended #{} {}", block.height, block.hash);
    }

    println!();
    print_report(&chain.validate_chain()?);

    for height in DEMO_TAMPERED_HEIGHTS {
        let mut block = chain.get_block(height)?;
        block.body = Value::String(DEMO_TAMPER_BODY.to_string());
        chain.store().put(height, &block.to_bytes()?)?;
        tracing::info!(height, "tampered with stored block body");
    }

    println!();
    let report = chain.validate_chain()?;
    print_report(&report);
    println!("invalid heights: {:?}", report.invalid_heights());
    Ok(())
}

/// Serves the HTTP API and the Prometheus endpoint until SIGINT or SIGTERM.
async fn serve(data_dir: &Path, args: cli::ServeArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %data_dir.display(),
        "starting hashchain-node"
    );

    let chain = Arc::new(open_chain(data_dir)?);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.set_height(chain.height()?);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain: Arc::clone(&chain),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    chain.store().flush().context("failed to flush chain store")?;
    tracing::info!("hashchain-node stopped");
    Ok(())
}

fn print_version() {
    println!("hashchain-node {}", env!("CARGO_PKG_VERSION"));
    println!("hash           {}", HASH_FUNCTION);
    println!("record format  v{}", RECORD_FORMAT_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

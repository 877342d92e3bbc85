//! # CLI Interface
//!
//! Defines the command-line argument structure for `hashchain-node` using
//! `clap` derive. Every subcommand works on the chain stored under
//! `--data-dir`, except `demo`, which runs against a throwaway store.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use hashchain::config::{DEFAULT_API_PORT, DEFAULT_DATA_DIR, DEFAULT_METRICS_PORT};

use crate::logging::LogFormat;

/// Local, tamper-evident block chain.
///
/// Appends records to a hash-linked chain stored on disk and re-verifies
/// every stored block on demand.
#[derive(Parser, Debug)]
#[command(
    name = "hashchain-node",
    about = "Local tamper-evident block chain",
    version,
    propagate_version = true
)]
pub struct HashchainCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding the chain database. Created on first use.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "HASHCHAIN_DATA_DIR",
        default_value = DEFAULT_DATA_DIR
    )]
    pub data_dir: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(
        long,
        global = true,
        env = "HASHCHAIN_LOG",
        default_value = "hashchain_node=info,hashchain=info"
    )]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the chain (write genesis) if the data directory is empty.
    Init,
    /// Append a block with the given body.
    Append(AppendArgs),
    /// Print the block at a height as JSON.
    Show(ShowArgs),
    /// Print the current chain height.
    Height,
    /// Re-verify one block or the whole chain.
    Validate(ValidateArgs),
    /// Build a ten-block chain in a temporary store, tamper with two blocks,
    /// and show validation catching it.
    Demo,
    /// Serve the HTTP API and the metrics endpoint.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `append` subcommand.
#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Block body. Stored as a string unless `--json` is given.
    pub body: String,

    /// Parse the body as a JSON value instead of storing it as a string.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Height of the block to print.
    pub height: u64,
}

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Validate only this block's own hash instead of the whole chain.
    #[arg(long)]
    pub height: Option<u64>,
}

/// Arguments for the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the HTTP API.
    #[arg(long, env = "HASHCHAIN_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "HASHCHAIN_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Address to bind both listeners to.
    #[arg(long, env = "HASHCHAIN_BIND", default_value = "127.0.0.1")]
    pub bind: String,
}

//! Developer CLI for RecoveryKit.
//!
//! Runs a recovery session against a node with a software device standing in
//! for the hardware wallet, and inspects the resulting wallet store.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Rebuild wallet identities and accounts from chain state.
#[derive(Debug, Parser)]
#[command(name = "recoverykit", version, about)]
struct Cli {
    /// Directory holding the wallet store. Defaults to the platform data directory.
    #[arg(long, global = true, env = "RECOVERYKIT_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Print JSON instead of human readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Log filter, e.g. `debug` or `recoverykit_core=trace`.
    #[arg(long, global = true, env = "RECOVERYKIT_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan identity numbers from 0 and import every account found.
    Recover(commands::recover::RecoverArgs),
    /// List the accounts in the wallet store.
    Accounts,
}

fn init_tracing(filter: &str) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| eyre::eyre!(e))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    let store = commands::open_store(cli.store_dir)?;
    match cli.command {
        Command::Recover(args) => commands::recover::run(&args, &store, cli.json).await,
        Command::Accounts => commands::accounts::run(&store, cli.json),
    }
}

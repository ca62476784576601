//! CLI command definitions and dispatch.

pub mod listen;
pub mod replay;

use clap::{Parser, Subcommand};

/// hostlink — Stream intercepted API calls to an analysis host.
#[derive(Parser, Debug)]
#[command(name = hostlink_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report every event of a JSON lines file to the analysis host.
    Replay(replay::ReplayArgs),
    /// Accept reporter connections and print every decoded record.
    Listen(listen::ListenArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Replay(args) => replay::execute(args),
        Command::Listen(args) => listen::execute(args),
    }
}

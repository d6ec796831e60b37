//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reads barcode scanners on serial ports and replicates scans to a remote
/// store.
#[derive(Debug, Parser)]
#[command(name = "scanlink-daemon", version)]
pub struct Cli {
    /// Config file (default: the platform config dir's scanlink.toml).
    #[arg(short, long, env = "SCANLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Record to an in-memory remote instead of the configured one.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run every configured scanner until Ctrl-C (default).
    Run {
        /// Register devices without connecting them.
        #[arg(long)]
        no_connect: bool,
    },

    /// List the serial ports present on this machine.
    Ports,

    /// Check that the remote store answers.
    TestConnection,

    /// Replay the local backlog once and exit.
    Sync,

    /// Print barcode counts per status.
    Stats,
}

impl Default for Command {
    fn default() -> Self {
        Command::Run { no_connect: false }
    }
}

//! # scanlink-daemon Entry Point
//!
//! Parses the command line and hands over to [`scanlink_daemon::run`].
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load configuration (defaults, TOML file, environment)
//! 3. Open local storage and the sync engine
//! 4. Register devices and auto-connect them
//! 5. Start the backlog processor and the event consumer
//! 6. Wait for Ctrl-C, then disconnect everything and run a final sync

use clap::Parser;

use scanlink_daemon::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scanlink_daemon::init_tracing();
    scanlink_daemon::run(Cli::parse()).await
}

//! SessionKit command line client.
//!
//! Wires the session core to reqwest, the system clock and a per-user
//! session file, then runs one subcommand.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let session = commands::build_session(&cli)?;
    let result = commands::run(&session, cli.command).await;
    session.shutdown();
    result
}

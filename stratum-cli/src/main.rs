//! Stratum CLI - apply and revert versioned schema migrations.

use clap::Parser;

use stratum_cli::cli::{Cli, Command};
use stratum_cli::commands;
use stratum_cli::error::CliResult;
use stratum_cli::output;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Up => commands::up::run(&cli).await,
        Command::Down => commands::down::run(&cli).await,
        Command::Status => commands::status::run(&cli).await,
        Command::New(args) => commands::new::run(&cli, args).await,
    }
}

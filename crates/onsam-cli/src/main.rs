mod cli;
mod commands;
mod service;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run => commands::run(&cli.config).await,
        Command::Audit => commands::audit(&cli.config).await,
        Command::Resources => commands::resources(&cli.config).await,
        Command::CheckConfig => commands::check_config(&cli.config),
    }
}

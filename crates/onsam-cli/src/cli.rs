use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "onsam",
    about = "GENI aggregate manager for OpenNaaS ROADM cross-connects",
    version
)]
pub struct Cli {
    /// Path to the AM configuration file.
    #[arg(long, env = "ONSAM_CONFIG", default_value = "onsam.yml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the aggregate manager: API surface plus recurring audit and
    /// expiration tickers.
    Run,

    /// Drive one full inventory audit cycle against the controller and exit.
    Audit,

    /// Print the current resource advertisement as JSON.
    Resources,

    /// Validate the configuration file.
    CheckConfig,
}

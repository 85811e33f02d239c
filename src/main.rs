use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

mod args;
mod config;
mod env;
mod error;
mod http;
mod imports;
mod jobs;
mod logging;
mod products;
mod ui;
mod upload;
mod utils;

use crate::args::CLIArgs;

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("ACME_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "acme", about = "Acme product import client", version = CLI_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload product CSV files and follow their import jobs
    Import(CLIArgs<imports::ImportArgs>),
    /// Browse the product catalog and change product status
    Products(CLIArgs<products::ProductsArgs>),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Import(cmd) => cmd.base.verbose,
            Commands::Products(cmd) => cmd.base.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);
    logging::init_logging(cli.command.verbose());

    match cli.command {
        Commands::Import(cmd) => imports::run(cmd.base, cmd.args).await?,
        Commands::Products(cmd) => products::run(cmd.base, cmd.args).await?,
    }

    Ok(())
}

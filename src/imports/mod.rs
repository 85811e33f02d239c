use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::{args::BaseArgs, config, http::ApiClient, upload::parse_csv_path};

mod upload;
mod watch;

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    #[command(subcommand)]
    command: ImportCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum ImportCommands {
    /// Upload a product CSV and follow the import it starts
    Upload(UploadArgs),
    /// Follow an import job that is already running
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct UploadArgs {
    /// CSV file with one product per row
    #[arg(value_name = "FILE", value_parser = parse_csv_path)]
    file: PathBuf,

    /// Print the job id and exit instead of following progress
    #[arg(long)]
    no_watch: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Job id returned by `acme import upload`
    #[arg(value_name = "JOB_ID")]
    job_id: String,
}

pub async fn run(base: BaseArgs, args: ImportArgs) -> Result<()> {
    let settings = config::resolve(&base, &config::load_global());
    let client = ApiClient::new(&settings.api_url)?;

    match args.command {
        ImportCommands::Upload(upload) => {
            upload::run(client, &upload.file, !upload.no_watch, base.json).await
        }
        ImportCommands::Watch(watch) => watch::run(client, &watch.job_id, base.json).await,
    }
}

use std::path::Path;

use anyhow::Result;
use indicatif::ProgressBar;

use crate::http::ApiClient;
use crate::ui::{percent_bar, print_command_status, CommandStatus};
use crate::upload;

use super::watch;

pub async fn run(client: ApiClient, path: &Path, follow: bool, json: bool) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bar = if json {
        ProgressBar::hidden()
    } else {
        percent_bar("Uploading")
    };
    bar.set_message(name.clone());

    let submitted = upload::submit(&client, path, |percent| {
        bar.set_position(u64::from(percent))
    })
    .await;
    let job_id = match submitted {
        Ok(job_id) => {
            bar.finish_and_clear();
            job_id
        }
        Err(err) => {
            bar.abandon();
            print_command_status(CommandStatus::Error, &format!("Failed to upload '{name}'"));
            eprintln!("Check the file and run `acme import upload {}` again.", path.display());
            return Err(err.into());
        }
    };

    if !json {
        print_command_status(
            CommandStatus::Success,
            &format!("Uploaded '{name}' (job {job_id})"),
        );
    }

    if !follow {
        if json {
            println!("{}", serde_json::json!({ "job_id": job_id }));
        } else {
            eprintln!("Run `acme import watch {job_id}` to follow the import.");
        }
        return Ok(());
    }

    watch::run(client, &job_id, json).await
}

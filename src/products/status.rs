use anyhow::Result;

use crate::error::ClientError;
use crate::http::ApiClient;
use crate::ui::{print_command_status, with_spinner, CommandStatus};

use super::api::ProductSource;

fn describe(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}

pub async fn run(client: &ApiClient, id: i64, active: bool, json: bool) -> Result<()> {
    match with_spinner("Updating product...", client.update_status(id, active)).await {
        Ok(change) => {
            if json {
                println!("{}", serde_json::json!({ "id": change.id, "active": change.active }));
            } else {
                print_command_status(
                    CommandStatus::Success,
                    &format!("Product {} is now {}", change.id, describe(change.active)),
                );
            }
            Ok(())
        }
        Err(err) => {
            print_command_status(
                CommandStatus::Error,
                &format!("Failed to mark product {id} {}", describe(active)),
            );
            Err(ClientError::StatusUpdate {
                id,
                reason: format!("{err:#}"),
            }
            .into())
        }
    }
}

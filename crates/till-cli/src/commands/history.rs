use till_core::config::ClientConfig;

use crate::commands::common::{open_local, print_entries};
use crate::error::CliError;

pub async fn run_recent(config: &ClientConfig, all: bool, as_json: bool) -> Result<(), CliError> {
    let context = open_local(config).await?;
    let entries = if all {
        context.logging().all_logs().await?
    } else {
        context.logging().recent_logs().await?
    };
    print_entries(&entries, as_json)
}

pub async fn run_pending(config: &ClientConfig, as_json: bool) -> Result<(), CliError> {
    let context = open_local(config).await?;
    let entries = context.queue().unsynced().await?;
    print_entries(&entries, as_json)
}

pub async fn run_clear(config: &ClientConfig) -> Result<(), CliError> {
    let context = open_local(config).await?;
    let removed = context.queue().clear_all().await?;
    println!("Removed {removed} log entries");
    Ok(())
}

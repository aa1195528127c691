use till_core::config::ClientConfig;

use crate::commands::common::{open_context, parse_log_id};
use crate::error::CliError;

pub async fn run_undo(config: &ClientConfig, local_id: &str) -> Result<(), CliError> {
    let local_id = parse_log_id(local_id)?;
    let context = open_context(config).await?;
    let receipt = context.logging().request_undo(local_id).await?;
    if !receipt.success {
        return Err(CliError::UndoRejected(receipt.message));
    }

    println!("{}", receipt.message);
    Ok(())
}

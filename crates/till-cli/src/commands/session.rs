use till_core::config::ClientConfig;
use till_core::logging::Identity;

use crate::commands::common::{open_context, report_recorded, required_text};
use crate::error::CliError;

pub async fn run_sign_in(
    config: &ClientConfig,
    store: &str,
    user: &str,
    sign_up: bool,
) -> Result<(), CliError> {
    let identity = Identity::new(
        required_text(store, CliError::EmptyStore)?,
        required_text(user, CliError::EmptyUser)?,
    );

    let context = open_context(config).await?;
    let entry = if sign_up {
        context.logging().signed_up(identity).await
    } else {
        context.logging().signed_in(identity).await
    };
    report_recorded(entry)?;
    Ok(())
}

pub async fn run_sign_out(config: &ClientConfig) -> Result<(), CliError> {
    let context = open_context(config).await?;
    if context.logging().identity().await.is_none() {
        tracing::warn!("Signing out without an active session");
    }
    report_recorded(context.logging().signed_out().await)?;
    Ok(())
}

pub async fn run_navigate(config: &ClientConfig, destination: &str) -> Result<(), CliError> {
    let destination = required_text(destination, CliError::EmptyDestination)?;
    let context = open_context(config).await?;
    report_recorded(context.logging().navigation(&destination).await)?;
    Ok(())
}

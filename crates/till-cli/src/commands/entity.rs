use till_core::config::ClientConfig;
use till_core::models::EntitySnapshot;
use till_core::EntityKind;

use crate::cli::{EntityArgs, UpdateArgs};
use crate::commands::common::{open_context, report_recorded, required_text};
use crate::error::CliError;

pub async fn run_created(config: &ClientConfig, args: &EntityArgs) -> Result<(), CliError> {
    let post = entity_snapshot(args)?;
    let context = open_context(config).await?;
    report_recorded(context.logging().entity_created(args.kind, post).await)?;
    Ok(())
}

pub async fn run_updated(config: &ClientConfig, args: &UpdateArgs) -> Result<(), CliError> {
    let (pre, post) = update_snapshots(args)?;
    let context = open_context(config).await?;
    report_recorded(context.logging().entity_updated(args.kind, pre, post).await)?;
    Ok(())
}

pub async fn run_deleted(config: &ClientConfig, args: &EntityArgs) -> Result<(), CliError> {
    let pre = entity_snapshot(args)?;
    let context = open_context(config).await?;
    report_recorded(context.logging().entity_deleted(args.kind, pre).await)?;
    Ok(())
}

pub async fn run_reordered(
    config: &ClientConfig,
    kind: EntityKind,
    names: &[String],
) -> Result<(), CliError> {
    let names = names
        .iter()
        .map(|name| required_text(name, CliError::EmptyName))
        .collect::<Result<Vec<_>, _>>()?;
    let context = open_context(config).await?;
    report_recorded(context.logging().entities_reordered(kind, &names).await)?;
    Ok(())
}

pub fn entity_snapshot(args: &EntityArgs) -> Result<EntitySnapshot, CliError> {
    let mut snapshot = EntitySnapshot::named(required_text(&args.name, CliError::EmptyName)?);
    snapshot.id = args.id;
    snapshot.color.clone_from(&args.color);
    snapshot.count = args.count;
    Ok(snapshot)
}

/// Snapshots before and after an update; unchanged fields are carried on both sides
pub fn update_snapshots(args: &UpdateArgs) -> Result<(EntitySnapshot, EntitySnapshot), CliError> {
    let name = required_text(&args.name, CliError::EmptyName)?;
    let renamed = match args.rename.as_deref() {
        Some(rename) => required_text(rename, CliError::EmptyName)?,
        None => name.clone(),
    };

    let mut pre = EntitySnapshot::named(name);
    pre.id = args.id;
    pre.color = args.previous_color.clone().or_else(|| args.color.clone());
    pre.count = args.previous_count.or(args.count);

    let mut post = EntitySnapshot::named(renamed);
    post.id = args.id;
    post.color = args.color.clone().or_else(|| args.previous_color.clone());
    post.count = args.count.or(args.previous_count);

    Ok((pre, post))
}

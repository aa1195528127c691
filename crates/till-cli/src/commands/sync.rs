use serde::Serialize;
use till_core::config::ClientConfig;
use till_core::sync::{Connectivity, SyncCursor, SyncReport};

use crate::commands::common::open_context;
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncOutput<'a> {
    online: bool,
    #[serde(flatten)]
    report: &'a SyncReport,
    #[serde(flatten)]
    cursor: SyncCursor,
}

pub async fn run_sync(config: &ClientConfig, as_json: bool) -> Result<(), CliError> {
    let context = open_context(config).await?;
    let report = context.logging().sync_now().await;
    let cursor = context.engine().cursor().await?;

    if as_json {
        let output = SyncOutput {
            online: context.connectivity().is_online(),
            report: &report,
            cursor,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in format_sync_report(&report, &cursor) {
        println!("{line}");
    }
    Ok(())
}

/// Keep probing and syncing until interrupted
pub async fn run_watch(config: &ClientConfig) -> Result<(), CliError> {
    let context = open_context(config).await?;
    let mut connectivity = context.connectivity().subscribe();
    let background = context.spawn_background_sync();
    println!(
        "Watching {} ({}); press Ctrl-C to stop",
        config.api_base_url.as_deref().unwrap_or_default(),
        connectivity_label(context.connectivity().state())
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow_and_update();
                let pending = context.queue().pending_count().await?;
                println!("{} ({pending} pending)", connectivity_label(state));
            }
        }
    }

    background.stop().await;
    let cursor = context.engine().cursor().await?;
    println!("Stopped with {} pending", cursor.pending_count);
    Ok(())
}

pub fn format_sync_report(report: &SyncReport, cursor: &SyncCursor) -> Vec<String> {
    let mut lines = Vec::new();
    if report.skipped {
        lines.push("Sync already in progress".to_string());
    } else if report.success {
        lines.push(format!("Synced {} entries", report.synced_count));
    } else {
        lines.push(format!(
            "Sync incomplete: {} entries synced",
            report.synced_count
        ));
        lines.extend(report.errors.iter().map(|error| format!("  {error}")));
    }
    lines.push(format!("Pending: {}", cursor.pending_count));
    if let Some(last_sync) = cursor.last_sync_time {
        lines.push(format!("Last successful sync: {last_sync}"));
    }
    lines
}

pub const fn connectivity_label(state: Connectivity) -> &'static str {
    match state {
        Connectivity::Online => "online",
        Connectivity::Offline => "offline",
    }
}

use std::path::PathBuf;

use serde::Serialize;
use till_core::config::ClientConfig;
use till_core::util::{non_blank, server_base_url, unix_millis_now};
use till_core::{ClientContext, LogEntry, LogId};

use crate::error::CliError;

/// Server used when neither `--api-url` nor `TILL_API_BASE_URL` is set
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListItem {
    pub local_id: i64,
    pub server_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub store: String,
    pub user: String,
    pub timestamp: i64,
    pub time: String,
    pub relative_time: String,
    pub message: String,
    pub synced: bool,
}

/// Environment configuration with CLI overrides and local defaults applied
pub fn load_config(
    db_path: Option<PathBuf>,
    api_url: Option<String>,
) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;

    if let Some(url) = api_url.as_deref().and_then(non_blank) {
        let url = server_base_url(&url).ok_or_else(|| {
            till_core::config::ConfigError::Invalid(
                "--api-url must start with http:// or https://".to_string(),
            )
        })?;
        config = config.with_api_base_url(url);
    } else if config.api_base_url.is_none() {
        config = config.with_api_base_url(DEFAULT_API_BASE_URL);
    }

    if let Some(path) = db_path {
        config = config.with_db_path(path);
    } else if config.db_path.is_none() {
        config = config.with_db_path(default_db_path()?);
    }

    Ok(config)
}

/// Open the client services, restore the persisted session and probe the server once
pub async fn open_context(config: &ClientConfig) -> Result<ClientContext, CliError> {
    let context = open_local(config).await?;
    let online = context.check_connectivity().await;
    tracing::debug!(online, "Probed log server");
    Ok(context)
}

/// Open the client services without contacting the server
pub async fn open_local(config: &ClientConfig) -> Result<ClientContext, CliError> {
    if let Some(parent) = config.db_path.as_deref().and_then(std::path::Path::parent) {
        std::fs::create_dir_all(parent)?;
    }

    let context = ClientContext::open(config.clone())?;
    context.logging().restore_session().await?;
    Ok(context)
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        till_core::config::ConfigError::Invalid(
            "could not resolve a data directory; pass --db-path or set TILL_DB_PATH".to_string(),
        )
    })?;
    Ok(data_dir.join("till").join("till.db"))
}

pub fn parse_log_id(value: &str) -> Result<LogId, CliError> {
    value
        .parse()
        .map_err(|_| CliError::InvalidLogId(value.trim().to_string()))
}

pub fn required_text(value: &str, error: CliError) -> Result<String, CliError> {
    non_blank(value).ok_or(error)
}

pub fn format_log_lines(entries: &[LogEntry]) -> Vec<String> {
    let now_ms = unix_millis_now();
    entries
        .iter()
        .map(|entry| {
            let marker = if entry.synced { ' ' } else { '*' };
            format!(
                "{marker}{:>6}  {:<22}  {:<10}  {}",
                entry.local_id,
                entry.kind.to_string(),
                format_relative_time(entry.timestamp, now_ms),
                entry.message
            )
        })
        .collect()
}

pub fn log_to_list_item(entry: &LogEntry) -> LogListItem {
    LogListItem {
        local_id: entry.local_id.get(),
        server_id: entry.server_id.clone(),
        kind: entry.kind.to_string(),
        store: entry.scope.clone(),
        user: entry.actor.clone(),
        timestamp: entry.timestamp,
        time: entry.display_time(),
        relative_time: format_relative_time(entry.timestamp, unix_millis_now()),
        message: entry.message.clone(),
        synced: entry.synced,
    }
}

pub fn print_entries(entries: &[LogEntry], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let items = entries.iter().map(log_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if entries.is_empty() {
        println!("No log entries");
    } else {
        for line in format_log_lines(entries) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

/// Print what the local log recorded and whether the server already has it
pub fn report_recorded(entry: Option<LogEntry>) -> Result<LogEntry, CliError> {
    let entry = entry.ok_or(CliError::NotRecorded)?;
    let status = if entry.synced { "sent" } else { "queued" };
    println!("#{} {} ({status})", entry.local_id, entry.message);
    Ok(entry)
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use till_core::EntityKind;

#[derive(Parser)]
#[command(name = "till")]
#[command(about = "Record, sync and undo back-office activity")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local log database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Log server base URL (overrides TILL_API_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a session; clears the local log
    SignIn {
        /// Store identifier
        #[arg(long)]
        store: String,
        /// User identifier
        #[arg(long)]
        user: String,
    },
    /// Register and start a session; clears the local log
    SignUp {
        #[arg(long)]
        store: String,
        #[arg(long)]
        user: String,
    },
    /// End the current session
    SignOut,
    /// Record a navigation event
    Navigate {
        destination: String,
    },
    /// Record an entity creation
    Created(EntityArgs),
    /// Record an entity update
    Updated(UpdateArgs),
    /// Record an entity deletion
    Deleted(EntityArgs),
    /// Record a new ordering of entities
    Reordered {
        #[arg(value_parser = parse_entity_kind)]
        kind: EntityKind,
        /// Entity names in their new order
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show the current session's log, newest first
    Recent {
        /// Include entries from before the current session
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entries not yet delivered to the server
    Pending {
        #[arg(long)]
        json: bool,
    },
    /// Push pending entries now
    Sync {
        #[arg(long)]
        json: bool,
    },
    /// Probe the server and sync in the background until Ctrl-C
    Watch,
    /// Ask the server to reverse a logged change
    Undo {
        /// Local entry id as shown by `till recent`
        local_id: String,
    },
    /// Wipe the local log and session
    Clear,
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct EntityArgs {
    #[arg(value_parser = parse_entity_kind)]
    pub kind: EntityKind,
    pub name: String,
    /// Durable entity id, when known
    #[arg(long)]
    pub id: Option<i64>,
    #[arg(long)]
    pub color: Option<String>,
    /// Tables of a place, seats of a table, menus of a category or options of a menu
    #[arg(long)]
    pub count: Option<i64>,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_entity_kind)]
    pub kind: EntityKind,
    /// Name before the update
    pub name: String,
    #[arg(long)]
    pub id: Option<i64>,
    /// New name
    #[arg(long)]
    pub rename: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
    #[arg(long)]
    pub previous_color: Option<String>,
    #[arg(long)]
    pub count: Option<i64>,
    #[arg(long)]
    pub previous_count: Option<i64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

pub fn parse_entity_kind(value: &str) -> Result<EntityKind, String> {
    value.parse().map_err(|_| {
        format!(
            "unknown entity kind `{value}` (expected one of: {})",
            EntityKind::ALL.map(EntityKind::as_str).join(", ")
        )
    })
}

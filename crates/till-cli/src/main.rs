//! Till CLI - record and inspect the back-office activity log
//!
//! Drives the same queue, sync engine and logging service a back-office UI
//! uses, which makes it handy for smoke tests against a log server.

mod cli;
mod commands;
mod error;


use clap::Parser;

use cli::{Cli, Commands};
use commands::common::load_config;
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("till=warn".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return commands::completions::run_completions(*shell, output.as_deref());
    }

    let config = load_config(cli.db_path, cli.api_url)?;
    match cli.command {
        Commands::SignIn { store, user } => commands::session::run_sign_in(&config, &store, &user, false).await,
        Commands::SignUp { store, user } => commands::session::run_sign_in(&config, &store, &user, true).await,
        Commands::SignOut => commands::session::run_sign_out(&config).await,
        Commands::Navigate { destination } => commands::session::run_navigate(&config, &destination).await,
        Commands::Created(args) => commands::entity::run_created(&config, &args).await,
        Commands::Updated(args) => commands::entity::run_updated(&config, &args).await,
        Commands::Deleted(args) => commands::entity::run_deleted(&config, &args).await,
        Commands::Reordered { kind, names } => commands::entity::run_reordered(&config, kind, &names).await,
        Commands::Recent { all, json } => commands::history::run_recent(&config, all, json).await,
        Commands::Pending { json } => commands::history::run_pending(&config, json).await,
        Commands::Clear => commands::history::run_clear(&config).await,
        Commands::Sync { json } => commands::sync::run_sync(&config, json).await,
        Commands::Watch => commands::sync::run_watch(&config).await,
        Commands::Undo { local_id } => commands::undo::run_undo(&config, &local_id).await,
        Commands::Completions { .. } => Ok(()),
    }
}

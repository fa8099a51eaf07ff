//! kanban - command-line client for a hosted Kanban board
//!
//! Every invocation signs in, waits for the board to load, runs one command
//! and prints the notifications it produced.

mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use db::{RemoteClient, RestAuth, RestGateway};
use services::services::{
    board::BoardService,
    config::{self, RemoteConfig},
    session::SessionGate,
};
use tracing_subscriber::{EnvFilter, prelude::*};

use commands::Command;

#[derive(Parser)]
#[command(name = "kanban")]
#[command(about = "Command-line client for a hosted Kanban board")]
struct Cli {
    /// Board configuration file
    #[arg(long, default_value = "kanban.json")]
    config: PathBuf,

    #[arg(long, env = "KANBAN_EMAIL")]
    email: String,

    #[arg(long, env = "KANBAN_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter_string = format!(
        "warn,kanban_cli={level},services={level},db={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).context("invalid RUST_LOG filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let cli = Cli::parse();

    let board_config = config::load_config_from_file(&cli.config).await.with_env();
    let remote = RemoteConfig::from_env()?;
    let client = Arc::new(RemoteClient::new(remote.url.as_str(), remote.api_key)?);
    let board = BoardService::new(Arc::new(RestGateway::new(client.clone())), board_config);
    let gate = SessionGate::new(Arc::new(RestAuth::new(client)), board.clone());
    let worker = gate.spawn();

    if matches!(cli.command, Command::SignUp) {
        let session = gate.sign_up(&cli.email, &cli.password).await?;
        if session.is_none() {
            println!("Check {} for a confirmation link", cli.email);
            return Ok(());
        }
    } else {
        gate.sign_in(&cli.email, &cli.password)
            .await
            .context("sign in failed")?;
    }
    let user = gate
        .until_loaded()
        .await
        .context("session ended before the board loaded")?;
    tracing::debug!(user = %user.email, "board ready");

    let result = commands::run(cli.command, &board, &user).await;
    commands::print_notifications(&board);

    if let Err(err) = gate.sign_out().await {
        tracing::warn!(error = %err, "sign out failed");
    }
    worker.abort();
    result
}

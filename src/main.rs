//! Callcenter Worker - backend for the call center administration app
//!
//! Serves the agent roster and call statistics over NATS. The same binary
//! offers one-shot import, export and cleanup commands.

mod admin;
mod auth;
mod cli;
mod commands;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use anyhow::Result;
use clap::Parser;
use sqlx::PgPool;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use cli::{Cli, Command};
use config::Config;
use types::CallStatisticFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,callcenter_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            connect_and_migrate(&config).await?;
            Ok(())
        }
        Command::CreateAdmin { email } => {
            let pool = connect_and_migrate(&config).await?;
            admin::create_admin_interactive(&pool, &email).await
        }
        Command::Import { kind, file, dry_run } => {
            let pool = connect_and_migrate(&config).await?;
            commands::import_file(&pool, kind, &file, dry_run).await?;
            Ok(())
        }
        Command::Export { out_dir, team, agent, service, from, to, columns } => {
            let pool = connect_and_migrate(&config).await?;
            let filter = CallStatisticFilter {
                team_name: team,
                agent,
                service_name: service,
                date_from: from,
                date_to: to,
                ..Default::default()
            };
            let out_dir = out_dir.unwrap_or_else(|| config.export_dir.clone());
            commands::export_statistics(&pool, &filter, &columns, &out_dir).await?;
            Ok(())
        }
        Command::DeleteAll { kind, yes } => {
            let pool = connect_and_migrate(&config).await?;
            commands::delete_all(&pool, kind, yes).await?;
            Ok(())
        }
    }
}

async fn connect_and_migrate(config: &Config) -> Result<PgPool> {
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Callcenter Worker...");

    let pool = connect_and_migrate(&config).await?;

    // Make sure the configured admin can log in
    admin::ensure_admin_from_env(&pool).await;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, pool, &config).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

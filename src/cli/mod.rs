use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::app::{app, AppState};
use crate::config::AppConfig;
use crate::database::store::{InMemoryStore, PostgresStore, WorkflowStore};
use crate::database::DatabaseManager;
use crate::is_production;
use crate::services::{IdGenerator, RandomIdGenerator, ReminderScheduler, WorkflowEngine};

#[derive(Parser)]
#[command(name = "rent-api")]
#[command(about = "Rent API - landlord/tenant workflow server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server and the reminder scheduler (default)")]
    Serve,

    #[command(about = "Apply database migrations and exit")]
    Migrate,

    #[command(about = "Send this month's rent reminders now")]
    Remind {
        #[arg(long, help = "Send even if this month's reminders already went out")]
        force: bool,
    },
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::Remind { force } => remind(config, force).await,
    }
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    if config.security.jwt_secret.is_empty() {
        if is_production!() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        warn!("JWT_SECRET is empty; every protected request will be rejected");
    }

    let store = open_store(config).await?;
    let ids: Arc<dyn IdGenerator> = Arc::new(RandomIdGenerator);
    let engine = WorkflowEngine::new(store.clone(), ids.clone());
    let state = AppState::new(engine, config.security.jwt_secret.as_str());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.scheduler.enabled {
        let scheduler = ReminderScheduler::new(store, ids, &config.scheduler);
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        info!("Reminder scheduler disabled");
        None
    };

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Rent API listening on http://{}", bind_addr);

    axum::serve(listener, app(state, &config.security))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Sender errors only mean the scheduler already exited.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        handle.await.context("reminder scheduler panicked")?;
    }
    info!("Rent API stopped");
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect(&config.database).await?;
    DatabaseManager::migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

async fn remind(config: &AppConfig, force: bool) -> anyhow::Result<()> {
    if config.database.url.is_none() {
        anyhow::bail!("DATABASE_URL must be set to send reminders");
    }
    let store = open_store(config).await?;
    let scheduler = ReminderScheduler::new(store, Arc::new(RandomIdGenerator), &config.scheduler);
    let report = scheduler.send_reminders(Utc::now(), force).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise a process-local in-memory store.
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn WorkflowStore>> {
    if config.database.url.is_none() {
        warn!("DATABASE_URL not set; using the in-memory store (state is lost on restart)");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let pool = DatabaseManager::connect(&config.database).await?;
    if config.database.run_migrations {
        DatabaseManager::migrate(&pool).await?;
    }
    Ok(Arc::new(PostgresStore::new(pool)))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rent_api::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    let config = rent_api::config::config();

    let default_filter = if config.api.enable_request_logging {
        "rent_api=info,tower_http=debug"
    } else {
        "rent_api=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    tracing::info!("Starting Rent API in {:?} mode", config.environment);

    cli::run(Cli::parse(), config).await
}

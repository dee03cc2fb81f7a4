use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use leadgrid_common::AppConfig;
use leadgrid_engine::{workers, EngineDeps};

#[derive(Parser)]
#[command(name = "leadgrid-engine", about = "Lead ingestion and website-disposition workers")]
struct Cli {
    /// Run the lease reaper and worker pools once migrations complete.
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("LeadGrid engine starting");

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    if !cli.skip_migrations {
        leadgrid_store::migrate(&pool).await?;
        tracing::info!("Migrations complete");
    }

    let deps = Arc::new(EngineDeps::live(config, pool)?);

    tokio::select! {
        _ = workers::run_worker_pools(deps) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received; in-flight leases will expire naturally");
        }
    }

    Ok(())
}

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use leadgrid_common::AppConfig;
use leadgrid_engine::EngineDeps;

mod routes;
mod webhook;

use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("LeadGrid server starting");

    let config = AppConfig::from_env()?;
    let bind_addr = format!("{}:{}", config.server_host, config.server_port);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    leadgrid_store::migrate(&pool).await?;
    tracing::info!("Migrations complete");

    let deps = EngineDeps::live(config, pool)?;
    let state = Arc::new(AppState { deps });

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

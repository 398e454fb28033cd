use anyhow::Context;
use tenancy_api::{app, config, database::DatabaseManager, init_tracing, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = config::config();
    config.validate().map_err(anyhow::Error::msg)?;
    info!("Starting Tenancy API in {:?} mode", config.environment);

    let database = DatabaseManager::connect(&config.database).await?;
    let state = AppState::new(config, database.clone());

    // Registry tables must exist before the first registration or login.
    let report = state
        .provisioning
        .migrate_shared()
        .await
        .context("migrating shared schema")?;
    info!(
        "Shared schema '{}' ready ({} applied)",
        report.schema,
        report.applied.len()
    );

    let app = app(state, config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("Tenancy API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

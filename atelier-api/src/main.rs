use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::worker::{EmailWorker, LogTransport};
use atelier_api::{app, AppState, Stores};
use atelier_store::app_config::Config;
use atelier_store::{DbClient, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Atelier API on port {}", config.server.port);

    let stores = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Stores::postgres(&db)
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            Stores::in_memory(MemoryStore::new())
        }
    };

    let worker = EmailWorker::new(
        stores.emails.clone(),
        Arc::new(LogTransport),
        config.email.retry_policy(),
        config.email.batch_size,
    );
    tokio::spawn(worker.run(std::time::Duration::from_secs(config.email.poll_interval_seconds.max(1))));

    let app = app(AppState::new(&stores, &config.business_rules));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::prelude::*;

use transit_core::adapters::{MemoryStore, NoopNotifier, PostgresStore, WebhookNotifier};
use transit_core::config::Config;
use transit_core::ports::Notifier;
use transit_core::services::ProgressBroadcast;
use transit_core::{AppState, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let notifier: Arc<dyn Notifier> = match &config.low_balance_webhook_url {
        Some(url) => {
            tracing::info!("low-balance alerts go to {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(NoopNotifier),
    };
    let realtime = Arc::new(ProgressBroadcast::new());

    let state = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;

            let migrator = Migrator::new(Path::new("./migrations")).await?;
            migrator.run(&pool).await?;
            tracing::info!("database migrations completed");

            AppState::from_store(Arc::new(PostgresStore::new(pool)), notifier, realtime)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            AppState::from_store(Arc::new(MemoryStore::new()), notifier, realtime)
        }
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

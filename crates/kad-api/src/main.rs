//! Kubernetes audit lifecycle API server.

use kad_api::config::Config;
use kad_api::server::{self, AppState};
use kad_store::InMemoryEventStore;
use kad_types::EventStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let store = open_store(&config)?;
    let state = Arc::new(AppState::new(store, config.fetch_timeout));

    let app = server::router(state);
    let addr: SocketAddr = config.listen.parse()?;
    tracing::info!("audit lifecycle API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn open_store(config: &Config) -> Result<Arc<dyn EventStore>, kad_types::StoreError> {
    match &config.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using sqlite event store");
            Ok(Arc::new(kad_store::SqliteEventStore::new(path)?))
        }
        None => Ok(Arc::new(InMemoryEventStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
fn open_store(config: &Config) -> Result<Arc<dyn EventStore>, kad_types::StoreError> {
    if let Some(path) = &config.db_path {
        tracing::warn!(
            path = %path.display(),
            "KAD_DB_PATH set but built without the sqlite feature; using in-memory store"
        );
    }
    Ok(Arc::new(InMemoryEventStore::new()))
}

use std::sync::Arc;

use anyhow::Context;
use monitoree_fhir::config::{AppConfig, StorageBackend};
use monitoree_fhir::db::{MemoryStore, PgStore, Store};
use monitoree_fhir::export::writer;
use monitoree_fhir::seed::Seed;
use monitoree_fhir::{build_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => Arc::new(
            PgStore::connect(&config.database)
                .await
                .context("failed to connect to PostgreSQL")?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; records are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(path) = &config.seed_file {
        Seed::from_file(path)
            .await?
            .load(store.as_ref())
            .await
            .with_context(|| format!("failed to load seed file {}", path.display()))?;
    }

    tokio::fs::create_dir_all(&config.export_dir)
        .await
        .with_context(|| format!("failed to create {}", config.export_dir.display()))?;
    let orphans = writer::remove_orphaned_dirs(&config.export_dir).await?;
    if orphans > 0 {
        tracing::info!("Removed {} export directories from a previous run", orphans);
    }

    let bind_addr = config.bind_addr.clone();
    let base_url = config.fhir_base();
    let app = build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("FHIR server listening on {} ({})", bind_addr, base_url);

    axum::serve(listener, app).await?;

    Ok(())
}

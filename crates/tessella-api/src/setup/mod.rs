//! Application setup and initialization.

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tessella_core::config::RegistryBackend;
use tessella_core::Config;
use tessella_pipeline::{
    AssetService, ConversionQueue, ConversionQueueConfig, Exporter, IngestService,
    TechnicalMetadataExtractor, VipsCliEngine,
};
use tessella_registry::{AssetRegistry, MemoryRegistry, PgAssetRegistry};
use tessella_storage::LocalStore;

use crate::state::AppState;

/// Wire registry, storage, and pipeline services, and build the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let registry = setup_registry(&config).await?;

    let store = LocalStore::new(&config.upload_dir)
        .await
        .context("Failed to initialize upload storage")?;

    let ingest = IngestService::new(registry.clone(), store.clone())
        .with_technical_extractor(TechnicalMetadataExtractor::new(&config.exiftool_path));
    let assets = AssetService::new(registry.clone(), store.clone());
    let queue = ConversionQueue::new(
        registry.clone(),
        Arc::new(VipsCliEngine::new(&config.vips_path)),
        ConversionQueueConfig {
            worker_count: config.worker_count,
            queue_depth: config.queue_depth,
            convert_extensions: config.convert_extensions.clone(),
        },
    );
    let exporter = Exporter::new(registry.clone(), config.source_organization.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        store,
        ingest,
        assets,
        queue,
        exporter,
    });

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}

async fn setup_registry(config: &Config) -> Result<Arc<dyn AssetRegistry>> {
    match config.registry_backend {
        RegistryBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required when REGISTRY_BACKEND=postgres")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(url)
                .await
                .context("Failed to connect to database")?;

            PgAssetRegistry::migrate(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!(
                max_connections = config.db_max_connections,
                "Connected to Postgres registry"
            );
            Ok(Arc::new(PgAssetRegistry::new(pool)))
        }
        RegistryBackend::Memory => {
            tracing::warn!("Using in-memory registry; records will not survive a restart");
            Ok(Arc::new(MemoryRegistry::new()))
        }
    }
}

//! Application state shared by all handlers.

use std::sync::Arc;

use tessella_core::Config;
use tessella_pipeline::{AssetService, ConversionQueue, Exporter, IngestService};
use tessella_registry::AssetRegistry;
use tessella_storage::LocalStore;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<dyn AssetRegistry>,
    pub store: LocalStore,
    pub ingest: IngestService,
    pub assets: AssetService,
    pub queue: ConversionQueue,
    pub exporter: Exporter,
}

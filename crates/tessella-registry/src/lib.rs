//! Asset Registry: the single persisted source of truth for asset identity,
//! storage location, size, status, and the open metadata map.
//!
//! The `AssetRegistry` trait decouples the pipeline from the persistence
//! backend. `PgAssetRegistry` is the production backend; `MemoryRegistry`
//! backs tests and single-process development deployments.
//!
//! Write discipline (see the concurrency model): the ingest gateway is the
//! only creator of records, and the conversion worker is the only component
//! that flips status or rewrites the locator. Components mutating metadata
//! across a long external call must re-fetch before `update` to avoid
//! clobbering concurrent writes.

mod memory;
mod postgres;

pub use memory::MemoryRegistry;
pub use postgres::PgAssetRegistry;

use async_trait::async_trait;
use tessella_core::{AppError, Asset, NewAsset};
use uuid::Uuid;

#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Insert a new record, assigning its id and creation timestamp.
    async fn create(&self, new_asset: NewAsset) -> Result<Asset, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Page through records in creation order.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>, AppError>;

    /// Write back a fetched record in full (fetch-mutate-write).
    async fn update(&self, asset: &Asset) -> Result<(), AppError>;

    /// Remove a record. Returns false when no row matched.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    async fn count(&self) -> Result<i64, AppError>;
}

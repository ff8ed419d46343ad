use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use tessella_core::{AppError, Asset, NewAsset};
use uuid::Uuid;

use crate::AssetRegistry;

const INSERT_ASSET: &str = r#"
    INSERT INTO assets (id, filename, file_path, file_size, content_type, status, metadata, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, filename, file_path, file_size, content_type, status, metadata, created_at
"#;

const SELECT_ASSET: &str = "SELECT id, filename, file_path, file_size, content_type, status, \
     metadata, created_at FROM assets WHERE id = $1";

const LIST_ASSETS: &str = "SELECT id, filename, file_path, file_size, content_type, status, \
     metadata, created_at FROM assets ORDER BY created_at ASC, id ASC OFFSET $1 LIMIT $2";

/// Postgres-backed registry.
#[derive(Clone)]
pub struct PgAssetRegistry {
    pool: PgPool,
}

impl PgAssetRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }
}

#[async_trait]
impl AssetRegistry for PgAssetRegistry {
    #[tracing::instrument(skip(self, new_asset), fields(db.table = "assets", db.operation = "insert"))]
    async fn create(&self, new_asset: NewAsset) -> Result<Asset, AppError> {
        let asset = sqlx::query_as::<Postgres, Asset>(INSERT_ASSET)
        .bind(Uuid::new_v4())
        .bind(&new_asset.filename)
        .bind(&new_asset.file_path)
        .bind(new_asset.file_size)
        .bind(&new_asset.content_type)
        .bind(new_asset.status)
        .bind(&new_asset.metadata)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(asset)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "select", db.record_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let asset = sqlx::query_as::<Postgres, Asset>(SELECT_ASSET)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(asset)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "select"))]
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>, AppError> {
        let assets = sqlx::query_as::<Postgres, Asset>(LIST_ASSETS)
        .bind(offset.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }

    #[tracing::instrument(skip(self, asset), fields(db.table = "assets", db.operation = "update", db.record_id = %asset.id))]
    async fn update(&self, asset: &Asset) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET filename = $2, file_path = $3, file_size = $4, content_type = $5,
                status = $6, metadata = $7
            WHERE id = $1
            "#,
        )
        .bind(asset.id)
        .bind(&asset.filename)
        .bind(&asset.file_path)
        .bind(asset.file_size)
        .bind(&asset.content_type)
        .bind(asset.status)
        .bind(&asset.metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset {}", asset.id)));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "delete", db.record_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM assets")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

use crate::store::{MemoryRecordStore, PostgresRecordStore, RecordStore, StoreError, StoreResult};
use heirloom_core::{Config, RecordStoreBackend};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// Create the record store selected by configuration, running migrations for PostgreSQL.
pub async fn create_record_store(config: &Config) -> StoreResult<Arc<dyn RecordStore>> {
    match config.record_store_backend {
        RecordStoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| StoreError::Backend("DATABASE_URL not configured".to_string()))?;

            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect(database_url)
                .await?;

            tracing::info!(
                max_connections = config.db_max_connections,
                "Database connected successfully"
            );

            let store = PostgresRecordStore::new(pool);
            store.migrate().await?;
            tracing::info!("Database migrations applied");

            Ok(Arc::new(store))
        }
        RecordStoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; records are lost on exit");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}

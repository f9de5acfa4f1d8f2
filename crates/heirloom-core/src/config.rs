//! Configuration module
//!
//! Settings for the object store, the record store, the extraction service, and the
//! ingestion pipeline, all read from the environment.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const EXTRACTION_MODEL: &str = "claude-sonnet-4-20250514";
const EXTRACTION_MAX_TOKENS: u32 = 4096;
const EXTRACTION_TIMEOUT_SECS: u64 = 120;
const STAGING_FETCH_CONCURRENCY: usize = 4;
const MAX_PART_SIZE_MB: usize = 50;

/// Backend holding drafts, letters, and versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreBackend {
    Postgres,
    Memory,
}

impl FromStr for RecordStoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(RecordStoreBackend::Postgres),
            "memory" => Ok(RecordStoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid record store backend: {}", s)),
        }
    }
}

impl Display for RecordStoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RecordStoreBackend::Postgres => write!(f, "postgres"),
            RecordStoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    // Object storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Record store
    pub record_store_backend: RecordStoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Extraction service
    pub anthropic_api_key: Option<String>,
    pub extraction_model: String,
    pub extraction_max_tokens: u32,
    pub extraction_timeout_secs: u64,
    // Pipeline
    pub staging_fetch_concurrency: usize,
    pub max_part_size_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::S3);

        let record_store_backend = env::var("RECORD_STORE_BACKEND")
            .ok()
            .map(|s| s.parse::<RecordStoreBackend>())
            .transpose()?
            .unwrap_or(RecordStoreBackend::Postgres);

        let max_part_size_mb = env::var("MAX_PART_SIZE_MB")
            .unwrap_or_else(|_| MAX_PART_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_PART_SIZE_MB);

        let config = Config {
            environment,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            record_store_backend,
            database_url: env::var("DATABASE_URL").ok(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| EXTRACTION_MODEL.to_string()),
            extraction_max_tokens: env::var("EXTRACTION_MAX_TOKENS")
                .unwrap_or_else(|_| EXTRACTION_MAX_TOKENS.to_string())
                .parse()
                .unwrap_or(EXTRACTION_MAX_TOKENS),
            extraction_timeout_secs: env::var("EXTRACTION_TIMEOUT_SECS")
                .unwrap_or_else(|_| EXTRACTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(EXTRACTION_TIMEOUT_SECS),
            staging_fetch_concurrency: env::var("STAGING_FETCH_CONCURRENCY")
                .unwrap_or_else(|_| STAGING_FETCH_CONCURRENCY.to_string())
                .parse()
                .unwrap_or(STAGING_FETCH_CONCURRENCY),
            max_part_size_bytes: max_part_size_mb * 1024 * 1024,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Region for the S3 backend, preferring `S3_REGION` over `AWS_REGION`.
    pub fn region(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.record_store_backend == RecordStoreBackend::Postgres {
            match self.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                _ => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
            }
        }

        if self.anthropic_api_key.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow::anyhow!(
                "ANTHROPIC_API_KEY must be set for the extraction service"
            ));
        }

        if self.extraction_timeout_secs == 0 {
            return Err(anyhow::anyhow!("EXTRACTION_TIMEOUT_SECS must be greater than 0"));
        }

        if self.staging_fetch_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "STAGING_FETCH_CONCURRENCY must be greater than 0"
            ));
        }

        Ok(())
    }
}

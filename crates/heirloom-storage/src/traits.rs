//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heirloom_core::AppError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::IoError(err) => AppError::Storage(format!("IO error: {}", err)),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait, so the
/// stager, pipeline, and publish coordinator work against any backend. Handles are
/// constructed once by the entry point and shared as `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List every object below `prefix`, in ascending key order.
    ///
    /// `prefix` is matched by whole path segments: `staging/u1/` never lists `staging/u10/`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Download a file by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Upload data to a specific storage key, replacing any existing object.
    /// Returns the URL of the uploaded file.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Delete a file by its storage key. Deleting a missing key is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Copy a file from one key to another
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: AppError = StorageError::NotFound("staging/u1/1.jpg".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = StorageError::InvalidKey("..".to_string()).into();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err: AppError = StorageError::UploadFailed("timeout".to_string()).into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}

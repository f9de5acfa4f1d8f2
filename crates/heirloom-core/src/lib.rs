//! Heirloom Core Library
//!
//! This crate provides the domain models, the storage addressing scheme, error types,
//! and configuration shared by every Heirloom component.

pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, RecordStoreBackend};
pub use error::{AppError, ErrorCategory, ErrorMetadata, LogLevel};
pub use keys::{Address, AddressPrefix, EntityKind, KeyError};
pub use storage_types::StorageBackend;

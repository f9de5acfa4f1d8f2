//! Heirloom Storage Library
//!
//! This crate provides the object storage abstraction and its implementations for S3 and
//! the local filesystem.
//!
//! # Storage key format
//!
//! All backends use the same key layout:
//!
//! - **Raw parts of an upload**: `staging/{upload_id}/{filename}`
//! - **Merged document**: `staging/{upload_id}/merged.pdf`
//! - **Published letter PDF**: `letters/{date}/{date}.pdf`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use heirloom_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectInfo, Storage, StorageError, StorageResult};

//! Record store contract
//!
//! A key-value store addressed by [`Address`], with point reads and writes, conditional
//! writes, and ordered prefix queries with resumable cursors. Every record carries a
//! revision that increases by one on each successful write, which is what
//! [`WriteCondition::RevisionEquals`] compares against.

mod memory;
mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PostgresRecordStore;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use heirloom_core::{Address, AddressPrefix, AppError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Record store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCursor(msg) => AppError::InvalidInput(format!("Invalid cursor: {}", msg)),
            other => AppError::Store(other.to_string()),
        }
    }
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub address: Address,
    pub data: serde_json::Value,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

/// Precondition of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Nothing is stored at the address yet
    NotExists,
    /// The stored record is at exactly this revision
    RevisionEquals(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Opaque pagination token, round-tripping the last address of the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub Address);

impl Cursor {
    pub fn encode(&self) -> String {
        // Address serialization cannot fail: two string fields.
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> StoreResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
        let address: Address = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
        Ok(Cursor(address))
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub order: SortOrder,
    pub limit: usize,
    /// Resume strictly after (ascending) or before (descending) this address
    pub cursor: Option<Cursor>,
}

impl QueryOptions {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(order: SortOrder, limit: usize) -> Self {
        Self {
            order,
            limit,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Limit clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    /// Cursor sort key, rejecting cursors taken from another partition or scope.
    fn cursor_sk(&self, prefix: &AddressPrefix) -> StoreResult<Option<&str>> {
        match &self.cursor {
            None => Ok(None),
            Some(Cursor(address)) if prefix.matches(address) => Ok(Some(address.sk.as_str())),
            Some(Cursor(address)) => Err(StoreError::InvalidCursor(format!(
                "{} is outside {}",
                address, prefix
            ))),
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(SortOrder::Ascending, Self::DEFAULT_LIMIT)
    }
}

/// One page of a prefix query. `next_cursor` is set only when more records follow.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// Build a page from up to `limit + 1` fetched records.
    fn from_overfetch(mut records: Vec<Record>, limit: usize) -> Self {
        let next_cursor = if records.len() > limit {
            records.truncate(limit);
            records.last().map(|r| Cursor(r.address.clone()))
        } else {
            None
        };
        Page {
            records,
            next_cursor,
        }
    }
}

/// Shared record store, injected into repositories as `Arc<dyn RecordStore>`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, address: &Address) -> StoreResult<Option<Record>>;

    /// Unconditional upsert.
    async fn put(&self, address: &Address, data: serde_json::Value) -> StoreResult<Record>;

    /// Write only if `condition` holds. Returns `None` when it did not, leaving the
    /// stored record untouched.
    async fn put_if(
        &self,
        address: &Address,
        data: serde_json::Value,
        condition: WriteCondition,
    ) -> StoreResult<Option<Record>>;

    /// Returns whether a record was removed.
    async fn delete(&self, address: &Address) -> StoreResult<bool>;

    /// Remove the record only if it is still at `revision`.
    async fn delete_if(&self, address: &Address, revision: i64) -> StoreResult<bool>;

    /// Records whose address lies within `prefix`, ordered by sort key.
    async fn query(&self, prefix: &AddressPrefix, options: QueryOptions) -> StoreResult<Page>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = Cursor(Address::new("LETTER#1943-05-02", "VERSION#2025-01-15T10:00:00.000Z"));
        let token = cursor.encode();
        assert!(!token.contains('/'));
        assert!(!token.contains('+'));
        assert_eq!(Cursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn test_garbage_cursor_rejected() {
        assert!(matches!(
            Cursor::decode("not a cursor!"),
            Err(StoreError::InvalidCursor(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"plain");
        assert!(Cursor::decode(&not_json).is_err());
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(QueryOptions::new(SortOrder::Ascending, 0).effective_limit(), 1);
        assert_eq!(
            QueryOptions::new(SortOrder::Ascending, 10_000).effective_limit(),
            QueryOptions::MAX_LIMIT
        );
    }

    #[test]
    fn test_invalid_cursor_maps_to_invalid_input() {
        let err: AppError = StoreError::InvalidCursor("bad".to_string()).into();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err: AppError = StoreError::Backend("down".to_string()).into();
        assert!(matches!(err, AppError::Store(_)));
    }
}

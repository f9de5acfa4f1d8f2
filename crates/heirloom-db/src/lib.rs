//! Record store and repositories
//!
//! Drafts, letters, and letter versions all live in one key-value record store addressed
//! through `heirloom_core::keys`. The `store` module defines the `RecordStore` contract and
//! its PostgreSQL and in-memory backends; repositories map domain models onto it.

pub mod factory;
pub mod repositories;
pub mod store;

pub use factory::create_record_store;
pub use repositories::{DraftRepository, LetterRepository, VersionPage, Versioned};
pub use store::{
    Cursor, MemoryRecordStore, Page, PostgresRecordStore, QueryOptions, Record, RecordStore,
    SortOrder, StoreError, StoreResult, WriteCondition,
};

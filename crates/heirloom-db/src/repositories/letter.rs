use super::Versioned;
use crate::store::{Cursor, QueryOptions, Record, RecordStore, SortOrder, WriteCondition};
use heirloom_core::models::{Letter, LetterVersion};
use heirloom_core::{keys, AppError};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One page of a letter's version history.
#[derive(Debug, Clone)]
pub struct VersionPage {
    pub versions: Vec<LetterVersion>,
    /// Opaque token for the next page, absent on the last page
    pub next_cursor: Option<String>,
}

/// Repository for letters: the current pointer and the append-only version history.
#[derive(Clone)]
pub struct LetterRepository {
    store: Arc<dyn RecordStore>,
}

fn decode<T: DeserializeOwned>(record: Record) -> Result<T, AppError> {
    serde_json::from_value(record.data).map_err(|e| {
        AppError::Internal(format!("Corrupt record {}: {}", record.address, e))
    })
}

impl LetterRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn get_current(&self, date: &str) -> Result<Option<Versioned<Letter>>, AppError> {
        let address = keys::letter_current(date)?;
        match self.store.get(&address).await? {
            Some(record) => {
                let revision = record.revision;
                Ok(Some(Versioned {
                    value: decode(record)?,
                    revision,
                }))
            }
            None => Ok(None),
        }
    }

    /// Write the current pointer. With `expected_revision` of `None` the pointer must not
    /// exist yet; otherwise it must still be at that revision. Returns whether it was written.
    #[tracing::instrument(skip(self, letter), fields(db.table = "records", date = %letter.date, current_version = %letter.current_version))]
    pub async fn put_current(
        &self,
        letter: &Letter,
        expected_revision: Option<i64>,
    ) -> Result<bool, AppError> {
        let address = keys::letter_current(&letter.date)?;
        let condition = match expected_revision {
            None => WriteCondition::NotExists,
            Some(revision) => WriteCondition::RevisionEquals(revision),
        };
        let written = self
            .store
            .put_if(&address, serde_json::to_value(letter)?, condition)
            .await?;
        Ok(written.is_some())
    }

    /// Append a version. Returns `false` if one already exists at the same timestamp.
    #[tracing::instrument(skip(self, version), fields(db.table = "records", date = %version.date, timestamp = %version.timestamp))]
    pub async fn create_version(&self, version: &LetterVersion) -> Result<bool, AppError> {
        let address = keys::letter_version(&version.date, &version.timestamp)?;
        let written = self
            .store
            .put_if(&address, serde_json::to_value(version)?, WriteCondition::NotExists)
            .await?;
        Ok(written.is_some())
    }

    /// Remove a version that never became current.
    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn delete_unreferenced_version(
        &self,
        date: &str,
        timestamp: &str,
    ) -> Result<bool, AppError> {
        let address = keys::letter_version(date, timestamp)?;
        Ok(self.store.delete(&address).await?)
    }

    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn get_version(
        &self,
        date: &str,
        timestamp: &str,
    ) -> Result<Option<LetterVersion>, AppError> {
        let address = keys::letter_version(date, timestamp)?;
        match self.store.get(&address).await? {
            Some(record) => Ok(Some(decode(record)?)),
            None => Ok(None),
        }
    }

    /// Most recent version of a letter, if any.
    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn latest_version(&self, date: &str) -> Result<Option<LetterVersion>, AppError> {
        let page = self
            .store
            .query(
                &keys::letter_versions(date)?,
                QueryOptions::new(SortOrder::Descending, 1),
            )
            .await?;
        page.records
            .into_iter()
            .next()
            .map(decode::<LetterVersion>)
            .transpose()
    }

    #[tracing::instrument(skip(self, cursor), fields(db.table = "records"))]
    pub async fn list_versions(
        &self,
        date: &str,
        order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<VersionPage, AppError> {
        let cursor = cursor.map(Cursor::decode).transpose()?;
        let page = self
            .store
            .query(
                &keys::letter_versions(date)?,
                QueryOptions::new(order, limit).with_cursor(cursor),
            )
            .await?;

        Ok(VersionPage {
            versions: page
                .records
                .into_iter()
                .map(decode::<LetterVersion>)
                .collect::<Result<_, _>>()?,
            next_cursor: page.next_cursor.map(|c| c.encode()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use chrono::Utc;
    use heirloom_core::models::LetterContent;

    const DATE: &str = "1943-05-02";

    fn version(ts: &str, text: &str) -> LetterVersion {
        LetterVersion {
            date: DATE.to_string(),
            timestamp: ts.to_string(),
            body: LetterContent {
                title: "From the front".to_string(),
                author: "Walter".to_string(),
                content: text.to_string(),
            },
            pdf_key: None,
            editor: None,
            source_upload_id: None,
            restored_from: None,
            created_at: Utc::now(),
        }
    }

    fn repo() -> LetterRepository {
        LetterRepository::new(Arc::new(MemoryRecordStore::new()))
    }

    #[tokio::test]
    async fn test_versions_are_append_only() {
        let repo = repo();
        let v1 = version("2025-01-15T10:00:00.000Z", "first");

        assert!(repo.create_version(&v1).await.unwrap());
        assert!(!repo
            .create_version(&version("2025-01-15T10:00:00.000Z", "clobber"))
            .await
            .unwrap());

        let stored = repo
            .get_version(DATE, "2025-01-15T10:00:00.000Z")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body.content, "first");
    }

    #[tokio::test]
    async fn test_current_pointer_compare_and_set() {
        let repo = repo();
        let v1 = version("2025-01-15T10:00:00.000Z", "first");
        let letter = Letter::pointing_at(&v1, None);

        assert!(repo.put_current(&letter, None).await.unwrap());
        assert!(!repo.put_current(&letter, None).await.unwrap());

        let current = repo.get_current(DATE).await.unwrap().unwrap();
        let v2 = version("2025-01-16T10:00:00.000Z", "second");
        let next = Letter::pointing_at(&v2, Some(&current.value));

        assert!(repo.put_current(&next, Some(current.revision)).await.unwrap());
        // Second writer holding the same stale revision loses
        assert!(!repo.put_current(&next, Some(current.revision)).await.unwrap());
        assert_eq!(
            repo.get_current(DATE).await.unwrap().unwrap().value.current_version,
            "2025-01-16T10:00:00.000Z"
        );
    }

    #[tokio::test]
    async fn test_latest_and_paginated_history() {
        let repo = repo();
        assert!(repo.latest_version(DATE).await.unwrap().is_none());

        for (i, ts) in [
            "2025-01-15T10:00:00.000Z",
            "2025-01-15T10:00:00.001Z",
            "2025-02-01T08:30:00.000Z",
        ]
        .iter()
        .enumerate()
        {
            repo.create_version(&version(ts, &format!("v{}", i)))
                .await
                .unwrap();
        }

        let latest = repo.latest_version(DATE).await.unwrap().unwrap();
        assert_eq!(latest.body.content, "v2");

        let first = repo
            .list_versions(DATE, SortOrder::Ascending, 2, None)
            .await
            .unwrap();
        assert_eq!(first.versions.len(), 2);
        assert_eq!(first.versions[0].body.content, "v0");
        let token = first.next_cursor.unwrap();

        let second = repo
            .list_versions(DATE, SortOrder::Ascending, 2, Some(&token))
            .await
            .unwrap();
        assert_eq!(second.versions.len(), 1);
        assert_eq!(second.versions[0].body.content, "v2");
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_bad_cursor_is_invalid_input() {
        let result = repo()
            .list_versions(DATE, SortOrder::Ascending, 10, Some("%%%"))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_delete_unreferenced_version() {
        let repo = repo();
        let v1 = version("2025-01-15T10:00:00.000Z", "orphan");
        repo.create_version(&v1).await.unwrap();

        assert!(repo
            .delete_unreferenced_version(DATE, &v1.timestamp)
            .await
            .unwrap());
        assert!(repo.latest_version(DATE).await.unwrap().is_none());
    }
}

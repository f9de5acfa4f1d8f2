use super::Versioned;
use crate::store::{RecordStore, WriteCondition};
use heirloom_core::models::Draft;
use heirloom_core::{keys, AppError};
use std::sync::Arc;

/// Repository for drafts, one record per upload.
#[derive(Clone)]
pub struct DraftRepository {
    store: Arc<dyn RecordStore>,
}

impl DraftRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Write the draft at its upload's address, replacing any earlier outcome.
    #[tracing::instrument(skip(self, draft), fields(db.table = "records", upload_id = %draft.upload_id, status = %draft.status))]
    pub async fn put(&self, draft: &Draft) -> Result<(), AppError> {
        let address = keys::draft(&draft.upload_id)?;
        let data = serde_json::to_value(draft)?;
        self.store.put(&address, data).await?;
        Ok(())
    }

    pub async fn get(&self, upload_id: &str) -> Result<Option<Draft>, AppError> {
        Ok(self.get_versioned(upload_id).await?.map(|d| d.value))
    }

    /// Draft with the revision [`take`](Self::take) expects.
    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn get_versioned(&self, upload_id: &str) -> Result<Option<Versioned<Draft>>, AppError> {
        let address = keys::draft(upload_id)?;
        match self.store.get(&address).await? {
            Some(record) => {
                let revision = record.revision;
                let value = serde_json::from_value(record.data).map_err(|e| {
                    AppError::Internal(format!("Corrupt draft record {}: {}", address, e))
                })?;
                Ok(Some(Versioned { value, revision }))
            }
            None => Ok(None),
        }
    }

    /// Remove the draft only if it is still at `revision`. Returns `false` when another
    /// writer consumed or replaced it first.
    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn take(&self, upload_id: &str, revision: i64) -> Result<bool, AppError> {
        let address = keys::draft(upload_id)?;
        Ok(self.store.delete_if(&address, revision).await?)
    }

    /// Put back a draft consumed by [`take`](Self::take), unless a newer one was written
    /// since. Returns whether it was written.
    #[tracing::instrument(skip(self, draft), fields(db.table = "records", upload_id = %draft.upload_id))]
    pub async fn restore(&self, draft: &Draft) -> Result<bool, AppError> {
        let address = keys::draft(&draft.upload_id)?;
        let data = serde_json::to_value(draft)?;
        let written = self
            .store
            .put_if(&address, data, WriteCondition::NotExists)
            .await?;
        Ok(written.is_some())
    }

    /// Remove the draft. Returns whether one existed.
    #[tracing::instrument(skip(self), fields(db.table = "records"))]
    pub async fn delete(&self, upload_id: &str) -> Result<bool, AppError> {
        let address = keys::draft(upload_id)?;
        Ok(self.store.delete(&address).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use heirloom_core::models::DraftStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_overwrites_single_record() {
        let store = MemoryRecordStore::new();
        let repo = DraftRepository::new(Arc::new(store.clone()));

        repo.put(&Draft::failed("u1", "user-1", None, "boom"))
            .await
            .unwrap();
        repo.put(&Draft::review("u1", "user-1", "staging/u1/merged.pdf", json!({"text": "hi"})))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let draft = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Review);
        assert_eq!(draft.error, None);
    }

    #[tokio::test]
    async fn test_get_missing_and_delete() {
        let repo = DraftRepository::new(Arc::new(MemoryRecordStore::new()));
        assert!(repo.get("nope").await.unwrap().is_none());

        repo.put(&Draft::failed("u1", "user-1", None, "boom"))
            .await
            .unwrap();
        assert!(repo.delete("u1").await.unwrap());
        assert!(repo.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_succeeds_once_per_revision() {
        let repo = DraftRepository::new(Arc::new(MemoryRecordStore::new()));
        repo.put(&Draft::review("u1", "user-1", "staging/u1/merged.pdf", json!({"text": "hi"})))
            .await
            .unwrap();

        let first = repo.get_versioned("u1").await.unwrap().unwrap();
        let second = repo.get_versioned("u1").await.unwrap().unwrap();
        assert_eq!(first.revision, second.revision);

        assert!(repo.take("u1", first.revision).await.unwrap());
        assert!(!repo.take("u1", second.revision).await.unwrap());
        assert!(repo.get("u1").await.unwrap().is_none());

        assert!(repo.restore(&first.value).await.unwrap());
        assert!(!repo.restore(&first.value).await.unwrap());
        assert_eq!(repo.get("u1").await.unwrap().unwrap(), first.value);
    }

    #[tokio::test]
    async fn test_empty_upload_id_is_invalid_input() {
        let repo = DraftRepository::new(Arc::new(MemoryRecordStore::new()));
        assert!(matches!(repo.get("").await, Err(AppError::InvalidInput(_))));
    }
}

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use heirloom_core::models::Draft;
use heirloom_core::{Address, AddressPrefix};
use heirloom_db::{
    DraftRepository, LetterRepository, MemoryRecordStore, Page, QueryOptions, Record,
    RecordStore, StoreResult, WriteCondition,
};
use heirloom_processing::ObjectStager;
use heirloom_services::{
    ExtractionClient, ExtractionError, IngestionPipeline, PublishCoordinator,
};
use heirloom_storage::{LocalStorage, Storage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const MAX_PART_SIZE: usize = 10 * 1024 * 1024;

/// How the scripted extraction service answers.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(Value),
    Fail(String),
    Hang,
}

/// Extraction double that answers from a script and remembers what it was sent.
pub struct ScriptedExtractionClient {
    script: Script,
    calls: AtomicUsize,
    last_document: Mutex<Option<Vec<u8>>>,
}

impl ScriptedExtractionClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_document: Mutex::new(None),
        })
    }

    pub fn transcribing() -> Arc<Self> {
        Self::new(Script::Succeed(json!({
            "content": "Dear Mother, the weather here is fine.",
            "author": "Walter",
            "date": "1943-05-02",
        })))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_document(&self) -> Option<Vec<u8>> {
        self.last_document.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionClient for ScriptedExtractionClient {
    async fn extract(&self, document: &[u8]) -> Result<Value, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_document.lock().unwrap() = Some(document.to_vec());

        match &self.script {
            Script::Succeed(value) => Ok(value.clone()),
            Script::Fail(message) => Err(ExtractionError::Api {
                status: 500,
                body: message.clone(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({}))
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Write another client makes at a contested address.
#[derive(Debug, Clone)]
pub enum Interleave {
    Put(Value),
    Delete,
}

/// Record store that lets another client write at `address` right before the first
/// conditional write or delete there, after the caller has read it.
pub struct InterleavingRecordStore {
    inner: Arc<MemoryRecordStore>,
    address: Address,
    pending: Mutex<Option<Interleave>>,
}

impl InterleavingRecordStore {
    pub fn new(inner: Arc<MemoryRecordStore>, address: Address, write: Interleave) -> Arc<Self> {
        Arc::new(Self {
            inner,
            address,
            pending: Mutex::new(Some(write)),
        })
    }

    async fn interleave(&self, address: &Address) -> StoreResult<()> {
        if address != &self.address {
            return Ok(());
        }
        let pending = self.pending.lock().unwrap().take();
        match pending {
            Some(Interleave::Put(data)) => {
                self.inner.put(address, data).await?;
            }
            Some(Interleave::Delete) => {
                self.inner.delete(address).await?;
            }
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InterleavingRecordStore {
    async fn get(&self, address: &Address) -> StoreResult<Option<Record>> {
        self.inner.get(address).await
    }

    async fn put(&self, address: &Address, data: Value) -> StoreResult<Record> {
        self.inner.put(address, data).await
    }

    async fn put_if(
        &self,
        address: &Address,
        data: Value,
        condition: WriteCondition,
    ) -> StoreResult<Option<Record>> {
        self.interleave(address).await?;
        self.inner.put_if(address, data, condition).await
    }

    async fn delete(&self, address: &Address) -> StoreResult<bool> {
        self.inner.delete(address).await
    }

    async fn delete_if(&self, address: &Address, revision: i64) -> StoreResult<bool> {
        self.interleave(address).await?;
        self.inner.delete_if(address, revision).await
    }

    async fn query(&self, prefix: &AddressPrefix, options: QueryOptions) -> StoreResult<Page> {
        self.inner.query(prefix, options).await
    }
}

/// Local storage and an in-memory record store, isolated per test.
pub struct TestEnv {
    pub storage: Arc<dyn Storage>,
    pub records: Arc<MemoryRecordStore>,
    pub drafts: DraftRepository,
    pub letters: LetterRepository,
    pub _temp_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(temp_dir.path(), "http://localhost:3000/files".to_string())
                .await
                .unwrap(),
        );
        let records = Arc::new(MemoryRecordStore::new());
        let store: Arc<dyn RecordStore> = records.clone();

        Self {
            storage,
            drafts: DraftRepository::new(store.clone()),
            letters: LetterRepository::new(store),
            records,
            _temp_dir: temp_dir,
        }
    }

    pub fn pipeline(&self, extraction: Arc<dyn ExtractionClient>) -> IngestionPipeline {
        self.pipeline_with_timeout(extraction, Duration::from_secs(5))
    }

    pub fn pipeline_with_timeout(
        &self,
        extraction: Arc<dyn ExtractionClient>,
        timeout: Duration,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            ObjectStager::new(self.storage.clone(), 2, MAX_PART_SIZE),
            self.storage.clone(),
            extraction,
            self.drafts.clone(),
            timeout,
        )
    }

    pub fn coordinator(&self) -> PublishCoordinator {
        PublishCoordinator::new(
            self.letters.clone(),
            self.drafts.clone(),
            self.storage.clone(),
        )
    }

    /// Coordinator whose letter and draft records go through `store`.
    pub fn coordinator_over(&self, store: Arc<dyn RecordStore>) -> PublishCoordinator {
        PublishCoordinator::new(
            LetterRepository::new(store.clone()),
            DraftRepository::new(store),
            self.storage.clone(),
        )
    }

    /// Every object published under `letters/<date>/`.
    pub async fn letter_pdfs(&self, date: &str) -> Vec<String> {
        self.storage
            .list(&format!("letters/{}/", date))
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.key)
            .collect()
    }

    /// Put one raw part under the upload's staging scope.
    pub async fn stage(&self, upload_id: &str, filename: &str, bytes: Vec<u8>) {
        let key = format!("staging/{}/{}", upload_id, filename);
        self.storage
            .upload_with_key(&key, bytes, "application/octet-stream")
            .await
            .unwrap();
    }

    /// A REVIEW draft with its merged document already stored.
    pub async fn review_draft(&self, upload_id: &str) -> Draft {
        let merged_key = format!("staging/{}/merged.pdf", upload_id);
        self.storage
            .upload_with_key(&merged_key, fixtures::pdf(1, 612), "application/pdf")
            .await
            .unwrap();
        let draft = Draft::review(
            upload_id,
            "requester-1",
            merged_key,
            json!({"content": "Dear Mother"}),
        );
        self.drafts.put(&draft).await.unwrap();
        draft
    }
}

use super::{Page, QueryOptions, Record, RecordStore, SortOrder, StoreResult, WriteCondition};
use async_trait::async_trait;
use chrono::Utc;
use heirloom_core::{Address, AddressPrefix};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process record store with the same conditional-write and pagination behavior as
/// the PostgreSQL backend. Used for tests and single-process runs.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<BTreeMap<Address, Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    fn next_record(address: &Address, data: serde_json::Value, previous: Option<&Record>) -> Record {
        Record {
            address: address.clone(),
            data,
            revision: previous.map_or(1, |r| r.revision + 1),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, address: &Address) -> StoreResult<Option<Record>> {
        Ok(self.records.lock().await.get(address).cloned())
    }

    async fn put(&self, address: &Address, data: serde_json::Value) -> StoreResult<Record> {
        let mut records = self.records.lock().await;
        let record = Self::next_record(address, data, records.get(address));
        records.insert(address.clone(), record.clone());
        Ok(record)
    }

    async fn put_if(
        &self,
        address: &Address,
        data: serde_json::Value,
        condition: WriteCondition,
    ) -> StoreResult<Option<Record>> {
        let mut records = self.records.lock().await;
        let current = records.get(address);

        let holds = match condition {
            WriteCondition::NotExists => current.is_none(),
            WriteCondition::RevisionEquals(revision) => {
                current.is_some_and(|r| r.revision == revision)
            }
        };
        if !holds {
            return Ok(None);
        }

        let record = Self::next_record(address, data, current);
        records.insert(address.clone(), record.clone());
        Ok(Some(record))
    }

    async fn delete(&self, address: &Address) -> StoreResult<bool> {
        Ok(self.records.lock().await.remove(address).is_some())
    }

    async fn delete_if(&self, address: &Address, revision: i64) -> StoreResult<bool> {
        let mut records = self.records.lock().await;
        if !records.get(address).is_some_and(|r| r.revision == revision) {
            return Ok(false);
        }
        Ok(records.remove(address).is_some())
    }

    async fn query(&self, prefix: &AddressPrefix, options: QueryOptions) -> StoreResult<Page> {
        let cursor_sk = options.cursor_sk(prefix)?;
        let limit = options.effective_limit();
        let records = self.records.lock().await;

        // Addresses sharing a prefix are contiguous in (pk, sk) order.
        let start = Address::new(prefix.pk.clone(), prefix.sk_prefix.clone());
        let in_scope = records
            .range(start..)
            .take_while(|(address, _)| prefix.matches(address))
            .map(|(_, record)| record);

        let fetched: Vec<Record> = match options.order {
            SortOrder::Ascending => in_scope
                .filter(|r| cursor_sk.map_or(true, |sk| r.address.sk.as_str() > sk))
                .take(limit + 1)
                .cloned()
                .collect(),
            SortOrder::Descending => in_scope
                .filter(|r| cursor_sk.map_or(true, |sk| r.address.sk.as_str() < sk))
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .take(limit + 1)
                .cloned()
                .collect(),
        };

        Ok(Page::from_overfetch(fetched, limit))
    }
}

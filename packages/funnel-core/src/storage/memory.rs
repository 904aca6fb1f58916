/// In-process record store.
///
/// Backs the local-only mode (no remote configured) and serves as the
/// store in tests, with switches to make reads or writes fail and a counter
/// of attempted calls.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Collection, Filter, RemoteStore, StorageError};

#[derive(Default)]
pub struct MemoryStore {
    /// collection -> records in insertion order
    records: RwLock<HashMap<Collection, Vec<Value>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a call.
    pub fn insert(&self, collection: Collection, record: Value) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(collection)
            .or_default()
            .push(record);
    }

    /// Current records of a collection.
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of store calls attempted so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self, write: bool) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = if write {
            &self.fail_writes
        } else {
            &self.fail_reads
        };
        if failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, StorageError> {
        self.begin(false)?;
        Ok(self
            .records(collection)
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        self.begin(false)?;
        Ok(self
            .records(collection)
            .into_iter()
            .find(|r| record_id(r) == Some(id)))
    }

    async fn create(&self, collection: Collection, mut record: Value) -> Result<Value, StorageError> {
        self.begin(true)?;
        let Value::Object(map) = &mut record else {
            return Err(StorageError::Rejected {
                status: 400,
                message: "record must be an object".into(),
            });
        };
        if !map.contains_key("id") {
            map.insert("id".into(), crate::ids::new_id().into());
        }
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let list = records.entry(collection).or_default();
        if list.iter().any(|r| record_id(r) == record_id(&record)) {
            return Err(StorageError::Rejected {
                status: 409,
                message: format!("duplicate id in {}", collection),
            });
        }
        list.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError> {
        self.begin(true)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let target = records
            .get_mut(&collection)
            .and_then(|list| list.iter_mut().find(|r| record_id(r) == Some(id)))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StorageError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            target.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        self.begin(true)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let list = records.entry(collection).or_default();
        let before = list.len();
        list.retain(|r| record_id(r) != Some(id));
        if list.len() == before {
            return Err(StorageError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

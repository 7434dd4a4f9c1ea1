//! In-memory record store.
//!
//! Backs `import --dry-run` (seeded with a snapshot of the live table) and
//! the reconciler tests. Deterministic, no database.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::store::{ImportRecord, KeyLookup, RecordStore, StoreError, Stored};

pub struct MemoryStore<R> {
    rows: Mutex<Vec<Stored<R>>>,
}

impl<R: ImportRecord> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn from_rows(rows: Vec<Stored<R>>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn snapshot(&self) -> Vec<Stored<R>> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn get(&self, key: &R::Key) -> Option<Stored<R>> {
        self.rows
            .lock()
            .iter()
            .find(|row| &row.record.natural_key() == key)
            .cloned()
    }
}

impl<R: ImportRecord> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: ImportRecord> RecordStore<R> for MemoryStore<R> {
    async fn find_by_key(&self, key: &R::Key) -> KeyLookup<R> {
        match self.get(key) {
            Some(row) => KeyLookup::Found(row),
            None => KeyLookup::NotFound,
        }
    }

    async fn insert(&self, record: &R) -> Result<Uuid, StoreError> {
        let mut rows = self.rows.lock();
        let key = record.natural_key();
        if rows.iter().any(|row| row.record.natural_key() == key) {
            return Err(StoreError::Rejected(format!("duplicate key {:?}", key)));
        }
        let id = Uuid::new_v4();
        rows.push(Stored {
            id,
            record: record.clone(),
            updated_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update(&self, id: Uuid, record: &R) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StoreError::Rejected(format!("row {} not found", id)))?;
        if row.record.natural_key() != record.natural_key() {
            return Err(StoreError::Rejected("natural key cannot change".to_string()));
        }
        row.record = record.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }
}

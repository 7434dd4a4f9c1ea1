//! Store seam used by the reconciler.
//!
//! Implementations:
//! - `db::queries::agent::PgAgentStore` / `db::queries::call_statistic::PgCallStatisticStore`
//!   (PostgreSQL, production)
//! - [`super::memory::MemoryStore`] (dry runs and tests, no database)

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// A record type that can be reconciled by natural key
pub trait ImportRecord: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Debug + Send + Sync;

    fn natural_key(&self) -> Self::Key;

    /// Compare every non-key field
    fn same_content(&self, other: &Self) -> bool;
}

/// A record as it currently exists in the store
#[derive(Debug, Clone)]
pub struct Stored<R> {
    pub id: Uuid,
    pub record: R,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Result of an exact-match natural-key lookup
#[derive(Debug)]
pub enum KeyLookup<R> {
    Found(Stored<R>),
    NotFound,
    Failed(StoreError),
}

#[async_trait]
pub trait RecordStore<R: ImportRecord>: Send + Sync {
    async fn find_by_key(&self, key: &R::Key) -> KeyLookup<R>;

    async fn insert(&self, record: &R) -> Result<Uuid, StoreError>;

    /// Overwrite the non-key fields of row `id` and bump its last-modified time
    async fn update(&self, id: Uuid, record: &R) -> Result<(), StoreError>;

    /// Delete every row; returns the number removed
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

//! Store catalog
//!
//! Durable CRUD over [`Store`] records. The catalog is independent of live
//! cluster state: a record may exist while its namespace does not, and the
//! reverse. Every operation touches a single record; nothing here assumes
//! multi-record transactions.
//!
//! Status writes are versioned. A writer passes the version it last read and
//! the write only lands if nobody else wrote in between, so concurrent install
//! completion and reconciliation cannot silently clobber each other.

#![deny(missing_docs)]

use async_trait::async_trait;

use storefront_common::{Result, Store, StoreId, StoreStatus};

mod memory;
mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

/// Outcome of a status write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    /// The write landed; carries the record as now stored
    Applied(Store),
    /// Someone else wrote first; carries the current record
    Conflict(Store),
    /// No record with that id
    Missing,
}

/// Durable store record storage
#[async_trait]
pub trait StoreCatalog: Send + Sync {
    /// Insert a new record
    ///
    /// The stored version starts at 1. Fails with a conflict error if the id
    /// or namespace is already taken.
    async fn create(&self, store: Store) -> Result<Store>;

    /// All records, newest first by creation time
    async fn get_all(&self) -> Result<Vec<Store>>;

    /// Look up a record by id
    async fn get_by_id(&self, id: &StoreId) -> Result<Option<Store>>;

    /// Set a record's status
    ///
    /// With `expected_version`, the write only happens if the stored version
    /// still matches. Without it the write is unconditional. Either way a
    /// successful write bumps the version by one.
    async fn update_status(
        &self,
        id: &StoreId,
        status: StoreStatus,
        expected_version: Option<u64>,
    ) -> Result<StatusWrite>;

    /// Remove a record; returns whether one was removed
    async fn delete(&self, id: &StoreId) -> Result<bool>;
}

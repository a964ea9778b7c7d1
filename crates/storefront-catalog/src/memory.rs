//! In-process catalog backed by a map
//!
//! Used for `--database :memory:` and as the catalog in unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use storefront_common::{Error, Result, Store, StoreId, StoreStatus};

use crate::{StatusWrite, StoreCatalog};

/// Non-durable [`StoreCatalog`]
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    stores: RwLock<HashMap<StoreId, Store>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreCatalog for MemoryCatalog {
    async fn create(&self, mut store: Store) -> Result<Store> {
        let mut stores = self.stores.write().await;
        if stores.contains_key(&store.id) {
            return Err(Error::conflict(format!("store id {} already exists", store.id)));
        }
        if stores.values().any(|s| s.namespace == store.namespace) {
            return Err(Error::conflict(format!(
                "namespace {} already allocated",
                store.namespace
            )));
        }
        store.version = 1;
        stores.insert(store.id.clone(), store.clone());
        Ok(store)
    }

    async fn get_all(&self) -> Result<Vec<Store>> {
        let mut all: Vec<Store> = self.stores.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(all)
    }

    async fn get_by_id(&self, id: &StoreId) -> Result<Option<Store>> {
        Ok(self.stores.read().await.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &StoreId,
        status: StoreStatus,
        expected_version: Option<u64>,
    ) -> Result<StatusWrite> {
        let mut stores = self.stores.write().await;
        let Some(store) = stores.get_mut(id) else {
            return Ok(StatusWrite::Missing);
        };
        if expected_version.is_some_and(|v| v != store.version) {
            return Ok(StatusWrite::Conflict(store.clone()));
        }
        store.status = status;
        store.version += 1;
        Ok(StatusWrite::Applied(store.clone()))
    }

    async fn delete(&self, id: &StoreId) -> Result<bool> {
        Ok(self.stores.write().await.remove(id).is_some())
    }
}

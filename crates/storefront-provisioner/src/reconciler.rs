//! Read-time status reconciliation
//!
//! Persisted status is a cache of what the cluster looks like. Every read
//! refreshes it from the driver, but only a conclusive observation (the
//! namespace was positively seen) may overwrite it. A 404 or an API failure
//! leaves the record alone, so a flaky API server cannot erase a `Ready`
//! store or resurrect a deleted one.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use storefront_catalog::StoreCatalog;
use storefront_common::{Error, Result, Store, StoreId};
use storefront_driver::{DeploymentDriver, LiveStatus};

use crate::view::{StoreUrlTemplate, StoreView};
use crate::write::write_status;

/// A record together with the live observation it was reconciled against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledStore {
    /// The record as stored after reconciliation
    pub store: Store,
    /// What the driver observed
    pub live: LiveStatus,
}

/// Aligns persisted store status with live cluster state
pub struct StatusReconciler {
    catalog: Arc<dyn StoreCatalog>,
    driver: Arc<dyn DeploymentDriver>,
    urls: StoreUrlTemplate,
}

impl StatusReconciler {
    /// Create a reconciler over the given dependencies
    pub fn new(
        catalog: Arc<dyn StoreCatalog>,
        driver: Arc<dyn DeploymentDriver>,
        urls: StoreUrlTemplate,
    ) -> Self {
        Self {
            catalog,
            driver,
            urls,
        }
    }

    /// Reconcile one record against its namespace
    ///
    /// Writes only when the observation is conclusive and differs from the
    /// stored status. Running it twice against an unchanged cluster writes at
    /// most once. Fails with `NotFound` if the record disappears mid-write.
    pub async fn reconcile(&self, store: Store) -> Result<ReconciledStore> {
        let live = self.driver.query_status(&store.namespace).await;

        if !live.is_conclusive() {
            debug!(
                store_id = %store.id,
                observed = %live.status,
                persisted = %store.status,
                "inconclusive observation, keeping persisted status"
            );
            return Ok(ReconciledStore { store, live });
        }
        if live.status == store.status {
            return Ok(ReconciledStore { store, live });
        }

        let previous = store.status;
        let updated = write_status(self.catalog.as_ref(), &store, |current| {
            (current.status != live.status).then_some(live.status)
        })
        .await?
        .ok_or_else(|| Error::not_found(store.id.as_str()))?;

        if updated.status != previous {
            info!(
                store_id = %updated.id,
                from = %previous,
                to = %updated.status,
                ready = live.ready_count,
                total = live.total_count,
                "reconciled store status"
            );
        }
        Ok(ReconciledStore {
            store: updated,
            live,
        })
    }

    /// All stores, newest first, each reconciled concurrently
    ///
    /// A store whose reconciliation fails is still listed, with its persisted
    /// status and no url or pod count. Stores deleted while the list is being
    /// built are left out.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<StoreView>> {
        let stores = self.catalog.get_all().await?;

        let views = join_all(stores.into_iter().map(|store| async move {
            let fallback = store.clone();
            match self.reconcile(store).await {
                Ok(reconciled) => Some(StoreView::listed(&reconciled, &self.urls)),
                Err(Error::NotFound { .. }) => None,
                Err(e) => {
                    warn!(
                        store_id = %fallback.id,
                        error = %e,
                        "reconcile failed, listing persisted status"
                    );
                    Some(StoreView::unreconciled(&fallback))
                }
            }
        }))
        .await;

        Ok(views.into_iter().flatten().collect())
    }

    /// One store, reconciled
    #[instrument(skip(self, id), fields(store_id = %id))]
    pub async fn get(&self, id: &StoreId) -> Result<StoreView> {
        let store = self
            .catalog
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(id.as_str()))?;
        let reconciled = self.reconcile(store).await?;
        Ok(StoreView::reconciled(&reconciled, &self.urls))
    }

    pub(crate) fn catalog(&self) -> &dyn StoreCatalog {
        self.catalog.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;
    use chrono::{Duration, Utc};
    use storefront_catalog::MemoryCatalog;
    use storefront_common::{StoreIdentifiers, StoreStatus};

    async fn seeded(
        catalog: &MemoryCatalog,
        name: &str,
        status: StoreStatus,
        minutes_ago: i64,
    ) -> Store {
        let id = StoreId::generate();
        let identifiers = StoreIdentifiers::generate(name, &id);
        let created_at = Utc::now() - Duration::minutes(minutes_ago);
        let store = catalog
            .create(Store::new(id, name, identifiers, created_at))
            .await
            .unwrap();
        if status == StoreStatus::Provisioning {
            return store;
        }
        match catalog
            .update_status(&store.id, status, None)
            .await
            .unwrap()
        {
            storefront_catalog::StatusWrite::Applied(s) => s,
            other => panic!("seed write failed: {other:?}"),
        }
    }

    fn reconciler(catalog: Arc<MemoryCatalog>, live: LiveStatus) -> StatusReconciler {
        let mut driver = MockDriver::new();
        driver.expect_query_status().returning(move |_| live);
        StatusReconciler::new(catalog, Arc::new(driver), StoreUrlTemplate::default())
    }

    mod reconcile {
        use super::*;

        #[tokio::test]
        async fn conclusive_drift_overwrites_status() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Provisioning, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(2, 2));

            let reconciled = r.reconcile(store.clone()).await.unwrap();
            assert_eq!(reconciled.store.status, StoreStatus::Ready);
            assert_eq!(reconciled.store.version, store.version + 1);

            let stored = catalog.get_by_id(&store.id).await.unwrap().unwrap();
            assert_eq!(stored.status, StoreStatus::Ready);
        }

        /// Story: a Ready store whose pods restart goes back to Provisioning
        #[tokio::test]
        async fn ready_store_with_unready_pods_regresses() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Ready, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(1, 2));

            let reconciled = r.reconcile(store).await.unwrap();
            assert_eq!(reconciled.store.status, StoreStatus::Provisioning);
        }

        #[tokio::test]
        async fn api_errors_never_overwrite() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Ready, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::error());

            let reconciled = r.reconcile(store.clone()).await.unwrap();
            assert_eq!(reconciled.store, store);
            assert_eq!(catalog.get_by_id(&store.id).await.unwrap().unwrap(), store);
        }

        #[tokio::test]
        async fn missing_namespace_never_overwrites() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Failed, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::not_found());

            let reconciled = r.reconcile(store.clone()).await.unwrap();
            assert_eq!(reconciled.store.status, StoreStatus::Failed);
            assert_eq!(reconciled.live.status, StoreStatus::NotFound);
            assert_eq!(catalog.get_by_id(&store.id).await.unwrap().unwrap(), store);
        }

        #[tokio::test]
        async fn reconciling_twice_writes_once() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Provisioning, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(3, 3));

            let first = r.reconcile(store).await.unwrap();
            let second = r.reconcile(first.store.clone()).await.unwrap();
            assert_eq!(second.store, first.store);
        }

        #[tokio::test]
        async fn stale_snapshot_does_not_double_write() {
            let catalog = Arc::new(MemoryCatalog::new());
            let stale = seeded(&catalog, "Acme", StoreStatus::Provisioning, 0).await;
            catalog
                .update_status(&stale.id, StoreStatus::Ready, Some(stale.version))
                .await
                .unwrap();
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(1, 1));

            let reconciled = r.reconcile(stale.clone()).await.unwrap();
            assert_eq!(reconciled.store.status, StoreStatus::Ready);
            assert_eq!(reconciled.store.version, stale.version + 1);
        }

        #[tokio::test]
        async fn record_deleted_mid_reconcile_is_not_found() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Provisioning, 0).await;
            catalog.delete(&store.id).await.unwrap();
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(1, 1));

            let err = r.reconcile(store).await.unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }));
        }
    }

    mod list {
        use super::*;

        #[tokio::test]
        async fn newest_first_with_pod_counts() {
            let catalog = Arc::new(MemoryCatalog::new());
            let older = seeded(&catalog, "Older", StoreStatus::Provisioning, 10).await;
            let newer = seeded(&catalog, "Newer", StoreStatus::Provisioning, 1).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(2, 2));

            let views = r.list().await.unwrap();
            assert_eq!(views.len(), 2);
            assert_eq!(views[0].id, newer.id);
            assert_eq!(views[1].id, older.id);
            for view in &views {
                assert_eq!(view.status, StoreStatus::Ready);
                assert_eq!(view.pod_count, Some(2));
                assert!(view.url.is_some());
            }
        }

        #[tokio::test]
        async fn empty_catalog_lists_nothing() {
            let r = reconciler(Arc::new(MemoryCatalog::new()), LiveStatus::error());
            assert!(r.list().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn unreachable_cluster_lists_persisted_status() {
            let catalog = Arc::new(MemoryCatalog::new());
            seeded(&catalog, "Acme", StoreStatus::Ready, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::error());

            let views = r.list().await.unwrap();
            assert_eq!(views[0].status, StoreStatus::Ready);
            assert_eq!(views[0].pod_count, Some(0));
            assert!(views[0].url.is_some());
        }
    }

    mod get {
        use super::*;

        #[tokio::test]
        async fn unknown_id_is_not_found() {
            let r = reconciler(Arc::new(MemoryCatalog::new()), LiveStatus::error());
            let err = r.get(&StoreId::from("nope")).await.unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }));
        }

        #[tokio::test]
        async fn returns_reconciled_view_without_pod_count() {
            let catalog = Arc::new(MemoryCatalog::new());
            let store = seeded(&catalog, "Acme", StoreStatus::Provisioning, 0).await;
            let r = reconciler(Arc::clone(&catalog), LiveStatus::observed(1, 1));

            let view = r.get(&store.id).await.unwrap();
            assert_eq!(view.status, StoreStatus::Ready);
            assert_eq!(view.pod_count, None);
            assert_eq!(view.url.as_deref(), Some("http://localhost:8080"));
        }
    }

    /// Story: a store reads as Provisioning while its install runs, Ready
    /// once the cluster agrees, and NotFound after it is deleted
    #[tokio::test]
    async fn create_then_reconcile_round_trip() {
        use crate::provisioner::{Provisioner, ProvisionerConfig};
        use crate::testing::GatedDriver;

        let catalog = Arc::new(MemoryCatalog::new());
        let (driver, gate) = GatedDriver::new(true);
        let provisioner = Provisioner::new(
            catalog.clone(),
            driver.clone(),
            ProvisionerConfig::default(),
        );
        let reconciler =
            StatusReconciler::new(catalog.clone(), driver.clone(), StoreUrlTemplate::default());

        let created = provisioner.create("Round Trip").await.unwrap();
        let id = created.store.id.clone();

        let pending = reconciler.get(&id).await.unwrap();
        assert_eq!(pending.status, StoreStatus::Provisioning);
        assert!(pending.url.is_none());

        gate.notify_one();
        assert_eq!(created.install.wait().await.unwrap(), StoreStatus::Ready);

        let ready = reconciler.get(&id).await.unwrap();
        assert_eq!(ready.status, StoreStatus::Ready);
        assert_eq!(ready.name, "Round Trip");
        assert!(ready.url.is_some());

        provisioner.delete(&id).await.unwrap();
        assert_eq!(driver.live_releases(), 0);
        let err = reconciler.get(&id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}

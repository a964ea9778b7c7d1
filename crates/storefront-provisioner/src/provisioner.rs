//! Create and delete workflows

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use storefront_catalog::StoreCatalog;
use storefront_common::{Error, Result, Store, StoreId, StoreIdentifiers, StoreStatus};
use storefront_driver::{DeploymentDriver, Release};

use crate::write::write_status;

/// Provisioner settings
#[derive(Debug, Clone, Default)]
pub struct ProvisionerConfig {
    /// Upper bound on a background install; `None` waits as long as the
    /// driver does
    pub install_timeout: Option<Duration>,
}

/// Handle to a background install
///
/// Dropping the handle detaches the install; it keeps running and still
/// records its outcome.
#[derive(Debug)]
pub struct InstallHandle {
    store_id: StoreId,
    task: JoinHandle<StoreStatus>,
}

impl InstallHandle {
    /// Whether the install has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the install and return its outcome (`Ready` or `Failed`)
    ///
    /// The outcome is what the install concluded; it has been written to the
    /// catalog unless the record was deleted in the meantime.
    pub async fn wait(self) -> Result<StoreStatus> {
        self.task.await.map_err(|e| {
            Error::internal_with_context(
                "install",
                format!("install task for store {} aborted: {}", self.store_id, e),
            )
        })
    }
}

/// Result of [`Provisioner::create`]
#[derive(Debug)]
pub struct CreatedStore {
    /// The record as persisted, status `Provisioning`
    pub store: Store,
    /// The install running in the background
    pub install: InstallHandle,
}

/// Runs the store lifecycle workflows against a catalog and a driver
pub struct Provisioner {
    catalog: Arc<dyn StoreCatalog>,
    driver: Arc<dyn DeploymentDriver>,
    config: ProvisionerConfig,
}

impl Provisioner {
    /// Create a provisioner over the given dependencies
    pub fn new(
        catalog: Arc<dyn StoreCatalog>,
        driver: Arc<dyn DeploymentDriver>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            catalog,
            driver,
            config,
        }
    }

    /// Register a new store and start installing it
    ///
    /// Returns once the `Provisioning` record is persisted. The install runs
    /// detached and moves the record to `Ready` or `Failed` exactly once.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<CreatedStore> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation_for_field("name", "Store name is required"));
        }

        let id = StoreId::generate();
        let identifiers = StoreIdentifiers::generate(name, &id);
        let store = self
            .catalog
            .create(Store::new(id, name, identifiers, Utc::now()))
            .await?;

        info!(
            target: "audit",
            store_id = %store.id,
            name = %store.name,
            namespace = %store.namespace,
            release = %store.release,
            "store created"
        );

        let install = self.spawn_install(store.clone());
        Ok(CreatedStore { store, install })
    }

    fn spawn_install(&self, store: Store) -> InstallHandle {
        let catalog = Arc::clone(&self.catalog);
        let driver = Arc::clone(&self.driver);
        let timeout = self.config.install_timeout;
        let store_id = store.id.clone();

        let task = tokio::spawn(async move {
            let outcome = run_install(driver.as_ref(), &store, timeout).await;
            record_outcome(catalog.as_ref(), driver.as_ref(), &store, outcome).await
        });

        InstallHandle { store_id, task }
    }

    /// Tear down a store's release, then forget the record
    ///
    /// If the uninstall fails the record is left untouched so the delete can
    /// be retried.
    #[instrument(skip(self, id), fields(store_id = %id))]
    pub async fn delete(&self, id: &StoreId) -> Result<Store> {
        let store = self
            .catalog
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(id.as_str()))?;

        if let Err(e) = self.driver.uninstall(&store.release).await {
            error!(
                store_id = %store.id,
                release = %store.release,
                error = %e,
                "uninstall failed, keeping store record"
            );
            return Err(e);
        }

        if !self.catalog.delete(id).await? {
            debug!(store_id = %id, "store record already gone after uninstall");
        }

        info!(
            target: "audit",
            store_id = %store.id,
            namespace = %store.namespace,
            release = %store.release,
            "store deleted"
        );
        Ok(store)
    }

    /// Releases currently known to the driver
    pub async fn releases(&self) -> Vec<Release> {
        self.driver.list().await
    }
}

async fn run_install(
    driver: &dyn DeploymentDriver,
    store: &Store,
    timeout: Option<Duration>,
) -> Result<()> {
    info!(store_id = %store.id, release = %store.release, "starting install");
    let install = driver.install(&store.release, &store.namespace, &store.name);
    match timeout {
        None => install.await,
        Some(limit) => tokio::time::timeout(limit, install)
            .await
            .unwrap_or_else(|_| {
                Err(Error::driver_for(
                    &store.release,
                    format!("install did not finish within {}s", limit.as_secs()),
                ))
            }),
    }
}

/// Write the install outcome, or tear the release down if the record is gone
///
/// A delete that lands while the install is running uninstalls a release
/// that may not exist yet, so the install task owns the final cleanup.
async fn record_outcome(
    catalog: &dyn StoreCatalog,
    driver: &dyn DeploymentDriver,
    store: &Store,
    outcome: Result<()>,
) -> StoreStatus {
    let terminal = match outcome {
        Ok(()) => {
            info!(store_id = %store.id, release = %store.release, "install succeeded");
            StoreStatus::Ready
        }
        Err(e) => {
            error!(store_id = %store.id, release = %store.release, error = %e, "install failed");
            StoreStatus::Failed
        }
    };

    match write_status(catalog, store, |current| {
        (current.status != terminal).then_some(terminal)
    })
    .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(
                store_id = %store.id,
                release = %store.release,
                status = %terminal,
                "store deleted before install finished, removing release"
            );
            if let Err(e) = driver.uninstall(&store.release).await {
                error!(
                    store_id = %store.id,
                    release = %store.release,
                    error = %e,
                    "failed to remove release of deleted store"
                );
            }
        }
        Err(e) => error!(
            store_id = %store.id,
            status = %terminal,
            error = %e,
            "failed to record install outcome"
        ),
    }
    terminal
}

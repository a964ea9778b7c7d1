//! Storefront - per-tenant store provisioning on a shared Kubernetes cluster
//!
//! Each store gets its own namespace and helm release. The service keeps a
//! catalog of stores, installs and removes releases, and reconciles the
//! catalog against what is actually running.
//!
//! # Crates
//!
//! - `storefront-common` - Store model, naming, shared errors
//! - `storefront-catalog` - SQLite and in-memory record storage
//! - `storefront-driver` - Helm CLI and namespace observation
//! - `storefront-provisioner` - Create/delete workflows and reconciliation
//! - `storefront-api` - HTTP surface

#![deny(missing_docs)]

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use storefront_api::AppState;
use storefront_catalog::{MemoryCatalog, SqliteCatalog, StoreCatalog};
use storefront_common::kube_utils::create_client;
use storefront_driver::{DeploymentDriver, HelmDriver};
use storefront_provisioner::{Provisioner, ProvisionerConfig, ReconcileLoop, StatusReconciler};

use crate::config::{CatalogLocation, Config};

/// Open the configured catalog
pub fn open_catalog(location: &CatalogLocation) -> anyhow::Result<Arc<dyn StoreCatalog>> {
    Ok(match location {
        CatalogLocation::Memory => {
            info!("using in-memory store catalog; records are lost on restart");
            Arc::new(MemoryCatalog::new())
        }
        CatalogLocation::File(path) => Arc::new(
            SqliteCatalog::open(path)
                .with_context(|| format!("failed to open catalog {}", path.display()))?,
        ),
    })
}

/// Run the service until `shutdown` is cancelled
pub async fn run(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let catalog = open_catalog(&config.catalog)?;

    let client = create_client(config.helm.kubeconfig.as_deref())
        .await
        .context("failed to create kubernetes client")?;
    let driver: Arc<dyn DeploymentDriver> = Arc::new(HelmDriver::new(client, config.helm.clone()));

    let provisioner = Arc::new(Provisioner::new(
        Arc::clone(&catalog),
        Arc::clone(&driver),
        ProvisionerConfig {
            install_timeout: config.install_timeout,
        },
    ));
    let reconciler = Arc::new(StatusReconciler::new(
        catalog,
        driver,
        config.store_urls.clone(),
    ));

    let sweeper = config.reconcile_interval.map(|interval| {
        let task = ReconcileLoop::new(Arc::clone(&reconciler), interval);
        tokio::spawn(task.run(shutdown.child_token()))
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    let state = AppState {
        provisioner,
        reconciler,
    };
    let server_shutdown = shutdown.clone();
    storefront_api::serve(listener, state, async move {
        server_shutdown.cancelled().await
    })
    .await
    .context("API server failed")?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "reconcile loop task ended abnormally");
        }
    }

    info!("storefront shutting down");
    Ok(())
}

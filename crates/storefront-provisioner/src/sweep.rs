//! Periodic reconciliation of in-flight stores

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use storefront_catalog::StoreCatalog;
use storefront_common::{Result, StoreStatus};

use crate::reconciler::StatusReconciler;

/// Reconciles `Provisioning` stores on a fixed interval
///
/// Without this, a store only leaves `Provisioning` through its install task
/// or when someone reads it.
pub struct ReconcileLoop {
    reconciler: Arc<StatusReconciler>,
    interval: Duration,
}

impl ReconcileLoop {
    /// Create a loop that sweeps every `interval`
    pub fn new(reconciler: Arc<StatusReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "reconcile loop started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "reconcile sweep failed");
                    }
                }
            }
        }
        info!("reconcile loop stopped");
    }

    /// Reconcile every `Provisioning` store once; returns how many changed
    pub async fn sweep(&self) -> Result<usize> {
        let pending: Vec<_> = self
            .reconciler
            .catalog()
            .get_all()
            .await?
            .into_iter()
            .filter(|s| s.status == StoreStatus::Provisioning)
            .collect();

        let mut changed = 0;
        for store in pending {
            let id = store.id.clone();
            match self.reconciler.reconcile(store).await {
                Ok(r) if r.store.status != StoreStatus::Provisioning => changed += 1,
                Ok(_) => {}
                Err(e) => debug!(store_id = %id, error = %e, "skipping store in sweep"),
            }
        }
        if changed > 0 {
            info!(changed, "reconcile sweep updated stores");
        }
        Ok(changed)
    }
}

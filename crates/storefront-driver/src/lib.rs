//! Deployment driver
//!
//! The cluster-facing half of storefront: installing and removing a store's
//! helm release, and observing what is actually running in its namespace.
//!
//! Live status queries never fail outright. Any problem talking to the API
//! server is folded into [`StoreStatus::Error`] with `exists == false`, which
//! callers must treat as "unknown" rather than "gone". Only a 404 on the
//! namespace produces [`StoreStatus::NotFound`].

#![deny(missing_docs)]

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use storefront_common::{Result, StoreStatus};

mod helm;
mod status;

pub use helm::{HelmConfig, HelmDriver};
pub use status::{classify_pods, is_pod_ready};

/// Observed state of a store's namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStatus {
    /// Whether the namespace was positively observed
    pub exists: bool,
    /// Status derived from the observation
    pub status: StoreStatus,
    /// Pods running and passing readiness
    pub ready_count: u32,
    /// Pods observed
    pub total_count: u32,
}

impl LiveStatus {
    /// Namespace confirmed absent (API 404)
    pub fn not_found() -> Self {
        Self {
            exists: false,
            status: StoreStatus::NotFound,
            ready_count: 0,
            total_count: 0,
        }
    }

    /// Live state could not be determined
    pub fn error() -> Self {
        Self {
            exists: false,
            status: StoreStatus::Error,
            ready_count: 0,
            total_count: 0,
        }
    }

    /// Namespace exists with `ready` of `total` pods ready
    ///
    /// No pods yet, or any pod not ready, is `Provisioning`; all ready is `Ready`.
    pub fn observed(ready: u32, total: u32) -> Self {
        let status = if total > 0 && ready == total {
            StoreStatus::Ready
        } else {
            StoreStatus::Provisioning
        };
        Self {
            exists: true,
            status,
            ready_count: ready,
            total_count: total,
        }
    }

    /// Whether this observation may overwrite persisted state
    pub fn is_conclusive(&self) -> bool {
        self.exists
    }
}

/// A helm release as reported by `helm list --output json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Namespace holding the release metadata
    pub namespace: String,
    /// Revision number
    #[serde(default)]
    pub revision: String,
    /// Last update time as printed by helm
    #[serde(default)]
    pub updated: String,
    /// Release status (deployed, failed, ...)
    #[serde(default)]
    pub status: String,
    /// Chart name and version
    #[serde(default)]
    pub chart: String,
    /// Application version from the chart
    #[serde(default)]
    pub app_version: String,
}

/// Operations against the cluster that the provisioning core depends on
///
/// `install` is not idempotent: callers must not install the same release
/// twice without an uninstall in between. `uninstall` treats an already
/// missing release as success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    /// Install the store chart as `release`, deploying into `namespace`
    async fn install(&self, release: &str, namespace: &str, display_name: &str) -> Result<()>;

    /// Remove `release`
    async fn uninstall(&self, release: &str) -> Result<()>;

    /// Observe the store's namespace and classify it
    async fn query_status(&self, namespace: &str) -> LiveStatus;

    /// Releases currently known to helm; empty on failure
    async fn list(&self) -> Vec<Release>;
}

//! Store record and status model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::naming::StoreIdentifiers;
use crate::Error;

/// Opaque, immutable store identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First hyphen-separated segment, used to derive the release name
    pub fn short(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl From<String> for StoreId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StoreId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a store
///
/// `Provisioning` is the initial state. The install workflow moves a store to
/// `Ready` or `Failed`; reconciliation may later overwrite any status when the
/// live cluster conclusively disagrees. `NotFound` and `Error` describe live
/// query outcomes and are never written from an inconclusive query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreStatus {
    /// Install triggered, workloads not yet all ready
    Provisioning,
    /// Install succeeded / all workloads ready
    Ready,
    /// Install failed; no automatic retry
    Failed,
    /// Namespace absent from the cluster
    NotFound,
    /// Live state could not be determined
    Error,
}

impl StoreStatus {
    /// All statuses, in declaration order
    pub const ALL: [StoreStatus; 5] = [
        StoreStatus::Provisioning,
        StoreStatus::Ready,
        StoreStatus::Failed,
        StoreStatus::NotFound,
        StoreStatus::Error,
    ];

    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Provisioning => "Provisioning",
            StoreStatus::Ready => "Ready",
            StoreStatus::Failed => "Failed",
            StoreStatus::NotFound => "NotFound",
            StoreStatus::Error => "Error",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::internal_with_context("status", format!("unknown store status '{s}'"))
            })
    }
}

/// A provisioned (or provisioning) store
///
/// `id`, `namespace`, `release` and `created_at` never change once the record
/// exists. `version` increases by one on every status write and is what
/// conditional updates compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Primary key
    pub id: StoreId,
    /// Trimmed display name
    pub name: String,
    /// Cluster namespace allocated to this store
    pub namespace: String,
    /// Helm release name
    pub release: String,
    /// Last persisted status
    pub status: StoreStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Monotonic write version
    pub version: u64,
}

impl Store {
    /// Build a new `Provisioning` record
    pub fn new(
        id: StoreId,
        name: impl Into<String>,
        identifiers: StoreIdentifiers,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            namespace: identifiers.namespace,
            release: identifiers.release,
            status: StoreStatus::Provisioning,
            created_at,
            version: 0,
        }
    }
}

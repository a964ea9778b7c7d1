//! Response-shaped store views

use chrono::{DateTime, Utc};
use serde::Serialize;

use storefront_common::{Store, StoreId, StoreStatus};

use crate::reconciler::ReconciledStore;

/// Placeholder substituted with the store's namespace
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// Default store URL when nothing better is configured
pub const DEFAULT_URL_TEMPLATE: &str = "http://localhost:8080";

/// Template for the public URL of a ready store
///
/// `{namespace}` is replaced with the store's namespace; a template without
/// the placeholder yields the same URL for every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUrlTemplate(String);

impl StoreUrlTemplate {
    /// Wrap a template string
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Render the URL for `store`
    pub fn render(&self, store: &Store) -> String {
        self.0.replace(NAMESPACE_PLACEHOLDER, &store.namespace)
    }
}

impl Default for StoreUrlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_URL_TEMPLATE)
    }
}

/// A store as returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreView {
    /// Store id
    pub id: StoreId,
    /// Display name
    pub name: String,
    /// Cluster namespace
    pub namespace: String,
    /// Status after reconciliation
    pub status: StoreStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Public URL; only set for `Ready` stores
    pub url: Option<String>,
    /// Pods observed in the namespace; list responses only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_count: Option<u32>,
}

impl StoreView {
    /// View of a record without live information
    pub fn persisted(store: &Store, urls: &StoreUrlTemplate) -> Self {
        let url = (store.status == StoreStatus::Ready).then(|| urls.render(store));
        Self {
            id: store.id.clone(),
            name: store.name.clone(),
            namespace: store.namespace.clone(),
            status: store.status,
            created_at: store.created_at,
            url,
            pod_count: None,
        }
    }

    /// View of a reconciled record, without pod count
    pub fn reconciled(reconciled: &ReconciledStore, urls: &StoreUrlTemplate) -> Self {
        Self::persisted(&reconciled.store, urls)
    }

    /// View of a reconciled record including the observed pod count
    pub fn listed(reconciled: &ReconciledStore, urls: &StoreUrlTemplate) -> Self {
        Self {
            pod_count: Some(reconciled.live.total_count),
            ..Self::reconciled(reconciled, urls)
        }
    }

    /// Fallback when reconciliation failed: persisted status, no url, no pods
    pub fn unreconciled(store: &Store) -> Self {
        Self {
            id: store.id.clone(),
            name: store.name.clone(),
            namespace: store.namespace.clone(),
            status: store.status,
            created_at: store.created_at,
            url: None,
            pod_count: None,
        }
    }
}

//! Namespace and pod observation

use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, warn};

use storefront_common::kube_utils::is_not_found;

use crate::LiveStatus;

/// A pod is ready when it is `Running` and every container reports ready
///
/// Pods that have not published container statuses yet are not ready.
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status
            .container_statuses
            .as_ref()
            .is_some_and(|containers| containers.iter().all(|c| c.ready))
}

/// Classify the pods observed in an existing namespace
pub fn classify_pods(pods: &[Pod]) -> LiveStatus {
    let total = u32::try_from(pods.len()).unwrap_or(u32::MAX);
    let ready = u32::try_from(pods.iter().filter(|p| is_pod_ready(p)).count()).unwrap_or(u32::MAX);
    LiveStatus::observed(ready, total)
}

/// Query the namespace and its pods
pub(crate) async fn query_namespace(client: &Client, namespace: &str) -> LiveStatus {
    if namespace.is_empty() {
        warn!("status query without a namespace");
        return LiveStatus::error();
    }

    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.get(namespace).await {
        Ok(_) => {}
        Err(e) if is_not_found(&e) => {
            debug!(namespace = %namespace, "namespace not found");
            return LiveStatus::not_found();
        }
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "failed to read namespace");
            return LiveStatus::error();
        }
    }

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    match pods.list(&ListParams::default()).await {
        Ok(list) => {
            let live = classify_pods(&list.items);
            debug!(
                namespace = %namespace,
                ready = live.ready_count,
                total = live.total_count,
                status = %live.status,
                "observed namespace"
            );
            live
        }
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "failed to list pods");
            LiveStatus::error()
        }
    }
}

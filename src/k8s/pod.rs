//! Pod fetch and the Guaranteed-QoS gate.

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Pod;
use reqwest::Client;

use crate::error::FatalError;

const API_HOST: &str = "https://kubernetes.default.svc.cluster.local";

pub fn pod_url(namespace: &str, name: &str) -> String {
    format!("{API_HOST}/api/v1/namespaces/{namespace}/pods/{name}")
}

/// `GET` the pod object. Transient failures (network error, non-200) are
/// returned to the caller, which logs and retries next tick rather than
/// treating this as fatal.
pub async fn fetch_pod(
    client: &Client,
    token: &str,
    namespace: &str,
    name: &str,
) -> Result<Pod> {
    let resp = client
        .get(pod_url(namespace, name))
        .bearer_auth(token)
        .send()
        .await
        .with_context(|| format!("GET pod {namespace}/{name} failed"))?;

    if !resp.status().is_success() {
        return Err(anyhow!(
            "GET pod {namespace}/{name} returned status {}",
            resp.status()
        ));
    }

    resp.json::<Pod>()
        .await
        .with_context(|| format!("failed to decode pod {namespace}/{name}"))
}

/// Reject any pod whose QoS class is not Guaranteed. This is fatal: running
/// kondense against a non-Guaranteed pod is a misconfiguration, not a
/// transient condition.
pub fn require_guaranteed_qos(pod: &Pod) -> Result<(), FatalError> {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let qos = pod
        .status
        .as_ref()
        .and_then(|s| s.qos_class.clone())
        .unwrap_or_default();

    if qos != "Guaranteed" {
        return Err(FatalError::NotGuaranteed { name, qos });
    }
    Ok(())
}

/// Names of containers in `pod.spec.containers`, in declaration order.
pub fn spec_container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// The allocated memory (bytes) and CPU (millicores) limits for
/// `container_name`, read from `status.containerStatuses[i].allocatedResources`.
/// Missing entries default to 0, which the caller's clamp will correct
/// upward on the first patch.
pub fn allocated_limits(pod: &Pod, container_name: &str) -> (u64, u64) {
    let status = pod.status.as_ref().and_then(|s| {
        s.container_statuses
            .as_ref()
            .and_then(|statuses| statuses.iter().find(|cs| cs.name == container_name))
    });

    let Some(status) = status else {
        return (0, 0);
    };

    let Some(resources) = status.allocated_resources.as_ref() else {
        return (0, 0);
    };

    let memory = resources
        .get("memory")
        .and_then(|q| crate::config::parse_memory_bytes(&q.0).ok())
        .unwrap_or(0);
    let cpu = resources
        .get("cpu")
        .and_then(|q| crate::config::parse_cpu_millicores(&q.0).ok())
        .unwrap_or(0);

    (memory, cpu)
}

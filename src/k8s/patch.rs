//! The actuator: clamp the controllers' fractional adjustments into new
//! limits and PATCH them onto the pod.

use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::info;

use super::auth::TokenStore;
use super::pod::pod_url;
use crate::error::ActuateError;

/// Result of one `patch_container` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Both clamped limits matched the currently observed limits; no I/O
    /// was performed.
    Skipped,
    /// The pod was patched with these new limits.
    Patched { new_memory_bytes: u64, new_cpu_mcpu: u64 },
}

#[allow(clippy::too_many_arguments)]
fn clamp_new_limits(
    current_memory_bytes: u64,
    current_cpu_mcpu: u64,
    mem_factor: f64,
    cpu_factor: f64,
    mem_min: u64,
    mem_max: u64,
    cpu_min: u64,
    cpu_max: u64,
) -> (u64, u64) {
    let raw_memory = (current_memory_bytes as f64 * (1.0 + mem_factor)).round();
    let new_memory = (raw_memory.max(0.0) as u64).clamp(mem_min, mem_max);

    let raw_cpu = (current_cpu_mcpu as f64 * (1.0 + cpu_factor)).round();
    let new_cpu = (raw_cpu.max(0.0) as u64).clamp(cpu_min, cpu_max);

    (new_memory, new_cpu)
}

/// Clamp, build the strategic-merge patch body, and PATCH the pod.
/// Retries exactly once on 401 after refreshing the bearer token; any
/// other non-200 response is returned as an error without resetting the
/// caller's pressure integral.
#[allow(clippy::too_many_arguments)]
pub async fn patch_container(
    client: &Client,
    token: &TokenStore,
    namespace: &str,
    pod_name: &str,
    container_name: &str,
    current_memory_bytes: u64,
    current_cpu_mcpu: u64,
    mem_factor: f64,
    cpu_factor: f64,
    mem_min: u64,
    mem_max: u64,
    cpu_min: u64,
    cpu_max: u64,
) -> Result<PatchOutcome, ActuateError> {
    let (new_memory, new_cpu) = clamp_new_limits(
        current_memory_bytes,
        current_cpu_mcpu,
        mem_factor,
        cpu_factor,
        mem_min,
        mem_max,
        cpu_min,
        cpu_max,
    );

    if new_memory == current_memory_bytes && new_cpu == current_cpu_mcpu {
        return Ok(PatchOutcome::Skipped);
    }

    let url = pod_url(namespace, pod_name);
    let body = json!({
        "spec": {
            "containers": [{
                "name": container_name,
                "resources": {
                    "limits": {
                        "memory": new_memory.to_string(),
                        "cpu": format!("{new_cpu}m"),
                    },
                    "requests": {
                        "memory": new_memory.to_string(),
                        "cpu": format!("{new_cpu}m"),
                    },
                },
            }],
        },
    });

    let mut already_refreshed = false;
    loop {
        let bearer = token.snapshot();
        let resp = client
            .patch(&url)
            .header("Content-Type", "application/strategic-merge-patch+json")
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(ActuateError::Request)?;

        match resp.status() {
            StatusCode::OK => {
                info!(
                    container = container_name,
                    memory_factor = format!("{mem_factor:.2}"),
                    new_memory,
                    cpu_factor = format!("{cpu_factor:.2}"),
                    new_cpu,
                    "patched container"
                );
                return Ok(PatchOutcome::Patched {
                    new_memory_bytes: new_memory,
                    new_cpu_mcpu: new_cpu,
                });
            }
            StatusCode::UNAUTHORIZED if !already_refreshed => {
                already_refreshed = true;
                token.refresh().map_err(|e| {
                    ActuateError::TokenRenewal(std::io::Error::new(std::io::ErrorKind::Other, e))
                })?;
                info!("renewed k8s bearer token");
                continue;
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ActuateError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_when_unchanged() {
        let (mem, cpu) = clamp_new_limits(100_000_000, 500, 0.0, 0.0, 50_000_000, 1_000_000_000, 10, 1000);
        assert_eq!((mem, cpu), (100_000_000, 500));
    }

    #[test]
    fn clamps_to_max() {
        let (mem, _) = clamp_new_limits(100_000_000, 500, 10.0, 0.0, 50_000_000, 200_000_000, 10, 1000);
        assert_eq!(mem, 200_000_000);
    }

    #[test]
    fn clamps_to_min() {
        let (_, cpu) = clamp_new_limits(100_000_000, 500, 0.0, -0.99, 50_000_000, 1_000_000_000, 100, 1000);
        assert_eq!(cpu, 100);
    }

    #[test]
    fn applies_factor_within_bounds() {
        // 100Mi limit, adj = 0.0625
        let (mem, _) = clamp_new_limits(
            100 * 1024 * 1024,
            500,
            0.0625,
            0.0,
            50_000_000,
            100_000_000_000,
            10,
            100_000,
        );
        assert_eq!(mem, ((100.0 * 1024.0 * 1024.0) * 1.0625).round() as u64);
    }
}

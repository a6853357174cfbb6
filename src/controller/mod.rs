pub mod cpu;
pub mod memory;
pub mod state;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::FatalError;
use crate::k8s::{auth::TokenStore, patch, pod};
use crate::sampler;

use state::{ContainerState, ContainerStates};

const TICK_PERIOD: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The reconcile driver: ticks once a second, fetching the pod, gating on
/// QoS, and fanning out one worker per managed container.
pub struct Reconciler {
    client: Client,
    token: Arc<TokenStore>,
    namespace: String,
    pod_name: String,
    states: ContainerStates,
}

impl Reconciler {
    pub fn new(client: Client, token: Arc<TokenStore>, namespace: String, pod_name: String) -> Self {
        Self {
            client,
            token,
            namespace,
            pod_name,
            states: ContainerStates::new(),
        }
    }

    /// Run the tick loop until `shutdown` is triggered. Returns an error
    /// only when the pod fetch succeeds but its QoS class is not
    /// Guaranteed; transient errors are logged and looped past.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), FatalError> {
        let mut loop_time = Duration::ZERO;

        loop {
            let pace = TICK_PERIOD.checked_sub(loop_time).unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = sleep(pace) => {}
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, exiting before next tick");
                    return Ok(());
                }
            }

            let start = Instant::now();

            let pod = match pod::fetch_pod(&self.client, &self.token.snapshot(), &self.namespace, &self.pod_name).await {
                Ok(pod) => pod,
                Err(e) => {
                    error!(error = %e, "failed to fetch pod, retrying next tick");
                    loop_time = start.elapsed();
                    continue;
                }
            };

            if let Err(e) = pod::require_guaranteed_qos(&pod) {
                error!(error = %e, "fatal: pod does not satisfy Guaranteed QoS, exiting");
                return Err(e);
            }

            let exclude = crate::exclude::excluded_containers();
            self.init_states(&pod, &exclude);

            self.run_tick(&pod, &exclude, &shutdown).await;

            loop_time = start.elapsed();
        }
    }

    fn init_states(&mut self, pod: &k8s_openapi::api::core::v1::Pod, exclude: &HashSet<String>) {
        for name in pod::spec_container_names(pod) {
            if exclude.contains(&name) {
                continue;
            }
            self.states.ensure_initialized(&name);
            let (memory_bytes, cpu_mcpu) = pod::allocated_limits(pod, &name);
            if let Some(state) = self.states.get_mut(&name) {
                state.refresh_limits(memory_bytes, cpu_mcpu);
            }
        }
    }

    async fn run_tick(&mut self, pod: &k8s_openapi::api::core::v1::Pod, exclude: &HashSet<String>, shutdown: &CancellationToken) {
        let mut join_set = JoinSet::new();

        for name in pod::spec_container_names(pod) {
            if exclude.contains(&name) {
                continue;
            }
            let Some(state) = self.states.take(&name) else {
                continue;
            };

            let client = self.client.clone();
            let token = Arc::clone(&self.token);
            let namespace = self.namespace.clone();
            let pod_name = self.pod_name.clone();
            let container_name = name.clone();

            join_set.spawn(async move {
                let state = reconcile_container(client, token, namespace, pod_name, container_name.clone(), state).await;
                (container_name, state)
            });
        }

        tokio::select! {
            _ = drain(&mut join_set, &mut self.states) => {}
            _ = shutdown.cancelled() => {
                if tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut join_set, &mut self.states))
                    .await
                    .is_err()
                {
                    warn!("shutdown grace period elapsed with workers still in flight");
                }
            }
        }
    }
}

/// Await every worker in `join_set`, returning its state to `states` as it
/// finishes. Used both for the normal bulk-sync barrier and, wrapped in a
/// timeout, for the post-shutdown grace window.
async fn drain(join_set: &mut JoinSet<(String, ContainerState)>, states: &mut ContainerStates) {
    while let Some(next) = join_set.join_next().await {
        match next {
            Ok((name, state)) => states.put_back(name, state),
            Err(e) => warn!(error = %e, "container worker task panicked"),
        }
    }
}

/// One container's pipeline for this tick: sample, update controllers,
/// decide, and actuate.
async fn reconcile_container(
    client: Client,
    token: Arc<TokenStore>,
    namespace: String,
    pod_name: String,
    container_name: String,
    mut state: ContainerState,
) -> ContainerState {
    let is_self = container_name.eq_ignore_ascii_case("kondense");

    let raw = match sampler::sample(&pod_name, &container_name, is_self).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(container = %container_name, error = %e, "sampling failed, skipping this tick");
            return state;
        }
    };

    state.memory.observe(raw.memory_some_total_us);
    state.cpu.observe(raw.cpu_user_usec, Instant::now());
    state.last_sample_time = Some(Instant::now());

    info!(
        container = %container_name,
        memory_limit = state.memory.limit_bytes,
        memory_grace_ticks = state.memory.grace_ticks,
        memory_total = raw.memory_some_total_us,
        memory_integral = state.memory.integral_us,
        cpu_limit = state.cpu.limit_mcpu,
        cpu_avg_mcpu = state.cpu.avg_mcpu,
        "updated stats"
    );

    let mem_factor = state.memory.decide();
    let cpu_factor = state.cpu.decide();

    if mem_factor.abs() < 0.01 && cpu_factor.abs() < 0.01 {
        return state;
    }

    let outcome = patch::patch_container(
        &client,
        &token,
        &namespace,
        &pod_name,
        &container_name,
        state.memory.limit_bytes,
        state.cpu.limit_mcpu,
        mem_factor,
        cpu_factor,
        state.memory.tunables.min_bytes,
        state.memory.tunables.max_bytes,
        state.cpu.tunables.min_mcpu,
        state.cpu.tunables.max_mcpu,
    )
    .await;

    match outcome {
        Ok(patch::PatchOutcome::Patched { new_memory_bytes, new_cpu_mcpu }) => {
            state.memory.limit_bytes = new_memory_bytes;
            state.cpu.limit_mcpu = new_cpu_mcpu;
            state.memory.reset_integral();
        }
        Ok(patch::PatchOutcome::Skipped) => {}
        Err(e) => {
            error!(container = %container_name, error = %e, "patch failed");
        }
    }

    state
}

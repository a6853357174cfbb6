//! Per-container controller state and its lazy initializer.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::ContainerTunables;

use super::cpu::CpuController;
use super::memory::MemoryController;

/// Everything kondense tracks for one managed container, created on first
/// observation and held for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub memory: MemoryController,
    pub cpu: CpuController,
    pub last_sample_time: Option<Instant>,
}

impl ContainerState {
    fn new(tunables: ContainerTunables) -> Self {
        Self {
            memory: MemoryController::new(tunables.memory),
            cpu: CpuController::new(tunables.cpu),
            last_sample_time: None,
        }
    }

    /// Refresh the observed limits from the pod's allocated resources.
    /// Called on every tick, including after initialization.
    pub fn refresh_limits(&mut self, memory_bytes: u64, cpu_mcpu: u64) {
        self.memory.limit_bytes = memory_bytes;
        self.cpu.limit_mcpu = cpu_mcpu;
    }
}

/// Map from container name to its controller state. Appended-to only by
/// `ensure_initialized`, which runs once per tick before any worker starts.
#[derive(Debug, Default)]
pub struct ContainerStates {
    inner: HashMap<String, ContainerState>,
}

impl ContainerStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily create state for `name` if this is the first time it has
    /// been observed, resolving tunables from its environment variables.
    pub fn ensure_initialized(&mut self, name: &str) {
        if !self.inner.contains_key(name) {
            self.inner
                .insert(name.to_string(), ContainerState::new(ContainerTunables::from_env(name)));
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ContainerState> {
        self.inner.get_mut(name)
    }

    /// Remove `name`'s state so a spawned worker can own it exclusively for
    /// the rest of the tick — no per-container lock needed because only one
    /// worker ever holds a container's state at a time.
    pub fn take(&mut self, name: &str) -> Option<ContainerState> {
        self.inner.remove(name)
    }

    /// Return a container's state once its worker has finished with it.
    pub fn put_back(&mut self, name: String, state: ContainerState) {
        self.inner.insert(name, state);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_creates_state_with_full_grace() {
        let mut states = ContainerStates::new();
        states.ensure_initialized("app");
        let s = states.get_mut("app").unwrap();
        assert_eq!(s.memory.grace_ticks, s.memory.tunables.interval);
        assert!(s.last_sample_time.is_none());
    }

    #[test]
    fn second_observation_does_not_reset_state() {
        let mut states = ContainerStates::new();
        states.ensure_initialized("app");
        states.get_mut("app").unwrap().memory.integral_us = 42;
        states.ensure_initialized("app");
        assert_eq!(states.get_mut("app").unwrap().memory.integral_us, 42);
    }
}

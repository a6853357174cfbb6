//! Per-container tunables, loaded once from environment variables named
//! `<CONTAINER_NAME_UPPERCASE>_<FIELD>` on first observation of a
//! container.

use std::env;

use tracing::warn;

use super::quantity::{parse_cpu_millicores, parse_memory_bytes};

/// Memory-controller tunables resolved from env vars or defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTunables {
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub target_pressure_us: u64,
    pub max_inc: f64,
    pub max_dec: f64,
    pub coeff_inc: f64,
    pub coeff_dec: f64,
    pub interval: u64,
}

impl Default for MemoryTunables {
    fn default() -> Self {
        Self {
            min_bytes: 50_000_000,
            max_bytes: 100_000_000_000,
            target_pressure_us: 10_000,
            max_inc: 0.5,
            max_dec: 0.02,
            coeff_inc: 20.0,
            coeff_dec: 10.0,
            interval: 10,
        }
    }
}

/// CPU-controller tunables resolved from env vars or defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuTunables {
    pub min_mcpu: u64,
    pub max_mcpu: u64,
    pub target_avg: f64,
    pub max_inc: f64,
    pub max_dec: f64,
    pub coeff: u64,
    pub interval: u64,
}

impl Default for CpuTunables {
    fn default() -> Self {
        Self {
            min_mcpu: 10,
            max_mcpu: 100_000,
            target_avg: 0.8,
            max_inc: 0.5,
            max_dec: 0.1,
            coeff: 6,
            interval: 6,
        }
    }
}

/// Combined tunables for one container, resolved once on first observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTunables {
    pub memory: MemoryTunables,
    pub cpu: CpuTunables,
}

impl ContainerTunables {
    /// Resolve tunables for `container_name` from `<NAME>_<FIELD>`
    /// environment variables, falling back to defaults and logging a
    /// warning on any parse failure or out-of-range value.
    pub fn from_env(container_name: &str) -> Self {
        let prefix = container_name.to_uppercase();
        let defaults = MemoryTunables::default();
        let cpu_defaults = CpuTunables::default();

        let mut memory = MemoryTunables {
            min_bytes: quantity_var(&prefix, "MEMORY_MIN", parse_memory_bytes, defaults.min_bytes, |v| v > 0),
            max_bytes: quantity_var(&prefix, "MEMORY_MAX", parse_memory_bytes, defaults.max_bytes, |v| v > 0),
            target_pressure_us: numeric_var(&prefix, "MEMORY_TARGET_PRESSURE", defaults.target_pressure_us, |v| v > 0),
            max_inc: float_var(&prefix, "MEMORY_MAX_INC", defaults.max_inc, |v| v > 0.0),
            max_dec: float_var(&prefix, "MEMORY_MAX_DEC", defaults.max_dec, |v| v > 0.0 && v < 1.0),
            coeff_inc: float_var(&prefix, "MEMORY_COEFF_INC", defaults.coeff_inc, |v| v > 0.0),
            coeff_dec: float_var(&prefix, "MEMORY_COEFF_DEC", defaults.coeff_dec, |v| v > 0.0),
            interval: numeric_var(&prefix, "MEMORY_INTERVAL", defaults.interval, |v| v > 0),
        };
        if memory.min_bytes > memory.max_bytes {
            warn!(
                container = container_name,
                min = memory.min_bytes,
                max = memory.max_bytes,
                "memory min exceeds max, falling back to defaults"
            );
            memory.min_bytes = defaults.min_bytes;
            memory.max_bytes = defaults.max_bytes;
        }

        let mut cpu = CpuTunables {
            min_mcpu: quantity_var(&prefix, "CPU_MIN", parse_cpu_millicores, cpu_defaults.min_mcpu, |v| v > 0),
            max_mcpu: quantity_var(&prefix, "CPU_MAX", parse_cpu_millicores, cpu_defaults.max_mcpu, |v| v > 0),
            target_avg: float_var(&prefix, "CPU_TARGET_AVG", cpu_defaults.target_avg, |v| v > 0.0),
            max_inc: float_var(&prefix, "CPU_MAX_INC", cpu_defaults.max_inc, |v| v > 0.0),
            max_dec: float_var(&prefix, "CPU_MAX_DEC", cpu_defaults.max_dec, |v| v > 0.0 && v < 1.0),
            coeff: numeric_var(&prefix, "CPU_COEFF", cpu_defaults.coeff, |v| v > 0),
            interval: numeric_var(&prefix, "CPU_INTERVAL", cpu_defaults.interval, |v| v > 0),
        };
        if cpu.min_mcpu > cpu.max_mcpu {
            warn!(
                container = container_name,
                min = cpu.min_mcpu,
                max = cpu.max_mcpu,
                "cpu min exceeds max, falling back to defaults"
            );
            cpu.min_mcpu = cpu_defaults.min_mcpu;
            cpu.max_mcpu = cpu_defaults.max_mcpu;
        }

        Self { memory, cpu }
    }
}

fn quantity_var(
    prefix: &str,
    field: &str,
    parse: impl Fn(&str) -> anyhow::Result<u64>,
    default: u64,
    valid: impl Fn(u64) -> bool,
) -> u64 {
    let name = format!("{prefix}_{field}");
    match env::var(&name) {
        Ok(raw) => match parse(&raw).ok().filter(|v| valid(*v)) {
            Some(v) => v,
            None => {
                warn!(var = %name, value = %raw, "invalid quantity, falling back to default");
                default
            }
        },
        Err(_) => default,
    }
}

fn numeric_var(prefix: &str, field: &str, default: u64, valid: impl Fn(u64) -> bool) -> u64 {
    let name = format!("{prefix}_{field}");
    match env::var(&name) {
        Ok(raw) => match raw.parse::<u64>().ok().filter(|v| valid(*v)) {
            Some(v) => v,
            None => {
                warn!(var = %name, value = %raw, "invalid value, falling back to default");
                default
            }
        },
        Err(_) => default,
    }
}

fn float_var(prefix: &str, field: &str, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
    let name = format!("{prefix}_{field}");
    match env::var(&name) {
        Ok(raw) => match raw.parse::<f64>().ok().filter(|v| valid(*v)) {
            Some(v) => v,
            None => {
                warn!(var = %name, value = %raw, "invalid value, falling back to default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        env::remove_var("APP_MEMORY_MIN");
        let t = ContainerTunables::from_env("app");
        assert_eq!(t.memory, MemoryTunables::default());
        assert_eq!(t.cpu, CpuTunables::default());
    }

    #[test]
    fn reads_quantity_env_var() {
        env::set_var("WEB_MEMORY_MIN", "64Mi");
        let t = ContainerTunables::from_env("web");
        assert_eq!(t.memory.min_bytes, 64 * 1024 * 1024);
        env::remove_var("WEB_MEMORY_MIN");
    }

    #[test]
    fn falls_back_on_invalid_value() {
        env::set_var("DB_MEMORY_MAX_DEC", "1.5"); // out of (0,1) range
        let t = ContainerTunables::from_env("db");
        assert_eq!(t.memory.max_dec, MemoryTunables::default().max_dec);
        env::remove_var("DB_MEMORY_MAX_DEC");
    }

    #[test]
    fn falls_back_on_unparseable_value() {
        env::set_var("DB_CPU_COEFF", "not-a-number");
        let t = ContainerTunables::from_env("db");
        assert_eq!(t.cpu.coeff, CpuTunables::default().coeff);
        env::remove_var("DB_CPU_COEFF");
    }

    #[test]
    fn falls_back_to_defaults_when_memory_min_exceeds_max() {
        env::set_var("CACHE_MEMORY_MIN", "200Mi");
        env::set_var("CACHE_MEMORY_MAX", "100Mi");
        let t = ContainerTunables::from_env("cache");
        assert_eq!(t.memory.min_bytes, MemoryTunables::default().min_bytes);
        assert_eq!(t.memory.max_bytes, MemoryTunables::default().max_bytes);
        env::remove_var("CACHE_MEMORY_MIN");
        env::remove_var("CACHE_MEMORY_MAX");
    }

    #[test]
    fn falls_back_to_defaults_when_cpu_min_exceeds_max() {
        env::set_var("CACHE_CPU_MIN", "500m");
        env::set_var("CACHE_CPU_MAX", "100m");
        let t = ContainerTunables::from_env("cache");
        assert_eq!(t.cpu.min_mcpu, CpuTunables::default().min_mcpu);
        assert_eq!(t.cpu.max_mcpu, CpuTunables::default().max_mcpu);
        env::remove_var("CACHE_CPU_MIN");
        env::remove_var("CACHE_CPU_MAX");
    }
}

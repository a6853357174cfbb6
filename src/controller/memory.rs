//! Memory pressure-integral controller: expand under stress, probe down
//! cautiously otherwise.

use crate::config::MemoryTunables;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryController {
    pub limit_bytes: u64,
    pub prev_total_us: u64,
    pub integral_us: u64,
    pub grace_ticks: u64,
    pub tunables: MemoryTunables,
}

impl MemoryController {
    pub fn new(tunables: MemoryTunables) -> Self {
        let grace_ticks = tunables.interval;
        Self {
            limit_bytes: 0,
            prev_total_us: 0,
            integral_us: 0,
            grace_ticks,
            tunables,
        }
    }

    /// Fold in a new `memory.pressure` "some total" reading. Saturating
    /// subtraction guards against counter resets on container restart.
    pub fn observe(&mut self, total_us: u64) {
        let delta = total_us.saturating_sub(self.prev_total_us);
        self.prev_total_us = total_us;
        self.integral_us = self.integral_us.saturating_add(delta);
    }

    /// Produce this tick's fractional memory adjustment and advance the
    /// grace-tick state machine (Expand / Wait / Probe).
    pub fn decide(&mut self) -> f64 {
        let t = &self.tunables;

        if self.integral_us > t.target_pressure_us {
            let diff = self.integral_us as f64 / (t.target_pressure_us.max(1) as f64);
            let adj = (diff / t.coeff_inc).powi(2);
            let adj = (adj * t.max_inc).min(t.max_inc);

            self.grace_ticks = t.interval.saturating_sub(1);
            return adj;
        }

        if self.grace_ticks > 0 {
            self.grace_ticks -= 1;
            return 0.0;
        }

        let diff = t.target_pressure_us as f64 / (self.integral_us.max(1) as f64);
        let adj = (diff / t.coeff_dec).powi(2);
        let adj = (adj * t.max_dec).min(t.max_dec);

        self.grace_ticks = t.interval.saturating_sub(1);
        -adj
    }

    /// Clear the integral after a successful patch.
    pub fn reset_integral(&mut self) {
        self.integral_us = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> MemoryController {
        let mut t = MemoryTunables::default();
        t.target_pressure_us = 10_000;
        t.interval = 10;
        t.coeff_inc = 20.0;
        t.coeff_dec = 10.0;
        t.max_inc = 0.5;
        t.max_dec = 0.02;
        MemoryController::new(t)
    }

    #[test]
    fn initial_state_is_wait_with_full_grace() {
        let c = controller();
        assert_eq!(c.grace_ticks, 10);
        assert_eq!(c.integral_us, 0);
    }

    #[test]
    fn steady_small_deltas_probe_down_once_grace_exhausted() {
        // Raw PSI totals 100, 200, ..., 1000 (delta 100/tick), target=10000,
        // interval=10: the integral never exceeds target, so every tick
        // takes the grace/probe branch. grace_ticks is seeded to `interval`
        // (not `interval - 1`) for the very first cycle only, so it takes
        // a full 10 ticks to exhaust before the first probe-down fires.
        let mut c = controller();
        for tick in 1..=10u64 {
            c.observe(tick * 100);
            let adj = c.decide();
            assert_eq!(adj, 0.0, "tick {tick} should still be gracing");
        }
        assert_eq!(c.grace_ticks, 0);
        assert_eq!(c.integral_us, 1000);

        let adj = c.decide();
        assert!(adj < 0.0, "grace exhausted: this tick probes down");
        assert_eq!(c.grace_ticks, c.tunables.interval - 1);
    }

    #[test]
    fn pressure_spike_expands_proportionally_to_target_overshoot() {
        let mut c = controller();
        c.limit_bytes = 100 * 1024 * 1024;
        c.observe(50_000);
        let adj = c.decide();
        assert!((adj - 0.0625).abs() < 1e-9);
        assert_eq!(c.grace_ticks, 9);
    }

    #[test]
    fn expansion_caps_at_max_inc() {
        let mut c = controller();
        c.observe(10_000_000);
        let adj = c.decide();
        assert_eq!(adj, c.tunables.max_inc);
    }

    #[test]
    fn probe_down_caps_at_max_dec_without_dividing_by_zero() {
        let mut c = controller();
        c.grace_ticks = 0;
        c.integral_us = 0;
        let adj = c.decide();
        assert!(adj.is_finite());
        assert!((-adj) <= c.tunables.max_dec);
    }

    #[test]
    fn reset_clears_integral_only() {
        let mut c = controller();
        c.integral_us = 500;
        c.reset_integral();
        assert_eq!(c.integral_us, 0);
    }
}

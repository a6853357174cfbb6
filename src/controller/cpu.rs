//! CPU sliding-window utilization controller.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::CpuTunables;

#[derive(Debug, Clone, Copy)]
struct Sample {
    user_usec: u64,
    at: Instant,
}

#[derive(Debug, Clone)]
pub struct CpuController {
    pub limit_mcpu: u64,
    pub avg_mcpu: u64,
    samples: VecDeque<Sample>,
    pub tunables: CpuTunables,
}

impl CpuController {
    pub fn new(tunables: CpuTunables) -> Self {
        let capacity = tunables.interval as usize;
        Self {
            limit_mcpu: 0,
            avg_mcpu: 0,
            samples: VecDeque::with_capacity(capacity.max(1)),
            tunables,
        }
    }

    /// Push a new `user_usec` reading, dropping the oldest sample once the
    /// FIFO is at capacity, and recompute `avg_mcpu` from the oldest and
    /// newest samples once at least two are available.
    pub fn observe(&mut self, user_usec: u64, now: Instant) {
        let capacity = self.tunables.interval as usize;
        if self.samples.len() == capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { user_usec, at: now });

        if self.samples.len() < 2 {
            return;
        }

        let oldest = self.samples.front().expect("len >= 2");
        let newest = self.samples.back().expect("len >= 2");

        let delta_usec = newest.user_usec.saturating_sub(oldest.user_usec);
        let elapsed_us = newest.at.duration_since(oldest.at).as_micros().max(1) as f64;

        let avg_cpu = delta_usec as f64 / elapsed_us;
        self.avg_mcpu = (avg_cpu * 1000.0).round() as u64;
    }

    /// Proportional, asymmetric sizing decision from the current average
    /// utilization. Returns 0 until the FIFO has at least two samples.
    pub fn decide(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }

        let t = &self.tunables;
        let new_limit = self.avg_mcpu as f64 / t.target_avg.max(0.1);
        let adj = new_limit / self.limit_mcpu as f64 - 1.0;

        if adj > 0.0 {
            let boosted = adj + (t.coeff as f64 * adj).powi(2);
            boosted.min(t.max_inc)
        } else {
            adj.max(-t.max_dec)
        }
    }

    #[cfg(test)]
    pub fn sample_len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn controller() -> CpuController {
        let mut t = CpuTunables::default();
        t.target_avg = 0.8;
        t.coeff = 6;
        t.max_inc = 0.5;
        t.max_dec = 0.1;
        t.interval = 6;
        CpuController::new(t)
    }

    #[test]
    fn fifo_is_bounded_by_interval() {
        let mut c = controller();
        let base = Instant::now();
        for i in 0..20u64 {
            c.observe(i * 100_000, base + Duration::from_secs(i));
        }
        assert!(c.sample_len() <= c.tunables.interval as usize);
    }

    #[test]
    fn fewer_than_two_samples_yields_zero_factor() {
        let mut c = controller();
        c.limit_mcpu = 1000;
        c.observe(1000, Instant::now());
        assert_eq!(c.decide(), 0.0);
    }

    #[test]
    fn steady_over_target_utilization_converges_with_boosted_increase() {
        let mut c = controller();
        c.limit_mcpu = 1000;
        let base = Instant::now();
        // 1200 mcpu steady utilization -> 1.2 usec of user time per usec of
        // wall clock; simulate with a one-second window.
        c.observe(0, base);
        c.observe(1_200_000, base + Duration::from_secs(1));
        assert_eq!(c.avg_mcpu, 1200);

        let adj = c.decide();
        // adj = 1200/(0.8*1000) - 1 = 0.5; boosted = 0.5 + (6*0.5)^2 = 9.5;
        // clamped to max_inc = 0.5.
        assert_eq!(adj, 0.5);
    }

    #[test]
    fn over_provisioned_returns_bounded_negative_factor() {
        let mut c = controller();
        c.limit_mcpu = 2000;
        let base = Instant::now();
        c.observe(0, base);
        c.observe(100_000, base + Duration::from_secs(1));
        let adj = c.decide();
        assert!(adj < 0.0);
        assert!(adj >= -c.tunables.max_dec);
    }
}

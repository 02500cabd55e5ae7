// ===============================
// src/backoff.rs
// ===============================
use rand::Rng;
use tokio::time::Duration;

/// Restart pacing for the stream supervisor.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base: Duration,
    pub max: Duration,
    /// +/- fraction applied to each delay (0.2 = 20%).
    pub jitter: f64,
    /// A stream that stayed up this long resets the backoff.
    pub stable_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: 0.2,
            stable_after: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct RetryPolicy {
    cfg: RetryConfig,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self { Self { cfg, attempt: 0 } }

    /// Exponential (base * 2^n) capped at `max`, then jittered.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(20);
        self.attempt = self.attempt.saturating_add(1);
        let raw = self.cfg.base.saturating_mul(1u32 << shift).min(self.cfg.max);
        self.jittered(raw)
    }

    pub fn reset(&mut self) { self.attempt = 0; }

    pub fn attempt(&self) -> u32 { self.attempt }

    pub fn stable_after(&self) -> Duration { self.cfg.stable_after }

    fn jittered(&self, d: Duration) -> Duration {
        let j = self.cfg.jitter.clamp(0.0, 1.0);
        if j == 0.0 {
            return d;
        }
        let f = rand::thread_rng().gen_range(1.0 - j..=1.0 + j);
        d.mul_f64(f)
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with jitter for transient failures.

use std::time::Duration;

use rand::Rng;

/// Retry delay schedule: `base * factor^(attempt - 1)`, capped, with uniform
/// relative jitter applied before the cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    /// Relative jitter in `[0, 1)`; `0.2` means ±20%.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Returns the same schedule with jitter disabled.
    pub fn without_jitter(self) -> Self {
        BackoffPolicy {
            jitter: 0.0,
            ..self
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.base.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        Duration::from_secs_f64(secs.min(self.cap.as_secs_f64()))
    }

    /// Delay before retry number `attempt` (1-based), jittered and capped.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal(attempt).as_secs_f64();
        let jitter = self.jitter.clamp(0.0, 0.99);
        let scale = if jitter > 0.0 {
            1.0 + rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((nominal * scale).clamp(0.0, self.cap.as_secs_f64()))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

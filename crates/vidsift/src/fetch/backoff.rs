//! Jittered exponential backoff for transcript retries.
//!
//! The jitter is not cosmetic: the upstream rate limiter keys on
//! periodic request signatures, so no two retries across concurrent
//! fetches should be observably synchronized. A small random delay is
//! also applied before the very first attempt of any fetch.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Exponential base. Delay grows as `base^attempt`.
    pub base: f64,
    /// Cap on the exponential component.
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every backoff delay.
    pub jitter_span: Duration,
    /// Bounds of the uniform pre-request delay applied before the first
    /// attempt.
    pub pre_request_min: Duration,
    pub pre_request_max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: 2.0,
            max_delay: Duration::from_secs(60),
            jitter_span: Duration::from_secs(2),
            pre_request_min: Duration::from_millis(500),
            pre_request_max: Duration::from_millis(2000),
        }
    }
}

impl BackoffPolicy {
    /// A policy with zero delays everywhere, for tests.
    pub fn none() -> Self {
        Self {
            base: 0.0,
            max_delay: Duration::ZERO,
            jitter_span: Duration::ZERO,
            pre_request_min: Duration::ZERO,
            pre_request_max: Duration::ZERO,
        }
    }

    /// Delay before retry `attempt` (0-based):
    /// `min(max_delay, base^attempt) + uniform(0, jitter_span)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_span.as_secs_f64());
        Duration::from_secs_f64(capped + jitter)
    }

    /// Uniform random delay applied before the first attempt of any
    /// fetch, independent of retry state.
    pub fn pre_request_delay(&self) -> Duration {
        let min = self.pre_request_min.as_secs_f64();
        let max = self.pre_request_max.as_secs_f64().max(min);
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
    }
}

//! Half-open probe scheduling.
//!
//! # Responsibilities
//! - Decide whether a racing caller may probe a recovering dependency
//! - Run probe attempts on a bounded time budget
//!
//! # Design Decisions
//! - Bernoulli admission spreads probes instead of letting every waiting
//!   caller hit the dependency at once
//! - Probabilities outside [0, 1] are clamped; NaN never admits

use std::future::Future;
use std::time::Duration;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::resilience::backoff::retry_window_for;
use crate::resilience::error::TimeoutError;
use crate::resilience::timeouts::with_timeout;

/// Bernoulli trial with success probability `p`.
pub fn probabilistic_admit(p: f64) -> bool {
    if p.is_nan() {
        return false;
    }
    let p = p.clamp(0.0, 1.0);
    rand::thread_rng().gen_bool(p)
}

/// Probe admission and timing policy for one breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryScheduler {
    /// Admission probability for callers racing an in-flight probe.
    pub probe_probability: f64,
    /// Upper bound on concurrent half-open probes.
    pub max_probes: usize,
    /// Hard budget for a probe when no call timeout is configured.
    pub probe_timeout: Duration,
    /// First retry window.
    pub window_base: Duration,
    /// Largest retry window after repeated failed episodes.
    pub window_max: Duration,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self {
            probe_probability: 0.5,
            max_probes: 1,
            probe_timeout: Duration::from_secs(30),
            window_base: Duration::from_secs(10),
            window_max: Duration::from_secs(300),
        }
    }
}

impl RetryScheduler {
    /// Whether a caller may take a probe slot given the probes in flight.
    ///
    /// The first slot is always granted so recovery can make progress;
    /// further slots go through a Bernoulli trial.
    pub fn admit_probe(&self, in_flight: usize) -> bool {
        if in_flight >= self.max_probes.max(1) {
            return false;
        }
        in_flight == 0 || probabilistic_admit(self.probe_probability)
    }

    /// Retry window to use for the given Open episode.
    pub fn retry_window(&self, episode: u32) -> Duration {
        retry_window_for(episode, self.window_base, self.window_max)
    }

    /// Time budget for one probe. A configured call timeout wins.
    pub fn probe_budget(&self, call_timeout: Option<Duration>) -> Duration {
        call_timeout.unwrap_or(self.probe_timeout)
    }

    /// Run a probe attempt with a deadline.
    ///
    /// A probe that never finishes would otherwise hold its slot forever
    /// and pin the breaker in HalfOpen.
    pub async fn with_timeout<F, Fut, T>(&self, duration: Duration, operation: F) -> Result<T, TimeoutError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        with_timeout(duration, operation).await
    }
}

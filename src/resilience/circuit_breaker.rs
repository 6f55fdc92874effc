//! Per-dependency circuit breaker.
//!
//! # Responsibilities
//! - Gate calls to one dependency (Closed / Open / HalfOpen)
//! - Score failures through the classifier and open on the threshold
//! - Bound half-open probing and grow the retry window per episode
//! - Notify observers (dependency graph, monitor feed) of transitions
//!
//! # State Machine
//! ```text
//!            score >= threshold
//!   Closed ─────────────────────▶ Open ◀──────────┐
//!     ▲                            │              │ probe failed
//!     │ probe succeeded            │ retry window │
//!     │ (score = 0)                ▼ elapsed      │
//!     └──────────────────────── HalfOpen ─────────┘
//! ```
//!
//! # Design Decisions
//! - One mutex per breaker; the operation always runs outside it
//! - Open → HalfOpen is evaluated lazily on the next call, no timer task
//! - Observers are called after the lock is released, so a cascade that
//!   touches other breakers can never deadlock on this one
//! - Probe slots are RAII permits tagged with the half-open generation;
//!   a permit from an older episode cannot free a newer slot

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

use crate::adaptive::window::TelemetryWindow;
use crate::config::DependencyConfig;
use crate::observability::metrics;
use crate::resilience::classifier::{FailureClassifier, FailureEvent, FailureKind};
use crate::resilience::clock::{unix_millis, Clock, SystemClock};
use crate::resilience::error::{CallError, TimeoutError};
use crate::resilience::retries::RetryScheduler;
use crate::resilience::timeouts::with_timeout;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// 0 closed, 1 half-open, 2 open. Higher is worse.
    pub fn severity(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a breaker changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionCause {
    /// Failure score reached the threshold.
    Threshold,
    /// Open long enough to probe.
    RetryWindowElapsed,
    ProbeSucceeded,
    ProbeFailed,
    /// Propagated from a failing dependency.
    Cascade { origin: String },
    /// Operator reset.
    Manual,
}

impl TransitionCause {
    pub fn is_cascade(&self) -> bool {
        matches!(self, TransitionCause::Cascade { .. })
    }
}

/// A state change, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub dependency: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub cause: TransitionCause,
    pub failure_score: f64,
    pub threshold: f64,
    pub at_unix_ms: u64,
}

/// Receives transition events from breakers it subscribed to.
///
/// Called synchronously on the thread that caused the transition, after
/// the breaker's lock has been released.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, event: &TransitionEvent);
}

/// Lifetime call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerCounters {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
    pub probes: u64,
}

/// Point-in-time view of one breaker, read under a single lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_score: f64,
    pub threshold: f64,
    pub last_transition_unix_ms: u64,
    pub retry_window_ms: u64,
    pub open_episode: Option<u32>,
    pub in_flight_probes: usize,
    pub last_failure: Option<FailureKind>,
    pub counters: BreakerCounters,
}

/// Settings swapped in as a whole on reconfiguration.
#[derive(Debug, Clone)]
struct BreakerPolicy {
    classifier: FailureClassifier,
    scheduler: RetryScheduler,
    success_decay: f64,
    decay_half_life: Option<Duration>,
    call_timeout: Option<Duration>,
    sustained_closed: Duration,
    min_threshold: f64,
    max_threshold: f64,
}

impl BreakerPolicy {
    fn from_config(config: &DependencyConfig, classifier: FailureClassifier) -> Self {
        Self {
            classifier,
            scheduler: RetryScheduler {
                probe_probability: config.half_open_probe_probability,
                max_probes: config.half_open_max_probes,
                probe_timeout: config.half_open_probe_timeout(),
                window_base: config.retry_window_base(),
                window_max: config.retry_window_max(),
            },
            success_decay: config.success_decay.clamp(0.0, 1.0),
            decay_half_life: config.decay_half_life(),
            call_timeout: config.call_timeout(),
            sustained_closed: config.sustained_closed(),
            min_threshold: config.min_threshold,
            max_threshold: config.max_threshold,
        }
    }

    fn clamp_threshold(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min_threshold;
        }
        value.max(self.min_threshold).min(self.max_threshold)
    }
}

struct BreakerCore {
    state: CircuitState,
    score: f64,
    score_at: Instant,
    threshold: f64,
    changed_at: Instant,
    changed_at_wall: SystemTime,
    retry_window: Duration,
    /// Consecutive Open episodes; `None` until the first open or after a
    /// sustained Closed period.
    episode: Option<u32>,
    closed_since: Instant,
    in_flight_probes: usize,
    probe_generation: u64,
    window: TelemetryWindow,
    counters: BreakerCounters,
    last_failure: Option<FailureKind>,
}

impl BreakerCore {
    /// Apply time decay to the score up to `now`.
    fn decay(&mut self, now: Instant, half_life: Option<Duration>) {
        if let Some(half_life) = half_life.filter(|h| !h.is_zero()) {
            let dt = now.saturating_duration_since(self.score_at);
            self.score *= 0.5f64.powf(dt.as_secs_f64() / half_life.as_secs_f64());
        }
        self.score_at = now;
    }
}

enum Admission<'a> {
    Normal,
    Probe(ProbePermit<'a>),
}

/// Half-open probe slot, released on drop.
struct ProbePermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        let mut core = self.breaker.lock();
        if core.probe_generation == self.generation {
            core.in_flight_probes = core.in_flight_probes.saturating_sub(1);
        }
    }
}

/// Circuit breaker guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    clock: Arc<dyn Clock>,
    policy: ArcSwap<BreakerPolicy>,
    core: Mutex<BreakerCore>,
    observers: RwLock<Vec<Weak<dyn TransitionObserver>>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Breaker on the system clock.
    pub fn new(config: &DependencyConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DependencyConfig, clock: Arc<dyn Clock>) -> Self {
        let classifier = FailureClassifier::new(config.failure_weights)
            .with_degraded_latency(config.degraded_latency());
        let policy = BreakerPolicy::from_config(config, classifier);
        let now = clock.now();

        let core = BreakerCore {
            state: CircuitState::Closed,
            score: 0.0,
            score_at: now,
            threshold: policy.clamp_threshold(config.base_threshold),
            changed_at: now,
            changed_at_wall: clock.wall(),
            retry_window: policy.scheduler.window_base,
            episode: None,
            closed_since: now,
            in_flight_probes: 0,
            probe_generation: 0,
            window: TelemetryWindow::new(config.telemetry_window()),
            counters: BreakerCounters::default(),
            last_failure: None,
        };

        Self {
            name: config.name.clone(),
            clock,
            policy: ArcSwap::from_pointee(policy),
            core: Mutex::new(core),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Replace the failure classifier (e.g. to add custom rules).
    pub fn with_classifier(self, classifier: FailureClassifier) -> Self {
        let mut policy = BreakerPolicy::clone(&self.policy.load());
        policy.classifier = classifier;
        self.policy.store(Arc::new(policy));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` if the breaker admits it.
    ///
    /// The operation's own error is returned unchanged inside
    /// `CallError::Underlying`.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.call_with_cancel(|_token| operation()).await
    }

    /// Like `call`, but the operation receives a token that is cancelled
    /// when the call timeout expires.
    pub async fn call_with_cancel<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_in) => {
                metrics::record_rejection(&self.name);
                tracing::debug!(dependency = %self.name, retry_in = ?retry_in, "Call rejected by open circuit");
                return Err(CallError::Open {
                    dependency: self.name.clone(),
                    retry_in,
                });
            }
        };

        let probe = match &admission {
            Admission::Probe(permit) => {
                tracing::info!(dependency = %self.name, "Admitting half-open probe");
                Some(permit.generation)
            }
            Admission::Normal => None,
        };

        let (scheduler, call_timeout) = {
            let policy = self.policy.load();
            (policy.scheduler, policy.call_timeout)
        };
        let started = self.clock.now();
        let outcome = match (probe, call_timeout) {
            (Some(_), _) => {
                scheduler
                    .with_timeout(scheduler.probe_budget(call_timeout), operation)
                    .await
            }
            (None, Some(budget)) => with_timeout(budget, operation).await,
            (None, None) => Ok(operation(CancellationToken::new()).await),
        };
        let elapsed = self.clock.now().saturating_duration_since(started);

        let result = match outcome {
            Ok(Ok(value)) => {
                if probe.is_some() {
                    tracing::info!(dependency = %self.name, elapsed = ?elapsed, "Probe succeeded");
                }
                self.record_success(probe, elapsed);
                metrics::record_call(&self.name, "success", elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                let event = self.policy.load().classifier.classify(&err, self.clock.now());
                if probe.is_some() {
                    tracing::warn!(dependency = %self.name, kind = %event.kind, error = %err, "Probe failed");
                } else {
                    tracing::debug!(dependency = %self.name, kind = %event.kind, error = %err, "Call failed");
                }
                self.record_failure(probe, event, elapsed);
                metrics::record_call(&self.name, event.kind.as_str(), elapsed);
                Err(CallError::Underlying(err))
            }
            Err(TimeoutError(after)) => {
                let event = self
                    .policy
                    .load()
                    .classifier
                    .event(FailureKind::Timeout, self.clock.now());
                tracing::warn!(dependency = %self.name, after = ?after, probe = probe.is_some(), "Call timed out");
                self.record_failure(probe, event, elapsed);
                metrics::record_call(&self.name, FailureKind::Timeout.as_str(), elapsed);
                Err(CallError::Timeout {
                    dependency: self.name.clone(),
                    after,
                })
            }
        };

        drop(admission);
        result
    }

    /// Admission decision. `Err` carries the time left in the retry window.
    fn admit(&self) -> Result<Admission<'_>, Duration> {
        let policy = self.policy.load();
        let now = self.clock.now();
        let mut transitions = Vec::new();

        let admission = {
            let mut core = self.lock();
            core.decay(now, policy.decay_half_life);

            if core.state == CircuitState::Closed && core.score >= core.threshold {
                transitions.push(self.open(&mut core, &policy, now, TransitionCause::Threshold));
            }
            if core.state == CircuitState::Open
                && now.saturating_duration_since(core.changed_at) >= core.retry_window
            {
                transitions.push(self.transition(
                    &mut core,
                    CircuitState::HalfOpen,
                    TransitionCause::RetryWindowElapsed,
                    now,
                ));
            }

            let state = core.state;
            match state {
                CircuitState::Closed => {
                    core.counters.calls += 1;
                    Ok(Admission::Normal)
                }
                CircuitState::HalfOpen if policy.scheduler.admit_probe(core.in_flight_probes) => {
                    core.in_flight_probes += 1;
                    core.counters.calls += 1;
                    core.counters.probes += 1;
                    Ok(Admission::Probe(ProbePermit {
                        breaker: self,
                        generation: core.probe_generation,
                    }))
                }
                CircuitState::HalfOpen => {
                    core.counters.rejections += 1;
                    Err(Duration::ZERO)
                }
                CircuitState::Open => {
                    core.counters.rejections += 1;
                    let waited = now.saturating_duration_since(core.changed_at);
                    Err(core.retry_window.saturating_sub(waited))
                }
            }
        };

        self.publish(transitions);
        admission
    }

    fn record_success(&self, probe: Option<u64>, elapsed: Duration) {
        let policy = self.policy.load();
        let now = self.clock.now();
        let mut transitions = Vec::new();

        let gauges = {
            let mut core = self.lock();
            core.decay(now, policy.decay_half_life);
            core.counters.successes += 1;

            let degraded = policy.classifier.classify_latency(elapsed, now);
            match degraded {
                Some(event) => core.window.record_failure(event, elapsed),
                None => core.window.record_success(now, elapsed),
            }

            let state = core.state;
            match state {
                CircuitState::HalfOpen if probe == Some(core.probe_generation) => {
                    core.score = 0.0;
                    transitions.push(self.transition(
                        &mut core,
                        CircuitState::Closed,
                        TransitionCause::ProbeSucceeded,
                        now,
                    ));
                }
                CircuitState::Closed => match degraded {
                    Some(event) => {
                        core.last_failure = Some(event.kind);
                        core.score += event.weight;
                        if core.score >= core.threshold {
                            transitions.push(self.open(&mut core, &policy, now, TransitionCause::Threshold));
                        }
                    }
                    None => core.score *= policy.success_decay,
                },
                // Late success from a call admitted before the circuit opened.
                _ => {}
            }
            (core.state, core.score, core.threshold)
        };

        metrics::record_breaker(&self.name, gauges.0, gauges.1, gauges.2);
        self.publish(transitions);
    }

    fn record_failure(&self, probe: Option<u64>, event: FailureEvent, elapsed: Duration) {
        let policy = self.policy.load();
        let now = self.clock.now();
        let mut transitions = Vec::new();

        let gauges = {
            let mut core = self.lock();
            core.decay(now, policy.decay_half_life);
            core.counters.failures += 1;
            core.last_failure = Some(event.kind);
            core.window.record_failure(event, elapsed);
            core.score += event.weight;

            let state = core.state;
            match state {
                CircuitState::HalfOpen if probe == Some(core.probe_generation) => {
                    transitions.push(self.open(&mut core, &policy, now, TransitionCause::ProbeFailed));
                }
                CircuitState::Closed if core.score >= core.threshold => {
                    transitions.push(self.open(&mut core, &policy, now, TransitionCause::Threshold));
                }
                _ => {}
            }
            (core.state, core.score, core.threshold)
        };

        metrics::record_breaker(&self.name, gauges.0, gauges.1, gauges.2);
        self.publish(transitions);
    }

    /// Enter Open, growing the retry window for consecutive episodes.
    fn open(
        &self,
        core: &mut BreakerCore,
        policy: &BreakerPolicy,
        now: Instant,
        cause: TransitionCause,
    ) -> TransitionEvent {
        let closed_for = now.saturating_duration_since(core.closed_since);
        let episode = match (core.state, core.episode) {
            (CircuitState::HalfOpen, Some(n)) => n.saturating_add(1),
            (CircuitState::Closed, Some(n)) if closed_for < policy.sustained_closed => n.saturating_add(1),
            _ => 0,
        };
        core.episode = Some(episode);
        core.retry_window = policy.scheduler.retry_window(episode);
        self.transition(core, CircuitState::Open, cause, now)
    }

    fn transition(
        &self,
        core: &mut BreakerCore,
        to: CircuitState,
        cause: TransitionCause,
        now: Instant,
    ) -> TransitionEvent {
        let from = core.state;
        let wall = self.clock.wall();
        core.state = to;
        core.changed_at = now;
        core.changed_at_wall = wall;

        match to {
            CircuitState::HalfOpen => {
                core.probe_generation += 1;
                core.in_flight_probes = 0;
            }
            CircuitState::Closed => core.closed_since = now,
            CircuitState::Open => {}
        }

        TransitionEvent {
            dependency: self.name.clone(),
            from,
            to,
            cause,
            failure_score: core.score,
            threshold: core.threshold,
            at_unix_ms: unix_millis(wall),
        }
    }

    /// Log, record and deliver transitions. Must be called without the lock.
    fn publish(&self, transitions: Vec<TransitionEvent>) {
        if transitions.is_empty() {
            return;
        }

        let observers: Vec<Arc<dyn TransitionObserver>> = {
            let mut registered = self.observers.write().unwrap_or_else(PoisonError::into_inner);
            registered.retain(|o| o.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };

        for event in transitions {
            match event.to {
                CircuitState::Open => tracing::warn!(
                    dependency = %event.dependency,
                    from = %event.from,
                    cause = ?event.cause,
                    failure_score = event.failure_score,
                    threshold = event.threshold,
                    "Circuit opened"
                ),
                _ => tracing::info!(
                    dependency = %event.dependency,
                    from = %event.from,
                    to = %event.to,
                    cause = ?event.cause,
                    "Circuit state changed"
                ),
            }
            metrics::record_transition(&event.dependency, event.from, event.to);
            metrics::record_breaker(&event.dependency, event.to, event.failure_score, event.threshold);

            for observer in &observers {
                observer.on_transition(&event);
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current failure score, with time decay applied.
    pub fn failure_score(&self) -> f64 {
        let half_life = self.policy.load().decay_half_life;
        let mut core = self.lock();
        core.decay(self.clock.now(), half_life);
        core.score
    }

    pub fn threshold(&self) -> f64 {
        self.lock().threshold
    }

    pub fn threshold_bounds(&self) -> (f64, f64) {
        let policy = self.policy.load();
        (policy.min_threshold, policy.max_threshold)
    }

    /// Install a new threshold, clamped to the configured bounds.
    /// Returns the value actually stored.
    pub fn set_threshold(&self, value: f64) -> f64 {
        let threshold = self.policy.load().clamp_threshold(value);
        let (state, score) = {
            let mut core = self.lock();
            core.threshold = threshold;
            (core.state, core.score)
        };
        metrics::record_breaker(&self.name, state, score, threshold);
        threshold
    }

    pub fn retry_window(&self) -> Duration {
        self.lock().retry_window
    }

    /// Open pre-emptively because `origin` failed. Returns whether the
    /// state changed.
    pub fn request_open(&self, origin: &str) -> bool {
        let policy = self.policy.load();
        let now = self.clock.now();

        let transition = {
            let mut core = self.lock();
            if core.state == CircuitState::Open {
                return false;
            }
            core.decay(now, policy.decay_half_life);
            self.open(
                &mut core,
                &policy,
                now,
                TransitionCause::Cascade {
                    origin: origin.to_string(),
                },
            )
        };

        self.publish(vec![transition]);
        true
    }

    /// Add cascade pressure to the failure score. Only a Closed breaker
    /// takes pressure. Returns whether it opened as a result.
    pub fn apply_pressure(&self, weight: f64, origin: &str) -> bool {
        if !weight.is_finite() || weight <= 0.0 {
            return false;
        }
        let policy = self.policy.load();
        let now = self.clock.now();

        let transition = {
            let mut core = self.lock();
            if core.state != CircuitState::Closed {
                return false;
            }
            core.decay(now, policy.decay_half_life);
            core.score += weight;
            tracing::debug!(dependency = %self.name, origin = %origin, weight, score = core.score, "Cascade pressure applied");
            if core.score < core.threshold {
                return false;
            }
            self.open(
                &mut core,
                &policy,
                now,
                TransitionCause::Cascade {
                    origin: origin.to_string(),
                },
            )
        };

        self.publish(vec![transition]);
        true
    }

    /// Force the breaker Closed with a zero score and a fresh retry window.
    pub fn reset(&self) {
        let policy = self.policy.load();
        let now = self.clock.now();

        let transition = {
            let mut core = self.lock();
            core.score = 0.0;
            core.score_at = now;
            core.episode = None;
            core.retry_window = policy.scheduler.window_base;
            if core.state == CircuitState::Closed {
                None
            } else {
                core.probe_generation += 1;
                core.in_flight_probes = 0;
                Some(self.transition(&mut core, CircuitState::Closed, TransitionCause::Manual, now))
            }
        };

        tracing::info!(dependency = %self.name, "Circuit reset");
        self.publish(transition.into_iter().collect());
    }

    /// Consistent status read under a single lock.
    pub fn status(&self) -> BreakerStatus {
        let half_life = self.policy.load().decay_half_life;
        let mut core = self.lock();
        core.decay(self.clock.now(), half_life);

        BreakerStatus {
            state: core.state,
            failure_score: core.score,
            threshold: core.threshold,
            last_transition_unix_ms: unix_millis(core.changed_at_wall),
            retry_window_ms: core.retry_window.as_millis() as u64,
            open_episode: core.episode,
            in_flight_probes: core.in_flight_probes,
            last_failure: core.last_failure,
            counters: core.counters,
        }
    }

    /// Copy of the rolling telemetry window, pruned to now.
    pub fn telemetry(&self) -> TelemetryWindow {
        let now = self.clock.now();
        let mut core = self.lock();
        core.window.prune(now);
        core.window.clone()
    }

    /// Register an observer. Dropped observers are pruned lazily.
    pub fn subscribe(&self, observer: Weak<dyn TransitionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Apply new settings, keeping state, score and classifier rules.
    /// The current threshold is re-clamped to the new bounds.
    pub fn reconfigure(&self, config: &DependencyConfig) {
        let classifier = self
            .policy
            .load()
            .classifier
            .clone()
            .with_weights(config.failure_weights)
            .with_degraded_latency(config.degraded_latency());
        let policy = BreakerPolicy::from_config(config, classifier);

        {
            let mut core = self.lock();
            core.threshold = policy.clamp_threshold(core.threshold);
            core.window.set_span(config.telemetry_window());
        }
        self.policy.store(Arc::new(policy));
        tracing::debug!(dependency = %self.name, "Breaker reconfigured");
    }
}

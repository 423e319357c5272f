//! Per-name circuit breaker and process-wide registry.
//!
//! State machine shape grounded in `route_quality::mitigation::
//! CircuitBreaker` in the teacher repo; generalized here into the
//! named-registry semantics of spec.md §4.3 (closed -> open -> half-open,
//! single-probe recovery, first-writer-wins config per name).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::BotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// True while a half-open probe is outstanding, so concurrent callers
    /// observing `HalfOpen` before it resolves are fast-failed instead of
    /// also being admitted (spec.md §4.3: "a single probe").
    probe_in_flight: bool,
}

/// A single named breaker. Thresholds are fixed at construction time and
/// never change for the lifetime of the breaker (spec.md §4.3, §9:
/// "first-writer-wins per name").
pub struct Breaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    monitoring_period: Duration,
    inner: Mutex<Inner>,
}

impl Breaker {
    fn new(name: String, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            monitoring_period: Duration::from_secs(300),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Execute `f` under this breaker's protection. `f` is only invoked if
    /// the breaker is closed, or open-but-past-recovery (a single
    /// half-open probe). A probe's own failure propagates unchanged after
    /// updating state; only the fast-fail path produces a
    /// `BotError::CircuitBreaker`.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, BotError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, BotError>>,
    {
        if !self.allow_attempt() {
            return Err(BotError::circuit_breaker(
                "CIRCUIT_OPEN",
                format!("circuit '{}' is open", self.name),
            ));
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    fn allow_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
            BreakerState::Open => {
                let past_recovery = inner
                    .last_failure_time
                    .map(|t| t.elapsed() > self.recovery_timeout)
                    .unwrap_or(false);
                if past_recovery {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.last_failure_time = None;
                inner.probe_in_flight = false;
                info!(breaker = %self.name, "circuit closed after successful probe");
            }
            BreakerState::Closed => {
                let stale = inner
                    .last_failure_time
                    .map(|t| t.elapsed() > self.monitoring_period)
                    .unwrap_or(false);
                if stale {
                    inner.failure_count = 0;
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    warn!(breaker = %self.name, failures = inner.failure_count, "circuit opened");
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.probe_in_flight = false;
                warn!(breaker = %self.name, "circuit reopened after failed probe");
            }
            BreakerState::Open => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.probe_in_flight = false;
    }
}

/// Process-wide name-indexed breaker store. Lazily constructs breakers;
/// `get_or_create` ignores threshold/timeout arguments on subsequent
/// calls for a name that already exists — intentional, per spec.md §9.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<Breaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        name: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Arc<Breaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Breaker::new(name.to_string(), failure_threshold, recovery_timeout))
            })
            .clone()
    }

    /// Default thresholds from spec.md §4.3: threshold=5, recovery=60s.
    pub fn get_default(&self, name: &str) -> Arc<Breaker> {
        self.get_or_create(name, 5, Duration::from_secs(60))
    }

    pub fn get_all_states(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock();
        let mut states: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.lock();
        for b in breakers.values() {
            b.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing() -> Result<(), BotError> {
        Err(BotError::network("X", "boom"))
    }
    async fn succeeding() -> Result<(), BotError> {
        Ok(())
    }

    #[tokio::test]
    async fn opens_after_threshold_failures_then_fast_fails() {
        let registry = BreakerRegistry::new();
        let breaker = registry.get_or_create("svc", 3, Duration::from_millis(50));

        for _ in 0..3 {
            let _ = breaker.call(|| failing()).await;
        }
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        assert!(snap.failure_count >= 3);

        let err = breaker.call(|| succeeding()).await.unwrap_err();
        assert!(matches!(err, BotError::CircuitBreaker { .. }));
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let registry = BreakerRegistry::new();
        let breaker = registry.get_or_create("svc2", 2, Duration::from_millis(20));

        let _ = breaker.call(|| failing()).await;
        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.snapshot().state, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        breaker.call(|| succeeding()).await.unwrap();
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let registry = BreakerRegistry::new();
        let breaker = registry.get_or_create("svc3", 1, Duration::from_millis(10));

        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
    }

    #[tokio::test]
    async fn half_open_admits_only_one_concurrent_probe() {
        let registry = BreakerRegistry::new();
        let breaker = registry.get_or_create("svc5", 1, Duration::from_millis(10));

        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(15)).await;

        // First caller transitions Open -> HalfOpen and is admitted; a
        // second caller racing in before the probe resolves must be
        // fast-failed, not also admitted.
        assert!(breaker.allow_attempt());
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
        assert!(!breaker.allow_attempt());

        breaker.record_success();
        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
        assert!(breaker.allow_attempt());
    }

    #[tokio::test]
    async fn registry_reuses_instance_and_ignores_later_config() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("shared", 5, Duration::from_secs(60));
        let b = registry.get_or_create("shared", 1, Duration::from_millis(1));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn reset_all_closes_every_breaker() {
        let registry = BreakerRegistry::new();
        let breaker = registry.get_or_create("svc4", 1, Duration::from_secs(60));
        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.snapshot().state, BreakerState::Open);

        registry.reset_all();
        let states = registry.get_all_states();
        assert!(states.iter().all(|s| s.state == BreakerState::Closed));
        assert!(states.iter().all(|s| s.failure_count == 0));
    }
}

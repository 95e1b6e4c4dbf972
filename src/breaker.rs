//! Per-Provider Circuit Breakers
//!
//! State machine: Closed -> Open on reaching the failure threshold,
//! Open -> HalfOpen once the recovery timeout elapses (exactly one trial
//! call admitted), HalfOpen -> Closed on trial success or back to Open on
//! trial failure. "Circuit open" is a returned value, never a panic.

use crate::config::BreakerSettings;
use crate::error::{GatewayError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls flow through
    Closed,

    /// Failure threshold crossed, calls refused until the recovery timeout
    Open,

    /// One trial call in flight; its outcome decides the next state
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// A named circuit breaker for one upstream
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Breaker name (e.g. "llm_groq")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Decide whether a call may proceed.
    ///
    /// Open with the recovery timeout elapsed transitions to HalfOpen and
    /// admits exactly the deciding caller; everyone else is refused until
    /// the trial resolves.
    pub fn try_acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);

                if elapsed >= self.recovery_timeout {
                    info!(breaker = %self.name, "recovery timeout elapsed, half-open trial");
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(GatewayError::CircuitOpen {
                        name: self.name.clone(),
                        retry_in: self.recovery_timeout - elapsed,
                    })
                }
            }
            // A trial call is already in flight
            CircuitState::HalfOpen => Err(GatewayError::CircuitOpen {
                name: self.name.clone(),
                retry_in: self.recovery_timeout,
            }),
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            info!(breaker = %self.name, "trial succeeded, circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "trial failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "failure threshold crossed, circuit opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run a fallible call through the breaker.
    ///
    /// The lock is never held across the await. Both `Err` outcomes from
    /// the call and upstream-shaped failures count toward the threshold,
    /// so a provider returning well-formed errors still opens its circuit.
    ///
    /// Cancellation-safe: if the returned future is dropped after the call
    /// was admitted but before it resolved, the abandoned attempt is
    /// recorded as a failure. An admitted half-open trial therefore cannot
    /// wedge the breaker; it re-opens and the recovery clock restarts.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.try_acquire()?;

        let mut guard = AbandonGuard {
            breaker: self,
            armed: true,
        };
        let outcome = f().await;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

/// Records a failure when an admitted call is dropped before resolving
struct AbandonGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                breaker = %self.breaker.name,
                "in-flight call dropped before resolving, recorded as failure"
            );
            self.breaker.record_failure();
        }
    }
}

/// Registry of lazily-created breakers keyed by name
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for `name`, honoring per-name overrides
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let (threshold, timeout) = self.settings.for_breaker(name);
        let breaker = Arc::new(CircuitBreaker::new(name, threshold, timeout));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Current state of every instantiated breaker
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing() -> Result<()> {
        Err(GatewayError::Upstream {
            provider: "test".into(),
            status: 500,
            message: "boom".into(),
        })
    }

    #[tokio::test]
    async fn test_closed_to_open_at_threshold() {
        let breaker = CircuitBreaker::new("llm_test", 5, Duration::from_secs(60));

        for _ in 0..4 {
            let _ = breaker.call(|| async { failing() }).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        let _ = breaker.call(|| async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_refuses_without_invoking() {
        let breaker = CircuitBreaker::new("llm_test", 1, Duration::from_secs(60));
        let _ = breaker.call(|| async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_on_success() {
        let breaker = CircuitBreaker::new("llm_test", 1, Duration::from_millis(10));
        let _ = breaker.call(|| async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = breaker.call(|| async { Ok("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_reopens_on_failure() {
        let breaker = CircuitBreaker::new("llm_test", 1, Duration::from_millis(10));
        let _ = breaker.call(|| async { failing() }).await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        let _ = breaker.call(|| async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Immediately after the failed trial the breaker refuses again
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_trial_reopens_instead_of_wedging() {
        let breaker = CircuitBreaker::new("llm_test", 1, Duration::from_millis(10));
        let _ = breaker.call(|| async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        // The admitted trial is cancelled from outside before it resolves
        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
        )
        .await;
        assert!(outcome.is_err());

        // The abandoned trial counted as a failure: back to Open with a
        // fresh recovery clock, not stuck in HalfOpen
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let breaker = CircuitBreaker::new("llm_test", 1, Duration::from_millis(0));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Timeout of zero: first acquire flips to HalfOpen and is admitted
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A concurrent acquire during the trial is refused
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn test_registry_independent_instances() {
        let registry = CircuitBreakerRegistry::new(BreakerSettings::default());

        let groq = registry.get("llm_groq");
        let openai = registry.get("llm_openai");

        for _ in 0..5 {
            groq.record_failure();
        }

        assert_eq!(groq.state(), CircuitState::Open);
        assert_eq!(openai.state(), CircuitState::Closed);

        // Same name returns the cached instance
        assert_eq!(registry.get("llm_groq").state(), CircuitState::Open);
    }

    #[test]
    fn test_registry_applies_overrides() {
        let mut settings = BreakerSettings::default();
        settings.overrides.insert(
            "llm_flaky".to_string(),
            crate::config::profile::BreakerOverride {
                failure_threshold: Some(2),
                recovery_timeout_secs: None,
            },
        );

        let registry = CircuitBreakerRegistry::new(settings);
        let breaker = registry.get("llm_flaky");

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}

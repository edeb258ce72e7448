use crate::error::PipelineError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds shared by every breaker a registry hands out.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_started_at: None,
        }
    }
}

/// Per-dependency breaker shared across concurrent runs. The open→half-open
/// transition happens inside `try_acquire` under the lock, so exactly one
/// caller wins the probe; the rest keep failing fast until it resolves.
/// A probe whose caller never reports back (the wrapping future was dropped,
/// e.g. the client disconnected) goes stale after another cooldown and the
/// next caller is admitted as a fresh probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    /// Returns whether a call may proceed right now.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit lock not poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let probe_stale = inner
                    .probe_started_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if probe_stale {
                    inner.probe_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(false);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.probe_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit lock not poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit lock not poisoned");
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failed_probe = inner.state == CircuitState::HalfOpen;
        if failed_probe || inner.consecutive_failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_started_at = None;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit lock not poisoned").state
    }
}

/// Lazily creates one breaker per dependency name and wraps calls with
/// fail-fast semantics while the breaker is open.
pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<&'static str, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, dependency: &'static str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry lock not poisoned");
        breakers
            .entry(dependency)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }

    pub async fn call<T, F, Fut>(
        &self,
        dependency: &'static str,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let breaker = self.breaker(dependency);
        if !breaker.try_acquire() {
            return Err(PipelineError::CircuitOpen { dependency });
        }

        match f().await {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                breaker.record_failure();
                Err(err)
            }
        }
    }
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

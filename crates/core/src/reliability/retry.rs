use crate::error::PipelineError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for one class of external calls. Thresholds come from
/// configuration, never from call sites.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Delay before the retry that follows `attempt` (1-based):
    /// `initial_delay * backoff_factor^(attempt-1)`, capped at `max_delay`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scale = self.backoff_factor.powi(exponent as i32);
        let seconds = self.initial_delay.as_secs_f64() * scale;
        Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()))
    }
}

/// Invokes `f` until it succeeds, fails non-transiently, or the attempt
/// budget is spent. Only [`PipelineError::Transient`] consumes attempts;
/// validation and circuit-open errors propagate immediately.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    dependency: &'static str,
    mut f: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if attempt >= max_attempts {
            return Err(err.into_exhausted(attempt));
        }

        let delay = config.delay_after_attempt(attempt);
        tracing::warn!(
            dependency,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure; retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

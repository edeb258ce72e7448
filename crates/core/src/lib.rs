pub mod domain;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod reliability;
pub mod secrets;
pub mod session;
pub mod storage;
pub mod time;
pub mod tts;

pub mod config {
    use crate::reliability::circuit::CircuitBreakerConfig;
    use crate::reliability::rate_limit::RateLimitConfig;
    use crate::reliability::retry::RetryConfig;
    use anyhow::Context;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub gcs_bucket: Option<String>,
        pub sentry_dsn: Option<String>,
        pub retry: RetryConfig,
        pub circuit: CircuitBreakerConfig,
        pub rate_limit: RateLimitConfig,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut retry = RetryConfig::default();
            if let Some(v) = env_parse::<u32>("RETRY_MAX_ATTEMPTS")? {
                retry.max_attempts = v;
            }
            if let Some(v) = env_parse::<u64>("RETRY_INITIAL_DELAY_MS")? {
                retry.initial_delay = Duration::from_millis(v);
            }
            if let Some(v) = env_parse::<f64>("RETRY_BACKOFF_FACTOR")? {
                retry.backoff_factor = v;
            }

            let mut circuit = CircuitBreakerConfig::default();
            if let Some(v) = env_parse::<u32>("CIRCUIT_FAILURE_THRESHOLD")? {
                circuit.failure_threshold = v;
            }
            if let Some(v) = env_parse::<u64>("CIRCUIT_OPEN_TIMEOUT_SECS")? {
                circuit.cooldown = Duration::from_secs(v);
            }

            let mut rate_limit = RateLimitConfig::default();
            if let Some(v) = env_parse::<u32>("RATE_LIMIT_MAX_REQUESTS")? {
                rate_limit.max_requests = v;
            }
            if let Some(v) = env_parse::<u64>("RATE_LIMIT_WINDOW_SECS")? {
                rate_limit.window = Duration::from_secs(v);
            }

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                gcs_bucket: std::env::var("GCS_BUCKET").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                retry,
                circuit,
                rate_limit,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_gcs_bucket(&self) -> anyhow::Result<&str> {
            self.gcs_bucket.as_deref().context("GCS_BUCKET is required")
        }
    }

    fn env_parse<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(name) {
            Ok(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("{name} is not a valid value: {raw}"))?;
                Ok(Some(parsed))
            }
            Err(_) => Ok(None),
        }
    }
}

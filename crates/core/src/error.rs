use thiserror::Error;

/// Dependency names used for circuit breaker keys and error context.
pub mod deps {
    pub const TEXT_GENERATION: &str = "text-generation";
    pub const STORAGE_WRITE: &str = "storage-write";
    pub const TTS: &str = "tts";
}

/// Failure taxonomy for one orchestration run.
///
/// `Transient` is the only variant the retry executor re-attempts; everything
/// else propagates on first occurrence.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("transient failure calling {dependency}: {source}")]
    Transient {
        dependency: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{dependency} still failing after {attempts} attempts: {source}")]
    Exhausted {
        dependency: &'static str,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("circuit open for {dependency}")]
    CircuitOpen { dependency: &'static str },

    #[error("all speech providers failed (last tried: {last_provider}): {source}")]
    SynthesisFailed {
        last_provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("persistence failure: {source}")]
    Persistence {
        #[source]
        source: anyhow::Error,
    },

    #[error("{dependency} rejected the request: {source}")]
    Permanent {
        dependency: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(dependency: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Transient {
            dependency,
            source: source.into(),
        }
    }

    pub fn permanent(dependency: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Permanent {
            dependency,
            source: source.into(),
        }
    }

    pub fn persistence(source: impl Into<anyhow::Error>) -> Self {
        Self::Persistence {
            source: source.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Converts a transient error into its exhausted form once the retry
    /// budget is spent. Other variants pass through unchanged.
    pub fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            Self::Transient { dependency, source } => Self::Exhausted {
                dependency,
                attempts,
                source,
            },
            other => other,
        }
    }

    /// Classifies a reqwest transport error: timeouts and connection resets
    /// are worth retrying, anything else is not.
    pub fn from_reqwest(dependency: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::transient(dependency, err)
        } else {
            Self::permanent(dependency, err)
        }
    }

    /// Classifies an HTTP status from an upstream dependency.
    pub fn from_status(dependency: &'static str, status: u16, body: String) -> Self {
        let source = anyhow::anyhow!("status={status} body={body}");
        if transient_status(status) {
            Self::transient(dependency, source)
        } else {
            Self::permanent(dependency, source)
        }
    }

    /// Classifies a database error: pool/connection problems are transient,
    /// everything else is a persistence failure.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::transient(deps::STORAGE_WRITE, err)
            }
            _ => Self::persistence(err),
        }
    }
}

/// Status codes treated as retryable across all upstream HTTP calls.
pub fn transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(transient_status(408));
        assert!(transient_status(429));
        assert!(transient_status(500));
        assert!(transient_status(503));
        assert!(!transient_status(400));
        assert!(!transient_status(401));
        assert!(!transient_status(404));
    }

    #[test]
    fn exhausted_keeps_dependency_and_attempts() {
        let err = PipelineError::transient(deps::TTS, anyhow::anyhow!("boom"));
        match err.into_exhausted(4) {
            PipelineError::Exhausted {
                dependency,
                attempts,
                ..
            } => {
                assert_eq!(dependency, deps::TTS);
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn validation_is_not_transient() {
        assert!(!PipelineError::validation("bad").is_transient());
        assert!(PipelineError::transient(deps::STORAGE_WRITE, anyhow::anyhow!("io")).is_transient());
    }

    #[test]
    fn status_classification_picks_variant() {
        assert!(PipelineError::from_status(deps::TEXT_GENERATION, 503, String::new()).is_transient());
        match PipelineError::from_status(deps::TEXT_GENERATION, 400, String::new()) {
            PipelineError::Permanent { dependency, .. } => {
                assert_eq!(dependency, deps::TEXT_GENERATION)
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}

pub mod elevenlabs;
pub mod openai;

use crate::error::PipelineError;
use std::sync::Arc;

/// One speech backend. Implementations authenticate on their own and must
/// return complete audio bytes or an error, never a truncated body.
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Synthesized audio plus the provider that produced it. Ephemeral: the
/// bytes are uploaded and discarded, only the storage pointer survives.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub provider: &'static str,
}

/// Ordered provider chain with first-success semantics: try each provider
/// in priority order, log and continue on failure, aggregate total failure
/// into a single error naming the last underlying cause.
pub struct SpeechSynthesizer {
    providers: Vec<Arc<dyn SpeechProvider>>,
}

impl SpeechSynthesizer {
    pub fn new(providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn synthesize(&self, text: &str) -> Result<AudioArtifact, PipelineError> {
        let script = text.trim();
        if script.is_empty() {
            return Err(PipelineError::validation(
                "audio script is empty or whitespace-only",
            ));
        }
        if self.providers.is_empty() {
            return Err(PipelineError::validation("no speech providers configured"));
        }

        let mut last: Option<(&'static str, PipelineError)> = None;
        for provider in &self.providers {
            match provider.synthesize(script).await {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::info!(
                        provider = provider.name(),
                        audio_bytes = bytes.len(),
                        "speech synthesis succeeded"
                    );
                    return Ok(AudioArtifact {
                        bytes,
                        provider: provider.name(),
                    });
                }
                Ok(_) => {
                    tracing::warn!(
                        provider = provider.name(),
                        "speech provider returned an empty body; trying next"
                    );
                    last = Some((
                        provider.name(),
                        PipelineError::permanent(
                            crate::error::deps::TTS,
                            anyhow::anyhow!("provider returned an empty audio body"),
                        ),
                    ));
                }
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %err,
                        "speech provider failed; trying next"
                    );
                    last = Some((provider.name(), err));
                }
            }
        }

        let (last_provider, err) = last.expect("at least one provider was attempted");
        Err(PipelineError::SynthesisFailed {
            last_provider,
            source: anyhow::Error::new(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::deps;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedProvider {
        name: &'static str,
        result: Result<Vec<u8>, &'static str>,
        calls: AtomicU32,
    }

    impl FixedProvider {
        fn ok(name: &'static str, bytes: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(bytes.to_vec()),
                calls: AtomicU32::new(0),
            })
        }

        fn failing(name: &'static str, msg: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(msg),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl SpeechProvider for FixedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(bytes) => Ok(bytes.clone()),
                Err(msg) => Err(PipelineError::transient(deps::TTS, anyhow::anyhow!(*msg))),
            }
        }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = FixedProvider::ok("openai", b"RIFFaudio");
        let fallback = FixedProvider::ok("elevenlabs", b"other");
        let synth = SpeechSynthesizer::new(vec![
            primary.clone() as Arc<dyn SpeechProvider>,
            fallback.clone(),
        ]);
        assert_eq!(synth.provider_names(), ["openai", "elevenlabs"]);

        let artifact = synth.synthesize("Good evening.").await.unwrap();
        assert_eq!(artifact.provider, "openai");
        assert_eq!(artifact.bytes, b"RIFFaudio");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let primary = FixedProvider::failing("openai", "quota exceeded");
        let fallback = FixedProvider::ok("elevenlabs", b"voice");
        let synth =
            SpeechSynthesizer::new(vec![primary as Arc<dyn SpeechProvider>, fallback]);

        let artifact = synth.synthesize("Good evening.").await.unwrap();
        assert_eq!(artifact.provider, "elevenlabs");
        assert!(!artifact.bytes.is_empty());
    }

    #[tokio::test]
    async fn aggregates_total_failure_with_last_cause() {
        let synth = SpeechSynthesizer::new(vec![
            FixedProvider::failing("openai", "down") as Arc<dyn SpeechProvider>,
            FixedProvider::failing("elevenlabs", "also down"),
        ]);

        let err = synth.synthesize("Good evening.").await.unwrap_err();
        match err {
            PipelineError::SynthesisFailed { last_provider, .. } => {
                assert_eq!(last_provider, "elevenlabs")
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_script_never_reaches_a_provider() {
        let primary = FixedProvider::ok("openai", b"bytes");
        let synth = SpeechSynthesizer::new(vec![primary.clone() as Arc<dyn SpeechProvider>]);

        for script in ["", "   ", "\n\t"] {
            let err = synth.synthesize(script).await.unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_provider_body_counts_as_failure() {
        let empty = FixedProvider::ok("openai", b"");
        let fallback = FixedProvider::ok("elevenlabs", b"voice");
        let synth = SpeechSynthesizer::new(vec![empty as Arc<dyn SpeechProvider>, fallback]);

        let artifact = synth.synthesize("Good evening.").await.unwrap();
        assert_eq!(artifact.provider, "elevenlabs");
    }
}

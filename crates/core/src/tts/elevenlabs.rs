use crate::error::{deps, PipelineError};
use crate::secrets::{self, SecretStore};
use crate::tts::SpeechProvider;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
// "Rachel", the public default voice.
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Fallback speech backend: the ElevenLabs text-to-speech endpoint.
#[derive(Debug, Clone)]
pub struct ElevenLabsSpeechProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsSpeechProvider {
    pub async fn from_secrets(store: &dyn SecretStore) -> anyhow::Result<Self> {
        let api_key = secrets::resolve(store, "ELEVENLABS_API_KEY").await?;
        let base_url = std::env::var("ELEVENLABS_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let voice_id = std::env::var("ELEVENLABS_VOICE_ID")
            .unwrap_or_else(|_| DEFAULT_VOICE_ID.to_string());
        let model_id = std::env::var("ELEVENLABS_MODEL_ID")
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        let timeout_secs = std::env::var("ELEVENLABS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build ElevenLabs http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            voice_id,
            model_id,
        })
    }

    fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "xi-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                PipelineError::permanent(deps::TTS, anyhow::anyhow!("invalid api key header: {e}"))
            })?,
        );
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[async_trait::async_trait]
impl SpeechProvider for ElevenLabsSpeechProvider {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        );
        let res = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(&TtsRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(deps::TTS, e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(deps::TTS, status.as_u16(), body));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| PipelineError::from_reqwest(deps::TTS, e))?;
        if bytes.is_empty() {
            return Err(PipelineError::permanent(
                deps::TTS,
                anyhow::anyhow!("ElevenLabs returned an empty body"),
            ));
        }
        Ok(bytes.to_vec())
    }
}

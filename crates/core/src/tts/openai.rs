use crate::error::{deps, PipelineError};
use crate::secrets::{self, SecretStore};
use crate::tts::SpeechProvider;
use anyhow::Context;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Primary speech backend: the OpenAI `/v1/audio/speech` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSpeechProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl OpenAiSpeechProvider {
    pub async fn from_secrets(store: &dyn SecretStore) -> anyhow::Result<Self> {
        let api_key = secrets::resolve(store, "OPENAI_API_KEY").await?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let voice =
            std::env::var("OPENAI_TTS_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        let timeout_secs = std::env::var("OPENAI_TTS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build OpenAI speech http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            voice,
        })
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

#[async_trait::async_trait]
impl SpeechProvider for OpenAiSpeechProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
        let url = format!(
            "{}/v1/audio/speech",
            self.base_url.trim_end_matches('/')
        );
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: text,
                response_format: "wav",
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
                anyhow::anyhow!("OpenAI speech returned an empty body"),
            ));
        }
        Ok(bytes.to_vec())
    }
}

use crate::config::Settings;
use crate::domain::report::{
    ConsolidatedReport, DailyReportRecord, EmailStatus, GeneratedReport, ReportRequest,
};
use crate::domain::tickers::extract_tickers;
use crate::error::{deps, PipelineError};
use crate::llm::ReportGenerator;
use crate::reliability::circuit::CircuitRegistry;
use crate::reliability::retry::{run_with_retry, RetryConfig};
use crate::storage::objects::ObjectStore;
use crate::storage::reports::ReportStore;
use crate::tts::SpeechSynthesizer;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

const AUDIO_CONTENT_TYPE: &str = "audio/wav";

/// Deterministic object path for a run's audio artifact.
pub fn audio_object_path(client_id: &str, trading_date: NaiveDate) -> String {
    format!("reports/{client_id}/{trading_date}/report.wav")
}

/// Top-level coordinator for one report run. Every external call goes
/// through the retry executor and a named circuit breaker; the audio path
/// is best-effort while the text path is fatal on failure.
pub struct ReportOrchestrator {
    generator: Arc<dyn ReportGenerator>,
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    synthesizer: SpeechSynthesizer,
    circuits: Arc<CircuitRegistry>,
    retry: RetryConfig,
}

impl ReportOrchestrator {
    pub fn new(
        generator: Arc<dyn ReportGenerator>,
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        synthesizer: SpeechSynthesizer,
        circuits: Arc<CircuitRegistry>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            generator,
            reports,
            objects,
            synthesizer,
            circuits,
            retry,
        }
    }

    /// Wires up the production collaborators: Anthropic text generation,
    /// Postgres report store, GCS object store, and the OpenAI→ElevenLabs
    /// speech chain. Speech providers whose credentials are missing are
    /// skipped with a warning; audio then degrades at run time instead of
    /// blocking startup.
    pub async fn from_settings(settings: &Settings, pool: sqlx::PgPool) -> anyhow::Result<Self> {
        use crate::secrets::EnvSecretStore;
        use crate::storage::objects::GcsObjectStore;
        use crate::storage::reports::PgReportStore;
        use crate::tts::elevenlabs::ElevenLabsSpeechProvider;
        use crate::tts::openai::OpenAiSpeechProvider;
        use crate::tts::SpeechProvider;

        let secrets = EnvSecretStore;
        let generator = Arc::new(crate::llm::anthropic::AnthropicClient::from_settings(
            settings,
        )?);
        let reports = Arc::new(PgReportStore::new(pool));
        let bucket = settings.require_gcs_bucket()?.to_string();
        let objects = Arc::new(GcsObjectStore::from_secrets(bucket, &secrets).await?);

        let mut providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();
        match OpenAiSpeechProvider::from_secrets(&secrets).await {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => tracing::warn!(error = %e, "OpenAI speech provider unavailable"),
        }
        match ElevenLabsSpeechProvider::from_secrets(&secrets).await {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => tracing::warn!(error = %e, "ElevenLabs speech provider unavailable"),
        }
        let synthesizer = SpeechSynthesizer::new(providers);
        tracing::info!(
            providers = ?synthesizer.provider_names(),
            "speech provider chain configured"
        );

        Ok(Self::new(
            generator,
            reports,
            objects,
            synthesizer,
            Arc::new(CircuitRegistry::new(settings.circuit)),
            settings.retry.clone(),
        ))
    }

    pub async fn generate_and_store_daily_report(
        &self,
        request: ReportRequest,
    ) -> Result<ConsolidatedReport, PipelineError> {
        request.validate()?;

        let report = self.generate_text(&request).await?;
        let tickers = extract_tickers(&request.market_data);

        let record = DailyReportRecord {
            client_id: request.client_id.clone(),
            trading_date: request.trading_date,
            tickers,
            summary_text: report.summary_text.clone(),
            key_insights: report.key_insights.clone(),
            market_context: report.market_context.clone(),
            audio_gcs_path: None,
            tts_provider: None,
            email_status: EmailStatus::Pending,
            raw_payload: report.raw_payload.clone(),
            created_at: Utc::now(),
        };
        self.persist_text(&record).await?;

        // Text is the primary deliverable; everything below is best-effort.
        let mut audio_gcs_path = None;
        let mut tts_provider = None;
        if report.audio_script.trim().is_empty() {
            tracing::info!(
                client_id = %request.client_id,
                trading_date = %request.trading_date,
                "no audio script in generated report; skipping synthesis"
            );
        } else {
            match self.attach_audio(&request, &report.audio_script).await {
                Ok((path, provider)) => {
                    audio_gcs_path = Some(path);
                    tts_provider = Some(provider);
                }
                Err(err) => {
                    tracing::error!(
                        client_id = %request.client_id,
                        trading_date = %request.trading_date,
                        error = %err,
                        "audio pipeline failed; briefing stored without audio"
                    );
                }
            }
        }

        Ok(ConsolidatedReport {
            client_id: request.client_id,
            trading_date: request.trading_date,
            summary_text: report.summary_text,
            key_insights: report.key_insights,
            market_context: report.market_context,
            audio_gcs_path,
            tts_provider,
            raw_payload: report.raw_payload,
        })
    }

    pub async fn get_report(
        &self,
        client_id: &str,
        trading_date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, PipelineError> {
        self.reports.get_report(client_id, trading_date).await
    }

    pub async fn latest_report(
        &self,
        client_id: &str,
    ) -> Result<Option<DailyReportRecord>, PipelineError> {
        self.reports.latest_report(client_id).await
    }

    async fn generate_text(
        &self,
        request: &ReportRequest,
    ) -> Result<GeneratedReport, PipelineError> {
        run_with_retry(&self.retry, deps::TEXT_GENERATION, || {
            self.circuits.call(deps::TEXT_GENERATION, || async {
                self.generator.generate_report(request).await
            })
        })
        .await
    }

    async fn persist_text(&self, record: &DailyReportRecord) -> Result<(), PipelineError> {
        run_with_retry(&self.retry, deps::STORAGE_WRITE, || {
            self.circuits.call(deps::STORAGE_WRITE, || async {
                self.reports.upsert_report(record).await
            })
        })
        .await
    }

    /// Synthesize, upload, and record the audio pointer. Any error here is
    /// caught by the caller and only costs the run its audio.
    async fn attach_audio(
        &self,
        request: &ReportRequest,
        audio_script: &str,
    ) -> Result<(String, String), PipelineError> {
        let artifact = run_with_retry(&self.retry, deps::TTS, || {
            self.circuits.call(deps::TTS, || async {
                self.synthesizer.synthesize(audio_script).await
            })
        })
        .await?;

        let path = audio_object_path(&request.client_id, request.trading_date);
        let uri = run_with_retry(&self.retry, deps::STORAGE_WRITE, || {
            self.circuits.call(deps::STORAGE_WRITE, || async {
                self.objects
                    .put_object(&path, &artifact.bytes, AUDIO_CONTENT_TYPE)
                    .await
            })
        })
        .await?;

        run_with_retry(&self.retry, deps::STORAGE_WRITE, || {
            self.circuits.call(deps::STORAGE_WRITE, || async {
                self.reports
                    .set_audio_pointer(
                        &request.client_id,
                        request.trading_date,
                        &uri,
                        artifact.provider,
                    )
                    .await
            })
        })
        .await?;

        Ok((uri, artifact.provider.to_string()))
    }
}

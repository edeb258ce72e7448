use crate::domain::report::{DailyReportRecord, EmailStatus};
use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Document-store seam for daily report records, keyed by
/// `(client_id, trading_date)`.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Create-or-overwrite by key.
    async fn upsert_report(&self, record: &DailyReportRecord) -> Result<(), PipelineError>;

    /// Records the audio location and provider after a successful upload.
    async fn set_audio_pointer(
        &self,
        client_id: &str,
        trading_date: NaiveDate,
        audio_gcs_path: &str,
        tts_provider: &str,
    ) -> Result<(), PipelineError>;

    async fn get_report(
        &self,
        client_id: &str,
        trading_date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, PipelineError>;

    async fn latest_report(
        &self,
        client_id: &str,
    ) -> Result<Option<DailyReportRecord>, PipelineError>;
}

pub struct PgReportStore {
    pool: sqlx::PgPool,
}

impl PgReportStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type ReportRow = (
    String,                  // client_id
    NaiveDate,               // trading_date
    Vec<String>,             // tickers
    String,                  // summary_text
    Vec<String>,             // key_insights
    String,                  // market_context
    Option<String>,          // audio_gcs_path
    Option<String>,          // tts_provider
    String,                  // email_status
    Option<serde_json::Value>, // raw_payload
    DateTime<Utc>,           // created_at
);

const SELECT_COLUMNS: &str = "client_id, trading_date, tickers, summary_text, key_insights, \
     market_context, audio_gcs_path, tts_provider, email_status, raw_payload, created_at";

fn row_into_record(row: ReportRow) -> Result<DailyReportRecord, PipelineError> {
    let (
        client_id,
        trading_date,
        tickers,
        summary_text,
        key_insights,
        market_context,
        audio_gcs_path,
        tts_provider,
        email_status,
        raw_payload,
        created_at,
    ) = row;

    let email_status = EmailStatus::parse(&email_status).map_err(PipelineError::persistence)?;

    Ok(DailyReportRecord {
        client_id,
        trading_date,
        tickers: tickers.into_iter().collect::<BTreeSet<String>>(),
        summary_text,
        key_insights,
        market_context,
        audio_gcs_path,
        tts_provider,
        email_status,
        raw_payload: raw_payload.unwrap_or(serde_json::Value::Null),
        created_at,
    })
}

#[async_trait::async_trait]
impl ReportStore for PgReportStore {
    async fn upsert_report(&self, record: &DailyReportRecord) -> Result<(), PipelineError> {
        let tickers: Vec<String> = record.tickers.iter().cloned().collect();

        sqlx::query(
            "INSERT INTO daily_reports (client_id, trading_date, tickers, summary_text, \
             key_insights, market_context, audio_gcs_path, tts_provider, email_status, \
             raw_payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (client_id, trading_date) DO UPDATE SET \
             tickers = EXCLUDED.tickers, \
             summary_text = EXCLUDED.summary_text, \
             key_insights = EXCLUDED.key_insights, \
             market_context = EXCLUDED.market_context, \
             audio_gcs_path = EXCLUDED.audio_gcs_path, \
             tts_provider = EXCLUDED.tts_provider, \
             email_status = EXCLUDED.email_status, \
             raw_payload = EXCLUDED.raw_payload, \
             created_at = EXCLUDED.created_at",
        )
        .bind(&record.client_id)
        .bind(record.trading_date)
        .bind(&tickers)
        .bind(&record.summary_text)
        .bind(&record.key_insights)
        .bind(&record.market_context)
        .bind(&record.audio_gcs_path)
        .bind(&record.tts_provider)
        .bind(record.email_status.as_str())
        .bind(&record.raw_payload)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::from_sqlx)?;

        Ok(())
    }

    async fn set_audio_pointer(
        &self,
        client_id: &str,
        trading_date: NaiveDate,
        audio_gcs_path: &str,
        tts_provider: &str,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE daily_reports SET audio_gcs_path = $3, tts_provider = $4 \
             WHERE client_id = $1 AND trading_date = $2",
        )
        .bind(client_id)
        .bind(trading_date)
        .bind(audio_gcs_path)
        .bind(tts_provider)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::from_sqlx)?;

        Ok(())
    }

    async fn get_report(
        &self,
        client_id: &str,
        trading_date: NaiveDate,
    ) -> Result<Option<DailyReportRecord>, PipelineError> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM daily_reports \
             WHERE client_id = $1 AND trading_date = $2"
        ))
        .bind(client_id)
        .bind(trading_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::from_sqlx)?;

        row.map(row_into_record).transpose()
    }

    async fn latest_report(
        &self,
        client_id: &str,
    ) -> Result<Option<DailyReportRecord>, PipelineError> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM daily_reports \
             WHERE client_id = $1 \
             ORDER BY trading_date DESC \
             LIMIT 1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::from_sqlx)?;

        row.map(row_into_record).transpose()
    }
}

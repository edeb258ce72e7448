use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable input to one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub trading_date: NaiveDate,
    pub client_id: String,
    pub market_data: serde_json::Value,
    #[serde(default)]
    pub news_items: serde_json::Value,
    #[serde(default)]
    pub macro_context: serde_json::Value,
}

impl ReportRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.client_id.trim().is_empty() {
            return Err(PipelineError::validation("client_id must be non-empty"));
        }
        if self.market_data.is_null() {
            return Err(PipelineError::validation("market_data must be provided"));
        }
        Ok(())
    }
}

/// Output of the text-generation step. `raw_payload` is the full model
/// response, retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub summary_text: String,
    pub key_insights: Vec<String>,
    pub market_context: String,
    pub audio_script: String,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unknown email_status: {other}"),
        }
    }
}

/// Persisted entity, one per `(client_id, trading_date)`. Re-running a
/// generation for the same key overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReportRecord {
    pub client_id: String,
    pub trading_date: NaiveDate,
    pub tickers: BTreeSet<String>,
    pub summary_text: String,
    pub key_insights: Vec<String>,
    pub market_context: String,
    pub audio_gcs_path: Option<String>,
    pub tts_provider: Option<String>,
    pub email_status: EmailStatus,
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The orchestrator's return view of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub client_id: String,
    pub trading_date: NaiveDate,
    pub summary_text: String,
    pub key_insights: Vec<String>,
    pub market_context: String,
    pub audio_gcs_path: Option<String>,
    pub tts_provider: Option<String>,
    pub raw_payload: serde_json::Value,
}

impl From<DailyReportRecord> for ConsolidatedReport {
    fn from(record: DailyReportRecord) -> Self {
        Self {
            client_id: record.client_id,
            trading_date: record.trading_date,
            summary_text: record.summary_text,
            key_insights: record.key_insights,
            market_context: record.market_context,
            audio_gcs_path: record.audio_gcs_path,
            tts_provider: record.tts_provider,
            raw_payload: record.raw_payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ReportRequest {
        ReportRequest {
            trading_date: NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
            client_id: "client-1".to_string(),
            market_data: json!({"tickers": ["SMCI"]}),
            news_items: json!([]),
            macro_context: json!({}),
        }
    }

    #[test]
    fn accepts_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_blank_client_id() {
        let mut req = request();
        req.client_id = "  ".to_string();
        assert!(matches!(
            req.validate(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn rejects_null_market_data() {
        let mut req = request();
        req.market_data = serde_json::Value::Null;
        assert!(req.validate().is_err());
    }

    #[test]
    fn email_status_round_trips_as_str() {
        for status in [EmailStatus::Pending, EmailStatus::Sent, EmailStatus::Failed] {
            assert_eq!(EmailStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(EmailStatus::parse("bounced").is_err());
    }
}

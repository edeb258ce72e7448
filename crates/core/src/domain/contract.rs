use crate::domain::report::GeneratedReport;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

const MAX_KEY_INSIGHTS: usize = 10;

/// Raw shape the model is asked to emit. Field-level cleanup and the
/// conversion into [`GeneratedReport`] happen in `validate_and_into_report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGeneratedReport {
    pub summary_text: String,
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub market_context: String,
    #[serde(default)]
    pub audio_script: String,
}

impl LlmGeneratedReport {
    pub fn validate_and_into_report(
        self,
        raw_payload: serde_json::Value,
    ) -> anyhow::Result<GeneratedReport> {
        let summary_text = self.summary_text.trim().to_string();
        ensure!(!summary_text.is_empty(), "summary_text must be non-empty");

        ensure!(
            !self.key_insights.is_empty(),
            "key_insights must contain at least one entry"
        );
        ensure!(
            self.key_insights.len() <= MAX_KEY_INSIGHTS,
            "key_insights must contain at most {MAX_KEY_INSIGHTS} entries (got {})",
            self.key_insights.len()
        );

        let mut key_insights = Vec::with_capacity(self.key_insights.len());
        for insight in self.key_insights {
            let insight = insight.trim().to_string();
            ensure!(!insight.is_empty(), "key_insights entries must be non-empty");
            key_insights.push(insight);
        }

        Ok(GeneratedReport {
            summary_text,
            key_insights,
            market_context: self.market_context.trim().to_string(),
            audio_script: self.audio_script.trim().to_string(),
            raw_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> LlmGeneratedReport {
        LlmGeneratedReport {
            summary_text: " Markets were mixed. ".to_string(),
            key_insights: vec!["  Chip names led. ".to_string(), "Rates steady.".to_string()],
            market_context: "Quiet macro day.".to_string(),
            audio_script: " Good evening. ".to_string(),
        }
    }

    #[test]
    fn trims_fields_and_keeps_order() {
        let report = contract()
            .validate_and_into_report(json!({"id": "msg_1"}))
            .unwrap();
        assert_eq!(report.summary_text, "Markets were mixed.");
        assert_eq!(report.key_insights, vec!["Chip names led.", "Rates steady."]);
        assert_eq!(report.audio_script, "Good evening.");
        assert_eq!(report.raw_payload, json!({"id": "msg_1"}));
    }

    #[test]
    fn rejects_empty_summary() {
        let mut c = contract();
        c.summary_text = "   ".to_string();
        assert!(c.validate_and_into_report(json!(null)).is_err());
    }

    #[test]
    fn rejects_missing_insights() {
        let mut c = contract();
        c.key_insights.clear();
        assert!(c.validate_and_into_report(json!(null)).is_err());
    }

    #[test]
    fn rejects_blank_insight_entry() {
        let mut c = contract();
        c.key_insights.push(" ".to_string());
        assert!(c.validate_and_into_report(json!(null)).is_err());
    }

    #[test]
    fn rejects_too_many_insights() {
        let mut c = contract();
        c.key_insights = (0..11).map(|i| format!("insight {i}")).collect();
        assert!(c.validate_and_into_report(json!(null)).is_err());
    }

    #[test]
    fn allows_empty_audio_script() {
        let mut c = contract();
        c.audio_script = String::new();
        let report = c.validate_and_into_report(json!(null)).unwrap();
        assert!(report.audio_script.is_empty());
    }
}

use crate::domain::contract::LlmGeneratedReport;
use anyhow::Context;

/// Strips Markdown fences or surrounding prose from model output, returning
/// the JSON body when one can be located.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_report(text: &str) -> anyhow::Result<LlmGeneratedReport> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<LlmGeneratedReport>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for the report schema: {json_str}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_report_json() -> String {
        json!({
            "summary_text": "Markets closed mixed.",
            "key_insights": ["AI names led.", "Breadth was weak."],
            "market_context": "Light volume ahead of CPI.",
            "audio_script": "Good evening. Markets closed mixed today.",
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here is the report: {\"a\":1} hope that helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extract_json_rejects_braceless_text() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn parse_report_accepts_valid_json() {
        let report = parse_report(&valid_report_json()).unwrap();
        assert_eq!(report.summary_text, "Markets closed mixed.");
        assert_eq!(report.key_insights.len(), 2);
        assert!(!report.audio_script.is_empty());
    }

    #[test]
    fn parse_report_accepts_missing_optional_fields() {
        let json = json!({
            "summary_text": "Quiet day.",
            "key_insights": ["Nothing moved."],
        })
        .to_string();
        let report = parse_report(&json).unwrap();
        assert!(report.market_context.is_empty());
        assert!(report.audio_script.is_empty());
    }

    #[test]
    fn parse_report_rejects_wrong_shape() {
        assert!(parse_report("{\"summary\": 1}").is_err());
        assert!(parse_report("not json at all").is_err());
    }
}

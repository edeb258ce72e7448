use crate::config::Settings;
use crate::domain::contract::LlmGeneratedReport;
use crate::domain::report::{GeneratedReport, ReportRequest};
use crate::error::{deps, PipelineError};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{Provider, ReportGenerator};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 90;

const TOOL_NAME_EMIT_REPORT: &str = "emit_report";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> Result<(serde_json::Value, CreateMessageResponse), PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                PipelineError::permanent(
                    deps::TEXT_GENERATION,
                    anyhow::anyhow!("invalid api key header: {e}"),
                )
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(deps::TEXT_GENERATION, e))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest(deps::TEXT_GENERATION, e))?;

        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            let diag = LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            };
            return Err(if crate::error::transient_status(status.as_u16()) {
                PipelineError::transient(deps::TEXT_GENERATION, diag)
            } else {
                PipelineError::permanent(deps::TEXT_GENERATION, diag)
            });
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
            PipelineError::permanent(
                deps::TEXT_GENERATION,
                anyhow::anyhow!("failed to parse Anthropic response JSON: {e}: {text}"),
            )
        })?;
        let parsed =
            serde_json::from_value::<CreateMessageResponse>(raw_json.clone()).map_err(|e| {
                PipelineError::permanent(
                    deps::TEXT_GENERATION,
                    anyhow::anyhow!("failed to decode Anthropic response: {e}"),
                )
            })?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        // Minimal JSON schema for the exact report contract.
        // Keep it strict and explicit to maximize compliance.
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary_text", "key_insights", "market_context", "audio_script"],
            "properties": {
                "summary_text": {"type": "string"},
                "key_insights": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 10,
                    "items": {"type": "string"}
                },
                "market_context": {"type": "string"},
                "audio_script": {"type": "string"}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_REPORT,
            description: "Emit the final daily briefing as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_REPORT,
        }
    }

    fn system_prompt() -> String {
        [
            "You are a daily trading briefing writer for a single client.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "No trailing commas. No comments. Use double quotes for all JSON strings.",
            "Output schema:",
            "{",
            "  \"summary_text\": \"2-4 paragraph written summary of the trading day\",",
            "  \"key_insights\": [\"short insight\", \"...\"],",
            "  \"market_context\": \"one paragraph of macro context\",",
            "  \"audio_script\": \"conversational script for a spoken briefing\"",
            "}",
            "Rules:",
            "- key_insights must have between 1 and 10 short entries",
            "- audio_script must read naturally when spoken aloud; no markdown, no lists",
            "- Only reference tickers and news present in the provided input",
        ]
        .join("\n")
    }

    fn user_prompt(request: &ReportRequest) -> String {
        format!(
            "Task: Write the daily trading briefing for client={} trading_date={}.\n\n\
Market data JSON:\n{}\n\nNews items JSON:\n{}\n\nMacro context JSON:\n{}",
            request.client_id,
            request.trading_date,
            request.market_data,
            request.news_items,
            request.macro_context
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        let schema = [
            "{",
            "  \"summary_text\": \"...\",",
            "  \"key_insights\": [\"...\"],",
            "  \"market_context\": \"...\",",
            "  \"audio_script\": \"...\"",
            "}",
        ]
        .join("\n");

        format!(
            "Your previous message was NOT valid JSON.\n\n\
TASK: Output ONLY a single JSON object that exactly matches the schema and rules.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Do NOT include trailing commas or comments.\n\
- Use double quotes for all JSON strings.\n\
- key_insights MUST have between 1 and 10 entries.\n\n\
SCHEMA:\n{schema}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                // Prefer tool output parsing when tools are enabled; callers
                // use `response_tool_report`.
                ContentBlock::ToolUse { .. } => continue,
                ContentBlock::Thinking { .. }
                | ContentBlock::RedactedThinking { .. }
                | ContentBlock::Unknown => {}
            }
        }
        out
    }

    fn response_tool_report(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmGeneratedReport>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_REPORT {
                    let parsed = serde_json::from_value::<LlmGeneratedReport>(input.clone())
                        .context("failed to decode tool_use.input into LlmGeneratedReport")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> Result<(LlmGeneratedReport, serde_json::Value), PipelineError> {
        match json::parse_report(&initial_text) {
            Ok(report) => return Ok((report, initial_raw_json)),
            Err(first_err) => {
                let mut last_err = first_err;
                let mut last_text = initial_text;
                let mut last_raw_json = initial_raw_json;

                // Repair attempts: 2
                for attempt in 1..=2u32 {
                    let repair_req = CreateMessageRequest {
                        model: self.model.clone(),
                        max_tokens: self.max_tokens,
                        system: Some(Self::system_prompt()),
                        messages: vec![Message {
                            role: "user",
                            content: Self::repair_prompt(&last_text),
                        }],
                        tools: Some(Self::tools()),
                        tool_choice: Some(Self::tool_choice()),
                    };

                    let (repair_raw_json, repair_res) = self.create_message(repair_req).await?;
                    if let Some(report) = Self::response_tool_report(&repair_res)
                        .map_err(|e| PipelineError::permanent(deps::TEXT_GENERATION, e))?
                    {
                        return Ok((report, repair_raw_json));
                    }

                    let repair_text = Self::response_text(&repair_res);
                    match json::parse_report(&repair_text) {
                        Ok(report) => return Ok((report, repair_raw_json)),
                        Err(err) => {
                            last_err = err;
                            last_text = repair_text;
                            last_raw_json = repair_raw_json;
                            tracing::warn!(
                                attempt,
                                error = %last_err,
                                "LLM output still invalid after repair attempt"
                            );
                        }
                    }
                }

                Err(PipelineError::permanent(
                    deps::TEXT_GENERATION,
                    LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        stage: "parse_after_repair",
                        detail: format!("final_error={last_err}"),
                        raw_output: Some(last_text),
                        raw_response_json: Some(last_raw_json),
                    },
                ))
            }
        }
    }

    pub async fn generate_report_with_raw(
        &self,
        request: &ReportRequest,
    ) -> Result<(LlmGeneratedReport, serde_json::Value), PipelineError> {
        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(request),
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        };

        let (mut raw_json, mut res) = self.create_message(make_req(self.max_tokens)).await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                client_id = %request.client_id,
                trading_date = %request.trading_date,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self.create_message(make_req(bumped)).await?;
            raw_json = rj;
            res = r;
        }

        // Tool output path.
        if let Some(report) = Self::response_tool_report(&res)
            .map_err(|e| PipelineError::permanent(deps::TEXT_GENERATION, e))?
        {
            return Ok((report, raw_json));
        }

        // Fallback to text (should be rare).
        let text = Self::response_text(&res);
        self.try_parse_with_repairs(text, raw_json).await
    }
}

#[async_trait::async_trait]
impl ReportGenerator for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<GeneratedReport, PipelineError> {
        let (contract, raw_json) = self.generate_report_with_raw(request).await?;
        contract
            .validate_and_into_report(raw_json)
            .map_err(|e| PipelineError::permanent(deps::TEXT_GENERATION, e))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        #[serde(default)]
        data: String,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_use_report_input() {
        let tool_input = json!({
            "summary_text": "Stocks rallied into the close.",
            "key_insights": ["Semis outperformed.", "Yields eased."],
            "market_context": "Soft CPI print.",
            "audio_script": "Good evening. Stocks rallied into the close today.",
        });

        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: TOOL_NAME_EMIT_REPORT.to_string(),
                input: tool_input,
            }],
            stop_reason: None,
        };

        let parsed = AnthropicClient::response_tool_report(&res).unwrap().unwrap();
        let report = parsed.validate_and_into_report(json!({"id": "msg_1"})).unwrap();
        assert_eq!(report.summary_text, "Stocks rallied into the close.");
        assert_eq!(report.key_insights.len(), 2);
        assert_eq!(report.raw_payload, json!({"id": "msg_1"}));
    }

    #[test]
    fn ignores_unrelated_tool_blocks() {
        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "something_else".to_string(),
                input: json!({}),
            }],
            stop_reason: None,
        };
        assert!(AnthropicClient::response_tool_report(&res).unwrap().is_none());
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let res = CreateMessageResponse {
            content: vec![
                ContentBlock::Text {
                    text: "line one".to_string(),
                },
                ContentBlock::Unknown,
                ContentBlock::Text {
                    text: "line two".to_string(),
                },
            ],
            stop_reason: None,
        };
        assert_eq!(AnthropicClient::response_text(&res), "line one\nline two");
    }
}

pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::report::{GeneratedReport, ReportRequest};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
        }
    }
}

/// Text-generation collaborator: turns one request into a structured
/// briefing, or fails with a classified error.
#[async_trait::async_trait]
pub trait ReportGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<GeneratedReport, PipelineError>;
}

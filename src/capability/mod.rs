//! External capability seams
//!
//! Search: query → ranked evidence snippets.
//! Summarizer: structured prompt → structured JSON, or free prose.
//!
//! Both may fail transiently; callers wrap them in [`retry::call_with_retry`].

use crate::config::Settings;
use crate::models::EvidenceItem;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub mod gemini;
pub mod mock;
pub mod retry;
pub mod tavily;

pub use gemini::GeminiSummarizer;
pub use mock::{ScriptedSummarizer, StaticSearch};
pub use retry::{call_with_retry, RetryPolicy};
pub use tavily::TavilySearch;

#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// Results in relevance order, at most `max_results`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceItem>>;
}

/// What a summarizer call is for. Lets fakes answer each call site differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    CategoryEssence { category: String },
    AnalystReport,
    Validation,
    ExecutiveSummary,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::CategoryEssence { category } => write!(f, "essence:{}", category),
            Task::AnalystReport => write!(f, "analyst_report"),
            Task::Validation => write!(f, "validation"),
            Task::ExecutiveSummary => write!(f, "executive_summary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub task: Task,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Structured extraction; the response must be a JSON object.
    async fn extract(&self, request: &ExtractionRequest) -> Result<serde_json::Value>;

    /// Free-text drafting.
    async fn draft(&self, request: &ExtractionRequest) -> Result<String>;
}

/// Live clients when both credentials are configured, scripted offline ones otherwise.
pub fn from_settings(settings: &Settings) -> Result<(Arc<dyn SearchCapability>, Arc<dyn Summarizer>)> {
    match (&settings.tavily_api_key, &settings.gemini_api_key) {
        (Some(tavily_key), Some(gemini_key)) => Ok((
            Arc::new(TavilySearch::new(tavily_key.clone(), settings.capability_timeout)?),
            Arc::new(GeminiSummarizer::new(
                gemini_key.clone(),
                &settings.gemini_model,
                settings.capability_timeout,
            )?),
        )),
        _ => {
            warn!("TAVILY_API_KEY or GEMINI_API_KEY not set; using scripted offline capabilities");
            Ok((
                Arc::new(StaticSearch::new(settings.max_results_per_subtopic)),
                Arc::new(ScriptedSummarizer::new()),
            ))
        }
    }
}

/// Pull the JSON object out of model output that may be wrapped in a
/// markdown fence or surrounded by prose.
pub fn parse_json_payload(raw: &str) -> Result<serde_json::Value> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned[start..=end]) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }

    Err(crate::error::PipelineError::MalformedResponse(format!(
        "expected a JSON object, got: {}",
        crate::models::truncate_chars(raw, 200)
    )))
}

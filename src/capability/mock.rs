//! Deterministic capability fakes
//!
//! Used by tests and by the `research` binary when no credentials are set.
//! Neither fake touches the network; every answer is a pure function of
//! the request and the configuration.

use crate::capability::tavily::{assess_confidence, extract_domain};
use crate::capability::{ExtractionRequest, SearchCapability, Summarizer, Task};
use crate::error::PipelineError;
use crate::models::EvidenceItem;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const SOURCES: &[&str] = &[
    "www.reuters.com",
    "www.moneycontrol.com",
    "www.bseindia.com",
    "www.reddit.com",
    "www.livemint.com",
];

//
// ================= Search =================
//

/// Returns `items_per_query` synthetic hits for every query, in a fixed order.
pub struct StaticSearch {
    items_per_query: usize,
    overrides: Vec<(String, usize)>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(items_per_query: usize) -> Self {
        Self {
            items_per_query,
            overrides: Vec::new(),
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queries containing `needle` return `count` hits instead.
    pub fn with_results_for(mut self, needle: impl Into<String>, count: usize) -> Self {
        self.overrides.push((needle.into(), count));
        self
    }

    /// Queries containing `needle` fail permanently.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failing.push(needle.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count_for(&self, query: &str) -> usize {
        self.overrides
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, count)| *count)
            .unwrap_or(self.items_per_query)
    }
}

/// A single synthetic hit; the rank is embedded in url and title.
pub fn synthetic_evidence(query: &str, rank: usize) -> EvidenceItem {
    let host = SOURCES[rank % SOURCES.len()];
    let slug: String = query
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let url = format!("https://{}/{}/{}", host, slug, rank);
    let source_domain = extract_domain(&url);
    let body = format!(
        "Result {} for '{}'. Management commentary, segment figures and analyst notes \
         relevant to the query, repeated to resemble a full article body. ",
        rank, query
    );

    EvidenceItem {
        confidence: assess_confidence(&url, &source_domain),
        title: format!("{} (result {})", query, rank),
        excerpt: body.clone(),
        raw_content: Some(body.repeat(8)),
        url,
        source_domain,
        retrieved_at: Utc::now(),
    }
}

#[async_trait]
impl SearchCapability for StaticSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.iter().any(|needle| query.contains(needle.as_str())) {
            return Err(PipelineError::SearchError(format!(
                "search rejected query: {}",
                query
            )));
        }

        Ok((0..self.count_for(query).min(max_results))
            .map(|rank| synthetic_evidence(query, rank))
            .collect())
    }
}

//
// ================= Summarizer =================
//

/// Answers each task from configuration and records every request it sees.
pub struct ScriptedSummarizer {
    failing_categories: Vec<String>,
    essence_list_len: usize,
    validation: Value,
    report: String,
    executive_summary: Option<String>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self {
            failing_categories: Vec::new(),
            essence_list_len: 3,
            validation: favorable_assessment(),
            report: "## Business Overview\nThe company operates a stable, diversified business.\n\n\
                     ## Financial Health\nCash generation has been consistent over five years.\n\n\
                     ## Risks\nCyclical demand and input-cost inflation."
                .to_string(),
            executive_summary: Some(
                "Stable franchise with consistent cash generation; valuation is the main debate."
                    .to_string(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Essence extraction for this category fails.
    pub fn failing_category(mut self, category: impl Into<String>) -> Self {
        self.failing_categories.push(category.into());
        self
    }

    /// Length of every list in generated essences; lets tests exceed the caps.
    pub fn with_essence_list_len(mut self, len: usize) -> Self {
        self.essence_list_len = len;
        self
    }

    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = report.into();
        self
    }

    /// `None` makes executive-summary drafting fail.
    pub fn with_executive_summary(mut self, summary: Option<String>) -> Self {
        self.executive_summary = summary;
        self
    }

    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &ExtractionRequest) {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
    }

    fn essence_for(&self, category: &str) -> Value {
        let n = self.essence_list_len;
        let list = |kind: &str| -> Vec<String> {
            (1..=n).map(|i| format!("{} {} {}", category, kind, i)).collect()
        };
        let numbers: Vec<Value> = (1..=n)
            .map(|i| {
                json!({
                    "metric": format!("{} metric {}", category, i),
                    "value": format!("{}%", 10 + i),
                    "source": "https://www.reuters.com/"
                })
            })
            .collect();

        json!({
            "category": category,
            "core_facts": list("fact"),
            "key_numbers": numbers,
            "risks_and_red_flags": list("risk"),
            "strengths": list("strength"),
            "key_quotes": list("quote"),
            "source_quality": "medium",
            "summary": format!("Condensed view of {}.", category)
        })
    }
}

impl Default for ScriptedSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value> {
        self.record(request);
        match &request.task {
            Task::CategoryEssence { category } => {
                if self.failing_categories.iter().any(|c| c == category) {
                    Err(PipelineError::SummarizerError(format!(
                        "scripted failure for {}",
                        category
                    )))
                } else {
                    Ok(self.essence_for(category))
                }
            }
            Task::Validation => Ok(self.validation.clone()),
            other => Err(PipelineError::MalformedResponse(format!(
                "no structured answer scripted for {}",
                other
            ))),
        }
    }

    async fn draft(&self, request: &ExtractionRequest) -> Result<String> {
        self.record(request);
        match &request.task {
            Task::AnalystReport => Ok(self.report.clone()),
            Task::ExecutiveSummary => self.executive_summary.clone().ok_or_else(|| {
                PipelineError::SummarizerError("scripted summary failure".to_string())
            }),
            other => Err(PipelineError::SummarizerError(format!(
                "no prose scripted for {}",
                other
            ))),
        }
    }
}

/// Strong fundamentals, high probability, manageable risk, no red flags.
pub fn favorable_assessment() -> Value {
    json!({
        "recommendation": "BUY",
        "confidence": "high",
        "expected_return": "45-55% over 3 years",
        "probability_of_return_threshold": "high",
        "fundamentals": "strong",
        "risk_assessment": "manageable",
        "key_drivers": ["Market share gains", "Operating leverage"],
        "key_risks": ["Input-cost inflation"],
        "red_flags_found": [],
        "financial_concerns": [],
        "reasoning": "Consistent cash generation, conservative balance sheet and clean governance."
    })
}

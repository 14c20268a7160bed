//! Core data models for the research pipeline

use crate::error::PipelineError;
use crate::stage::Stage;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// Lenient parse used on capability output.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" | "very high" | "strong" => Some(ConfidenceTier::High),
            "medium" | "moderate" | "mid" => Some(ConfidenceTier::Medium),
            "low" | "very low" | "weak" => Some(ConfidenceTier::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Avoid,
}

//
// ================= Evidence =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    pub url: String,
    pub title: String,
    pub source_domain: String,
    pub retrieved_at: DateTime<Utc>,
    pub excerpt: String,
    pub confidence: ConfidenceTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtopicEvidence {
    pub subtopic: String,
    pub query: String,
    pub evidence: Vec<EvidenceItem>,
}

/// Raw evidence for one research category, subtopics in catalogue order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryEvidence {
    pub category: String,
    pub subtopics: Vec<SubtopicEvidence>,
}

impl CategoryEvidence {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subtopics: Vec::new(),
        }
    }

    /// Append a subtopic, keeping only the head `cap` items in relevance order.
    pub fn push_subtopic(
        &mut self,
        subtopic: impl Into<String>,
        query: impl Into<String>,
        mut evidence: Vec<EvidenceItem>,
        cap: usize,
    ) {
        evidence.truncate(cap);
        self.subtopics.push(SubtopicEvidence {
            subtopic: subtopic.into(),
            query: query.into(),
            evidence,
        });
    }

    pub fn item_count(&self) -> usize {
        self.subtopics.iter().map(|s| s.evidence.len()).sum()
    }
}

/// Numeric prefix of a category identifier ("10_risks_..." → 10).
/// Categories without one sort after all numbered categories.
pub fn category_index(category: &str) -> u32 {
    category
        .split('_')
        .next()
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(u32::MAX)
}

//
// ================= Essence =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyMetric {
    pub metric: String,
    pub value: String,
    #[serde(default)]
    pub source: String,
}

/// Bounded extraction of one category's evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryEssence {
    pub category: String,
    pub core_facts: Vec<String>,
    pub key_numbers: Vec<KeyMetric>,
    pub risks_and_red_flags: Vec<String>,
    pub strengths: Vec<String>,
    pub key_quotes: Vec<String>,
    pub source_quality: ConfidenceTier,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryEssence {
    pub const MAX_CORE_FACTS: usize = 10;
    pub const MAX_KEY_NUMBERS: usize = 10;
    pub const MAX_RISKS: usize = 10;
    pub const MAX_STRENGTHS: usize = 5;
    pub const MAX_QUOTES: usize = 5;
    pub const MAX_SUMMARY_CHARS: usize = 1500;

    /// Placeholder for a category whose extraction failed.
    pub fn sentinel(category: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            category: category.into(),
            core_facts: Vec::new(),
            key_numbers: Vec::new(),
            risks_and_red_flags: Vec::new(),
            strengths: Vec::new(),
            key_quotes: Vec::new(),
            source_quality: ConfidenceTier::Low,
            summary: format!("Error processing category: {}", error),
            error: Some(error),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.error.is_some()
    }

    /// Enforce every declared cardinality, whatever the extractor returned.
    pub fn clamp(mut self) -> Self {
        self.core_facts.truncate(Self::MAX_CORE_FACTS);
        self.key_numbers.truncate(Self::MAX_KEY_NUMBERS);
        self.risks_and_red_flags.truncate(Self::MAX_RISKS);
        self.strengths.truncate(Self::MAX_STRENGTHS);
        self.key_quotes.truncate(Self::MAX_QUOTES);
        if self.summary.chars().count() > Self::MAX_SUMMARY_CHARS {
            self.summary = truncate_chars(&self.summary, Self::MAX_SUMMARY_CHARS).to_string();
        }
        self
    }
}

/// The only view of the evidence that report and validation may read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CondensedProfile {
    pub subject: String,
    pub categories_processed: usize,
    pub category_essences: Vec<CategoryEssence>,
}

impl CondensedProfile {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            categories_processed: 0,
            category_essences: Vec::new(),
        }
    }

    /// Insert in processing order; category keys are unique.
    pub fn insert(&mut self, essence: CategoryEssence) -> Result<()> {
        if self.get(&essence.category).is_some() {
            return Err(PipelineError::InvalidInput(format!(
                "duplicate category in condensed profile: {}",
                essence.category
            )));
        }
        self.category_essences.push(essence);
        self.categories_processed = self.category_essences.len();
        Ok(())
    }

    pub fn get(&self, category: &str) -> Option<&CategoryEssence> {
        self.category_essences.iter().find(|e| e.category == category)
    }

    pub fn failed_categories(&self) -> impl Iterator<Item = &CategoryEssence> {
        self.category_essences.iter().filter(|e| e.is_sentinel())
    }

    /// Plain-text rendering for downstream prompts, in category order.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for essence in &self.category_essences {
            let title = essence.category.replace('_', " ");
            out.push_str(&format!("\n=== {} ===\n", title));

            if let Some(error) = &essence.error {
                out.push_str(&format!("(no data: {})\n", error));
                continue;
            }

            out.push_str(&format!("Summary: {}\n", essence.summary));
            push_list(&mut out, "Core facts", &essence.core_facts);
            if !essence.key_numbers.is_empty() {
                out.push_str("Key numbers:\n");
                for metric in &essence.key_numbers {
                    out.push_str(&format!("- {}: {} ({})\n", metric.metric, metric.value, metric.source));
                }
            }
            push_list(&mut out, "Risks and red flags", &essence.risks_and_red_flags);
            push_list(&mut out, "Strengths", &essence.strengths);
            push_list(&mut out, "Key quotes", &essence.key_quotes);
            out.push_str(&format!("Source quality: {}\n", essence.source_quality));
        }
        out
    }
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(heading);
    out.push_str(":\n");
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
}

//
// ================= Financial Inputs =================
//

/// Numeric screening inputs for a subject. Every field is optional;
/// a missing metric counts as incomplete evidence, never as a pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinancialInputs {
    #[serde(default, alias = "prom_hold")]
    pub promoter_holding_pct: Option<f64>,
    #[serde(default, alias = "chg_fii")]
    pub fii_holding_change_pct: Option<f64>,
    #[serde(default, alias = "chg_dii")]
    pub dii_holding_change_pct: Option<f64>,
    #[serde(default, alias = "debt_eq")]
    pub debt_to_equity: Option<f64>,
    #[serde(default, alias = "fcf_3y")]
    pub free_cash_flow_3y: Option<f64>,
    #[serde(default, alias = "wc_days")]
    pub working_capital_days: Option<f64>,
    #[serde(default, alias = "cash_cycle")]
    pub cash_conversion_cycle_days: Option<f64>,

    // Context only; not evaluated by the red-flag rules.
    #[serde(default, alias = "market_cap")]
    pub market_cap_cr: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default, alias = "ind_pe")]
    pub industry_pe: Option<f64>,
    #[serde(default, alias = "roce")]
    pub roce_pct: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
}

impl FinancialInputs {
    fn labelled(&self) -> [(&'static str, Option<f64>); 12] {
        [
            ("Promoter Holding %", self.promoter_holding_pct),
            ("Change in FII Holding %", self.fii_holding_change_pct),
            ("Change in DII Holding %", self.dii_holding_change_pct),
            ("Debt/Equity", self.debt_to_equity),
            ("Free Cash Flow 3Y (Cr)", self.free_cash_flow_3y),
            ("Working Capital Days", self.working_capital_days),
            ("Cash Conversion Cycle Days", self.cash_conversion_cycle_days),
            ("Market Cap (Cr)", self.market_cap_cr),
            ("P/E Ratio", self.pe_ratio),
            ("Industry P/E", self.industry_pe),
            ("ROCE %", self.roce_pct),
            ("Current Price", self.current_price),
        ]
    }

    /// Reject inputs that cannot describe a real company.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in self.labelled() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(PipelineError::InvalidInput(format!(
                        "{} must be a finite number",
                        label
                    )));
                }
            }
        }
        if let Some(p) = self.promoter_holding_pct {
            if !(0.0..=100.0).contains(&p) {
                return Err(PipelineError::InvalidInput(format!(
                    "Promoter holding must be between 0 and 100, got {}",
                    p
                )));
            }
        }
        if let Some(de) = self.debt_to_equity {
            if de < 0.0 {
                return Err(PipelineError::InvalidInput(format!(
                    "Debt/Equity cannot be negative, got {}",
                    de
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.labelled().iter().all(|(_, v)| v.is_none())
    }

    /// One "- label: value" line per known metric, for prompts.
    pub fn to_prompt_lines(&self) -> String {
        self.labelled()
            .iter()
            .map(|(label, value)| match value {
                Some(v) => format!("- {}: {}", label, v),
                None => format!("- {}: N/A", label),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Triggered,
    Clear,
    Missing,
}

/// Outcome of one deterministic red-flag rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleFinding {
    pub rule_name: String,
    pub status: RuleStatus,
    pub details: String,
}

/// Which precedence branch contributed to the final label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "basis", content = "detail", rename_all = "snake_case")]
pub enum DecisionBasis {
    ImmediateAvoid(Vec<String>),
    DeterministicRedFlags(Vec<String>),
    UnresolvedGovernanceOrLegal(Vec<String>),
    LowReturnProbability,
    RiskOutweighsReturn,
    IncompleteEvidence(Vec<String>),
    AmbiguousAssessment(Vec<String>),
    AllBuyConditionsMet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub recommendation: Recommendation,
    pub confidence: ConfidenceTier,
    pub probability_of_return_threshold: ConfidenceTier,
    pub expected_return: String,
    pub red_flags_found: Vec<String>,
    pub financial_concerns: Vec<String>,
    pub key_drivers: Vec<String>,
    pub key_risks: Vec<String>,
    pub reasoning: String,
    pub rule_findings: Vec<RuleFinding>,
    pub decision_basis: Vec<DecisionBasis>,
}

//
// ================= Job =================
//

/// Sub-step progress inside a stage. Overwritten at each step, never accumulated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_categories: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtopic_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_subtopics: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProgressDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTransition {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Everything a completed job produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub report: String,
    pub executive_summary: String,
    pub validation: ValidationResult,
    pub report_path: String,
    pub report_sha256: String,
    pub profile_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub subject: String,
    pub financial_inputs: FinancialInputs,
    pub stage: Stage,
    pub progress: Progress,
    pub error: Option<String>,
    pub transitions: Vec<StageTransition>,
    pub result: Option<Arc<JobResult>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(subject: impl Into<String>, financial_inputs: FinancialInputs) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            subject: subject.into(),
            financial_inputs,
            stage: Stage::Created,
            progress: Progress {
                current: 0,
                total: Stage::TOTAL,
                message: "Starting research workflow...".to_string(),
                detail: None,
            },
            error: None,
            transitions: vec![StageTransition {
                stage: Stage::Created,
                at: now,
            }],
            result: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.stage.is_terminal() {
            Err(PipelineError::JobTerminal(self.job_id))
        } else {
            Ok(())
        }
    }

    /// Move to the next stage; clears any sub-step detail.
    pub fn advance(&mut self, to: Stage, message: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        if to == Stage::Error {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.stage = self.stage.transition(to)?;
        let now = Utc::now();
        self.progress.current = to.ordinal().unwrap_or(self.progress.current);
        self.progress.message = message.into();
        self.progress.detail = None;
        self.transitions.push(StageTransition { stage: to, at: now });
        self.updated_at = now;
        if to == Stage::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Absorb the job into `Error`. Progress counters stay where they were.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.stage = self.stage.transition(Stage::Error)?;
        let reason = reason.into();
        let now = Utc::now();
        self.progress.message = format!("Error: {}", reason);
        self.progress.detail = None;
        self.error = Some(reason);
        self.transitions.push(StageTransition {
            stage: Stage::Error,
            at: now,
        });
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn set_detail(&mut self, detail: ProgressDetail) -> Result<()> {
        self.ensure_mutable()?;
        self.progress.detail = Some(detail);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, result: JobResult) -> Result<()> {
        self.ensure_mutable()?;
        if self.stage != Stage::Validating {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to: Stage::Completed,
            });
        }
        self.result = Some(Arc::new(result));
        self.advance(Stage::Completed, "Research completed successfully")
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.job_id,
            subject: self.subject.clone(),
            stage: self.stage,
            progress: self.progress.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only projection of a job for pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: Uuid,
    pub subject: String,
    pub stage: Stage,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Subject =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub name: String,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub financial_inputs: Option<FinancialInputs>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Buy => "BUY",
            Recommendation::Avoid => "AVOID",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// Prefix of `text` holding at most `max_chars` characters, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_is_unicode_safe() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("₹₹₹", 2), "₹₹");
    }

    #[test]
    fn test_category_index_orders_numerically() {
        assert_eq!(category_index("10_risks_and_downside_scenarios"), 10);
        assert_eq!(category_index("2_financial_strength"), 2);
        assert_eq!(category_index("misc"), u32::MAX);
    }

    #[test]
    fn test_essence_clamp_enforces_caps() {
        let many = |n: usize| (0..n).map(|i| format!("item {}", i)).collect::<Vec<_>>();
        let essence = CategoryEssence {
            category: "c".into(),
            core_facts: many(14),
            key_numbers: (0..12)
                .map(|i| KeyMetric {
                    metric: format!("m{}", i),
                    value: "1".into(),
                    source: "s".into(),
                })
                .collect(),
            risks_and_red_flags: many(11),
            strengths: many(9),
            key_quotes: many(7),
            source_quality: ConfidenceTier::High,
            summary: "x".repeat(4000),
            error: None,
        }
        .clamp();

        assert_eq!(essence.core_facts.len(), CategoryEssence::MAX_CORE_FACTS);
        assert_eq!(essence.key_numbers.len(), CategoryEssence::MAX_KEY_NUMBERS);
        assert_eq!(essence.risks_and_red_flags.len(), CategoryEssence::MAX_RISKS);
        assert_eq!(essence.strengths.len(), CategoryEssence::MAX_STRENGTHS);
        assert_eq!(essence.key_quotes.len(), CategoryEssence::MAX_QUOTES);
        assert_eq!(essence.summary.len(), CategoryEssence::MAX_SUMMARY_CHARS);
        assert_eq!(essence.core_facts[0], "item 0");
    }

    #[test]
    fn test_profile_rejects_duplicate_category() {
        let mut profile = CondensedProfile::new("Acme");
        profile.insert(CategoryEssence::sentinel("1_a", "boom")).unwrap();
        assert!(profile.insert(CategoryEssence::sentinel("1_a", "again")).is_err());
        assert_eq!(profile.categories_processed, 1);
    }

    #[test]
    fn test_financial_inputs_accept_original_column_keys() {
        let inputs: FinancialInputs = serde_json::from_value(serde_json::json!({
            "prom_hold": 62.5,
            "chg_fii": -0.4,
            "debt_eq": 0.3
        }))
        .unwrap();
        assert_eq!(inputs.promoter_holding_pct, Some(62.5));
        assert_eq!(inputs.fii_holding_change_pct, Some(-0.4));
        assert_eq!(inputs.debt_to_equity, Some(0.3));
        assert!(inputs.working_capital_days.is_none());
    }

    #[test]
    fn test_financial_inputs_validation() {
        let bad = FinancialInputs {
            promoter_holding_pct: Some(140.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let nan = FinancialInputs {
            free_cash_flow_3y: Some(f64::NAN),
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let ok = FinancialInputs {
            promoter_holding_pct: Some(55.0),
            cash_conversion_cycle_days: Some(-12.0),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_job_record_lifecycle() {
        let mut job = JobRecord::new("Acme", FinancialInputs::default());
        job.advance(Stage::CompanySelected, "Selected: Acme").unwrap();
        job.set_detail(ProgressDetail {
            message: "sub-step".into(),
            ..Default::default()
        })
        .unwrap();
        job.advance(Stage::Researching, "Gathering evidence").unwrap();
        assert!(job.progress.detail.is_none());
        assert_eq!(job.progress.current, 2);

        assert!(job.advance(Stage::Validating, "skip").is_err());

        job.fail("search exhausted").unwrap();
        assert_eq!(job.stage, Stage::Error);
        assert_eq!(job.progress.current, 2);
        assert_eq!(job.error.as_deref(), Some("search exhausted"));
        assert!(matches!(
            job.advance(Stage::Preprocessing, "late"),
            Err(PipelineError::JobTerminal(_))
        ));
        assert!(job.fail("again").is_err());
    }
}

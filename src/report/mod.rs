//! Report stage: analyst narrative, executive summary and the final document.

use crate::capability::{call_with_retry, ExtractionRequest, RetryPolicy, Summarizer, Task};
use crate::error::PipelineError;
use crate::models::{
    truncate_chars, CondensedProfile, DecisionBasis, FinancialInputs, RuleStatus,
    ValidationResult,
};
use crate::stage::Stage;
use crate::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

const REPORT_SYSTEM_PROMPT: &str = "You are a strict, critical equity research analyst. You are \
conservative, prioritize risk, fraud detection and track record, and cite sources for every claim.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You write concise, professional executive summaries for investment reports.";

const MAX_REASONING_CHARS: usize = 500;

pub struct ReportWriter {
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
}

impl ReportWriter {
    pub fn new(summarizer: Arc<dyn Summarizer>, retry: RetryPolicy) -> Self {
        Self { summarizer, retry }
    }

    /// Draft the narrative from the condensed profile only.
    pub async fn draft_report(
        &self,
        subject: &str,
        inputs: &FinancialInputs,
        profile: &CondensedProfile,
    ) -> Result<String> {
        let request = report_request(subject, inputs, profile);
        let summarizer = &self.summarizer;
        let request_ref = &request;

        let report = call_with_retry(&self.retry, "draft_report", move || summarizer.draft(request_ref))
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::ReportGeneration, e.to_string()))?;

        let trimmed = report.trim();
        if trimmed.is_empty() || trimmed.starts_with("Error") {
            return Err(PipelineError::stage_failed(
                Stage::ReportGeneration,
                format!("unusable report: {}", truncate_chars(trimmed, 200)),
            ));
        }

        info!(subject, chars = trimmed.chars().count(), "Analyst report drafted");
        Ok(trimmed.to_string())
    }

    /// A short paragraph for the top of the document; never fails.
    pub async fn executive_summary(&self, subject: &str, validation: &ValidationResult) -> String {
        let reasoning = clip_reasoning(&validation.reasoning);
        let request = ExtractionRequest {
            task: Task::ExecutiveSummary,
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            prompt: format!(
                "Write a single paragraph (3-5 sentences) executive summary of this investment \
                 recommendation. State the recommendation first, give the key rationale, and \
                 mention the expected return and confidence. Plain text only.\n\n\
                 Company: {}\nRecommendation: {}\nConfidence: {}\nExpected 3-Year Return: {}\n\
                 Key Reasoning: {}",
                subject, validation.recommendation, validation.confidence, validation.expected_return, reasoning
            ),
            temperature: 0.3,
        };
        let summarizer = &self.summarizer;
        let request_ref = &request;

        match call_with_retry(&self.retry, "executive_summary", move || summarizer.draft(request_ref)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_summary(subject, validation),
            Err(e) => {
                warn!(subject, error = %e, "Executive summary failed - using fallback");
                fallback_summary(subject, validation)
            }
        }
    }
}

pub fn report_request(subject: &str, inputs: &FinancialInputs, profile: &CondensedProfile) -> ExtractionRequest {
    let prompt = format!(
        r#"Write a comprehensive analyst report on {subject}.

Financial Data:
{metrics}

Condensed Research Profile (by category):
{profile}

Instructions:
- Open with **BUY** or **AVOID** in bold; default to AVOID unless evidence for BUY is strong.
- Prioritize fraud, investigations, regulatory actions, litigation, governance, accounting
  irregularities, insider trading, credit downgrades and debt defaults.
- Treat promoter holding below 50%, FII/DII exits, high leverage, negative free cash flow and
  long working-capital cycles as red flags.
- Review the 5-10 year track record and capital allocation.
- Present weaknesses before strengths, one section per research category, and cite sources.
- Judge whether a 40% return over 3 years is plausible, conservatively.
- Use markdown."#,
        subject = subject,
        metrics = inputs.to_prompt_lines(),
        profile = profile.to_prompt_text(),
    );

    ExtractionRequest {
        task: Task::AnalystReport,
        system: REPORT_SYSTEM_PROMPT.to_string(),
        prompt,
        temperature: 0.3,
    }
}

fn clip_reasoning(reasoning: &str) -> String {
    if reasoning.chars().count() > MAX_REASONING_CHARS {
        format!("{}...", truncate_chars(reasoning, MAX_REASONING_CHARS))
    } else {
        reasoning.to_string()
    }
}

pub fn fallback_summary(subject: &str, validation: &ValidationResult) -> String {
    let reasoning = truncate_chars(&validation.reasoning, 200);
    format!(
        "{} receives a {} recommendation with {} confidence. Expected 3-year return is {}. {}",
        subject, validation.recommendation, validation.confidence, validation.expected_return, reasoning
    )
    .trim_end()
    .to_string()
}

fn bullet_list(items: &[String], prefix: &str, empty: &str) -> String {
    if items.is_empty() {
        return format!("- {}", empty);
    }
    items
        .iter()
        .map(|item| format!("- {}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_basis(basis: &DecisionBasis) -> String {
    match basis {
        DecisionBasis::ImmediateAvoid(flags) => format!("Immediate avoid: {}", flags.join("; ")),
        DecisionBasis::DeterministicRedFlags(flags) => {
            format!("Deterministic red flags: {}", flags.join("; "))
        }
        DecisionBasis::UnresolvedGovernanceOrLegal(flags) => {
            format!("Unresolved governance/legal flags: {}", flags.join("; "))
        }
        DecisionBasis::LowReturnProbability => "Low probability of the return threshold".to_string(),
        DecisionBasis::RiskOutweighsReturn => "Risk outweighs return".to_string(),
        DecisionBasis::IncompleteEvidence(missing) => {
            format!("Incomplete evidence: {}", missing.join("; "))
        }
        DecisionBasis::AmbiguousAssessment(gaps) => format!("Ambiguous assessment: {}", gaps.join("; ")),
        DecisionBasis::AllBuyConditionsMet => "All BUY conditions met".to_string(),
    }
}

/// The persisted document.
pub fn render_markdown(
    subject: &str,
    date: &str,
    report: &str,
    validation: &ValidationResult,
    executive_summary: &str,
) -> String {
    let mut md = String::new();

    let _ = write!(
        md,
        "# Analyst Report: {subject}\n\n**Date:** {date}\n\n---\n\n## Executive Summary\n\n\
         **Recommendation:** {rec}  \n**Confidence:** {conf}  \n**Expected 3-Year Return:** {ret}  \n\
         **Probability of 40%+ Return:** {prob}\n\n### TLDR Summary\n\n{tldr}\n\n---\n\n\
         ## Detailed Analysis\n\n{report}\n\n---\n\n## Validation & Recommendation\n\n\
         ### Recommendation: {rec}\n\n",
        subject = subject,
        date = date,
        rec = validation.recommendation,
        conf = validation.confidence,
        ret = validation.expected_return,
        prob = validation.probability_of_return_threshold,
        tldr = executive_summary,
        report = report,
    );

    let _ = write!(
        md,
        "### Key Drivers:\n{}\n\n### Key Risks:\n{}\n\n### Red Flags Found:\n{}\n\n\
         ### Financial Concerns:\n{}\n\n",
        bullet_list(&validation.key_drivers, "", "None identified"),
        bullet_list(&validation.key_risks, "", "None identified"),
        bullet_list(&validation.red_flags_found, "[WARNING] ", "No major red flags identified"),
        bullet_list(
            &validation.financial_concerns,
            "[WARNING] ",
            "No major financial concerns identified"
        ),
    );

    md.push_str("### Deterministic Screening:\n");
    for finding in &validation.rule_findings {
        let mark = match finding.status {
            RuleStatus::Triggered => "TRIGGERED",
            RuleStatus::Clear => "clear",
            RuleStatus::Missing => "missing",
        };
        let _ = writeln!(md, "- `{}` ({}): {}", finding.rule_name, mark, finding.details);
    }

    md.push_str("\n### Decision Basis:\n");
    for basis in &validation.decision_basis {
        let _ = writeln!(md, "- {}", describe_basis(basis));
    }

    let _ = write!(md, "\n### Reasoning:\n{}\n", validation.reasoning);
    md
}

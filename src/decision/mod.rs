//! Decision / validation engine
//!
//! Two layers, deterministic first:
//!
//! - numeric red-flag rules over the financial inputs ([`rules`])
//! - one semantic assessment from the summarizer, fed only the condensed
//!   profile, the inputs and the drafted report ([`semantic`])
//!
//! [`decide`] combines them with a fixed precedence. It is biased to AVOID:
//! BUY needs every positive condition to hold explicitly.

pub mod rules;
pub mod semantic;

use crate::capability::{call_with_retry, ExtractionRequest, RetryPolicy, Summarizer, Task};
use crate::error::PipelineError;
use crate::models::{
    truncate_chars, ConfidenceTier, CondensedProfile, DecisionBasis, FinancialInputs,
    Recommendation, RuleFinding, RuleStatus, ValidationResult,
};
use crate::stage::Stage;
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub use rules::{default_rules, evaluate_all, RedFlagRule, ThresholdRule};
pub use semantic::{FundamentalsView, RedFlagCategory, RiskView, SemanticAssessment, SemanticRedFlag};

const MAX_REPORT_CHARS: usize = 20_000;
const MAX_PROFILE_CHARS: usize = 30_000;

const VALIDATION_SYSTEM_PROMPT: &str = "You are a strict, conservative equity analyst. Default to \
AVOID unless the evidence for BUY is overwhelming. Risk, fraud, governance and track record \
outweigh potential returns.";

pub struct DecisionEngine {
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
    rules: Vec<Box<dyn RedFlagRule>>,
}

impl DecisionEngine {
    pub fn new(summarizer: Arc<dyn Summarizer>, retry: RetryPolicy) -> Self {
        Self {
            summarizer,
            retry,
            rules: default_rules(),
        }
    }

    pub fn evaluate_rules(&self, inputs: &FinancialInputs) -> Vec<RuleFinding> {
        evaluate_all(&self.rules, inputs)
    }

    /// Capability failure here is fatal to the job.
    pub async fn validate(
        &self,
        subject: &str,
        inputs: &FinancialInputs,
        profile: &CondensedProfile,
        report: &str,
    ) -> Result<ValidationResult> {
        let findings = self.evaluate_rules(inputs);
        let request = validation_request(subject, inputs, profile, report, &findings);

        let summarizer = &self.summarizer;
        let request_ref = &request;
        let value = call_with_retry(&self.retry, "validate", move || summarizer.extract(request_ref))
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Validating, e.to_string()))?;

        let result = decide(findings, SemanticAssessment::from_value(&value));

        info!(
            subject,
            recommendation = %result.recommendation,
            confidence = %result.confidence,
            red_flags = result.red_flags_found.len(),
            "Validation complete"
        );

        Ok(result)
    }
}

pub fn validation_request(
    subject: &str,
    inputs: &FinancialInputs,
    profile: &CondensedProfile,
    report: &str,
    findings: &[RuleFinding],
) -> ExtractionRequest {
    let profile_text = profile.to_prompt_text();
    let profile_text = clip(&profile_text, MAX_PROFILE_CHARS);
    let report = clip(report, MAX_REPORT_CHARS);

    let rule_lines = findings
        .iter()
        .map(|f| format!("- {} [{:?}]: {}", f.rule_name, f.status, f.details))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"Evaluate {subject} for a BUY or AVOID decision against a 40% return over 3 years.

Financial Metrics:
{metrics}

Deterministic screening:
{rules}

Condensed Research Profile:
{profile}

Analyst Report:
{report}

Guidelines:
- Financials first: profitability, growth, leverage, cash flows, capital efficiency.
- Scrutinize fraud, investigations, regulatory actions, lawsuits, governance issues,
  accounting irregularities, insider trading, credit downgrades and debt defaults.
- Weigh the 5-10 year track record and management's capital allocation.
- BUY only with strong fundamentals, a clear moat, manageable risk and a highly probable 40% return.
- When in doubt, AVOID.

Respond with a single JSON object (empty arrays when nothing applies):
{{
  "recommendation": "BUY" | "AVOID",
  "confidence": "high" | "medium" | "low",
  "expected_return": "estimate, e.g. 45% or N/A",
  "probability_of_return_threshold": "high" | "medium" | "low",
  "fundamentals": "strong" | "moderate" | "weak",
  "risk_assessment": "manageable" | "balanced" | "outweighs_return",
  "key_drivers": ["..."],
  "key_risks": ["..."],
  "red_flags_found": [{{"category": "fraud|accounting_irregularity|insider_trading|debt_default|governance|litigation|regulatory|credit_downgrade|track_record|other", "description": "...", "resolved": false}}],
  "financial_concerns": ["..."],
  "reasoning": "numbers and qualitative arguments"
}}"#,
        subject = subject,
        metrics = inputs.to_prompt_lines(),
        rules = rule_lines,
        profile = profile_text,
        report = report,
    );

    ExtractionRequest {
        task: Task::Validation,
        system: VALIDATION_SYSTEM_PROMPT.to_string(),
        prompt,
        temperature: 0.1,
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}... (truncated)", truncate_chars(text, max_chars))
    } else {
        text.to_string()
    }
}

/// Apply the precedence rule.
///
/// 1. any immediate-avoid flag: AVOID
/// 2. any deterministic flag, unresolved governance/legal flag, low return
///    probability, or risk outweighing return: AVOID
/// 3. BUY only when no flag of any kind exists, fundamentals are strong,
///    probability is high, risk is manageable, no metric is missing and the
///    assessment itself says BUY
/// 4. anything else: AVOID
pub fn decide(rule_findings: Vec<RuleFinding>, assessment: SemanticAssessment) -> ValidationResult {
    let triggered: Vec<String> = rule_findings
        .iter()
        .filter(|f| f.status == RuleStatus::Triggered)
        .map(|f| f.details.clone())
        .collect();
    let missing: Vec<String> = rule_findings
        .iter()
        .filter(|f| f.status == RuleStatus::Missing)
        .map(|f| f.details.clone())
        .collect();
    let immediate: Vec<String> = assessment
        .red_flags
        .iter()
        .filter(|flag| flag.category.is_immediate_avoid())
        .map(|flag| flag.description.clone())
        .collect();
    let unresolved_legal: Vec<String> = assessment
        .red_flags
        .iter()
        .filter(|flag| flag.category.is_governance_or_legal() && !flag.resolved)
        .map(|flag| flag.description.clone())
        .collect();

    let mut basis = Vec::new();
    if !immediate.is_empty() {
        basis.push(DecisionBasis::ImmediateAvoid(immediate.clone()));
    }
    if !triggered.is_empty() {
        basis.push(DecisionBasis::DeterministicRedFlags(triggered.clone()));
    }
    if !unresolved_legal.is_empty() {
        basis.push(DecisionBasis::UnresolvedGovernanceOrLegal(unresolved_legal));
    }
    if assessment.probability == Some(ConfidenceTier::Low) {
        basis.push(DecisionBasis::LowReturnProbability);
    }
    if assessment.risk == RiskView::OutweighsReturn {
        basis.push(DecisionBasis::RiskOutweighsReturn);
    }

    let forced_avoid = !basis.is_empty();

    let recommendation = if forced_avoid {
        Recommendation::Avoid
    } else {
        let mut gaps = Vec::new();
        if !assessment.red_flags.is_empty() {
            gaps.push(format!("{} semantic red flag(s) reported", assessment.red_flags.len()));
        }
        if assessment.fundamentals != FundamentalsView::Strong {
            gaps.push("fundamentals not assessed as strong".to_string());
        }
        if assessment.probability != Some(ConfidenceTier::High) {
            gaps.push("probability of the return threshold not high".to_string());
        }
        if assessment.risk != RiskView::Manageable {
            gaps.push("risk not assessed as manageable".to_string());
        }
        if assessment.recommendation != Some(Recommendation::Buy) {
            gaps.push("assessment did not recommend BUY".to_string());
        }

        if !missing.is_empty() {
            basis.push(DecisionBasis::IncompleteEvidence(missing.clone()));
        }
        if !gaps.is_empty() {
            basis.push(DecisionBasis::AmbiguousAssessment(gaps));
        }

        if basis.is_empty() {
            basis.push(DecisionBasis::AllBuyConditionsMet);
            Recommendation::Buy
        } else {
            Recommendation::Avoid
        }
    };

    let confidence = if !immediate.is_empty() || !triggered.is_empty() {
        ConfidenceTier::High
    } else {
        assessment.confidence.unwrap_or(ConfidenceTier::Medium)
    };

    let mut red_flags_found: Vec<String> = assessment
        .red_flags
        .iter()
        .map(|flag| {
            if flag.resolved {
                format!("{} (resolved)", flag.description)
            } else {
                flag.description.clone()
            }
        })
        .collect();
    red_flags_found.extend(triggered.iter().cloned());

    let mut financial_concerns = assessment.financial_concerns;
    financial_concerns.extend(triggered);

    ValidationResult {
        recommendation,
        confidence,
        probability_of_return_threshold: assessment.probability.unwrap_or(ConfidenceTier::Low),
        expected_return: assessment.expected_return,
        red_flags_found,
        financial_concerns,
        key_drivers: assessment.key_drivers,
        key_risks: assessment.key_risks,
        reasoning: assessment.reasoning,
        rule_findings,
        decision_basis: basis,
    }
}

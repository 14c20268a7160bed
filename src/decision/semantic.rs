//! Semantic assessment returned by the validation extraction.
//!
//! The capability output is treated as untrusted: every field is optional,
//! unknown values collapse to `Unknown`, and red-flag categories are
//! re-derived from the flag text so a mislabelled fraud finding still counts.

use crate::models::{ConfidenceTier, Recommendation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagCategory {
    Fraud,
    AccountingIrregularity,
    InsiderTrading,
    DebtDefault,
    Governance,
    Litigation,
    Regulatory,
    CreditDowngrade,
    TrackRecord,
    Other,
}

impl RedFlagCategory {
    /// Forces AVOID regardless of every other signal.
    pub fn is_immediate_avoid(&self) -> bool {
        matches!(
            self,
            RedFlagCategory::Fraud
                | RedFlagCategory::AccountingIrregularity
                | RedFlagCategory::InsiderTrading
                | RedFlagCategory::DebtDefault
        )
    }

    /// Forces AVOID while unresolved.
    pub fn is_governance_or_legal(&self) -> bool {
        matches!(
            self,
            RedFlagCategory::Governance | RedFlagCategory::Litigation | RedFlagCategory::Regulatory
        )
    }

    fn severity(&self) -> u8 {
        if self.is_immediate_avoid() {
            3
        } else if self.is_governance_or_legal() {
            2
        } else if *self == RedFlagCategory::Other {
            0
        } else {
            1
        }
    }

    /// A category label as written by the capability.
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();

        let category = match normalized.as_str() {
            "fraud" => RedFlagCategory::Fraud,
            "accounting_irregularity" | "accounting_irregularities" | "accounting" => {
                RedFlagCategory::AccountingIrregularity
            }
            "insider_trading" | "insider_trading_violation" => RedFlagCategory::InsiderTrading,
            "debt_default" | "default" => RedFlagCategory::DebtDefault,
            "governance" | "corporate_governance" => RedFlagCategory::Governance,
            "litigation" | "legal" => RedFlagCategory::Litigation,
            "regulatory" | "regulatory_action" => RedFlagCategory::Regulatory,
            "credit_downgrade" | "downgrade" => RedFlagCategory::CreditDowngrade,
            "track_record" | "track_record_failure" => RedFlagCategory::TrackRecord,
            "other" => RedFlagCategory::Other,
            _ => return None,
        };
        Some(category)
    }

    /// Keyword classification of free text. Most severe match first.
    pub fn classify(text: &str) -> Self {
        const RULES: &[(&[&str], RedFlagCategory)] = &[
            (
                &["fraud", "ponzi", "embezzl", "misappropriat", "siphon"],
                RedFlagCategory::Fraud,
            ),
            (
                &["accounting irregular", "falsif", "window dressing", "cooked books", "misstat"],
                RedFlagCategory::AccountingIrregularity,
            ),
            (&["insider trading"], RedFlagCategory::InsiderTrading),
            (
                &["debt default", "defaulted", "loan default", "payment default", "default on"],
                RedFlagCategory::DebtDefault,
            ),
            (
                &["governance", "related-party", "related party", "pledg", "auditor resign", "board independence"],
                RedFlagCategory::Governance,
            ),
            (
                &["litigation", "lawsuit", "court", "legal"],
                RedFlagCategory::Litigation,
            ),
            (
                &["regulator", "sebi", "penalt", "show cause", "investigation", "enforcement"],
                RedFlagCategory::Regulatory,
            ),
            (&["downgrade"], RedFlagCategory::CreditDowngrade),
            (&["track record", "missed guidance"], RedFlagCategory::TrackRecord),
        ];

        let text = text.to_lowercase();
        RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| text.contains(n)))
            .map(|(_, category)| *category)
            .unwrap_or(RedFlagCategory::Other)
    }

    fn more_severe(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRedFlag {
    pub category: RedFlagCategory,
    pub description: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalsView {
    Strong,
    Moderate,
    Weak,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskView {
    Manageable,
    Balanced,
    OutweighsReturn,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticAssessment {
    pub recommendation: Option<Recommendation>,
    pub confidence: Option<ConfidenceTier>,
    pub probability: Option<ConfidenceTier>,
    pub expected_return: String,
    pub fundamentals: FundamentalsView,
    pub risk: RiskView,
    pub red_flags: Vec<SemanticRedFlag>,
    pub financial_concerns: Vec<String>,
    pub key_drivers: Vec<String>,
    pub key_risks: Vec<String>,
    pub reasoning: String,
}

impl SemanticAssessment {
    pub fn from_value(value: &Value) -> Self {
        let text = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|key| match value.get(*key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        };

        let recommendation = text(&["recommendation"]).and_then(|r| {
            match r.to_uppercase().as_str() {
                "BUY" => Some(Recommendation::Buy),
                "AVOID" => Some(Recommendation::Avoid),
                _ => None,
            }
        });

        let fundamentals = match text(&["fundamentals", "fundamentals_assessment"]) {
            Some(f) => {
                let f = f.to_lowercase();
                if f.contains("strong") {
                    FundamentalsView::Strong
                } else if f.contains("weak") || f.contains("poor") {
                    FundamentalsView::Weak
                } else if f.contains("moderate") || f.contains("average") || f.contains("mixed") {
                    FundamentalsView::Moderate
                } else {
                    FundamentalsView::Unknown
                }
            }
            None => FundamentalsView::Unknown,
        };

        let risk = match text(&["risk_assessment", "risk"]) {
            Some(r) => {
                let r = r.to_lowercase();
                if r.contains("outweigh") || r.contains("high") || r.contains("unacceptable") {
                    RiskView::OutweighsReturn
                } else if r.contains("manageable") || r.contains("low") {
                    RiskView::Manageable
                } else if r.contains("balanced") || r.contains("moderate") {
                    RiskView::Balanced
                } else {
                    RiskView::Unknown
                }
            }
            None => RiskView::Unknown,
        };

        Self {
            recommendation,
            confidence: text(&["confidence"]).and_then(|c| ConfidenceTier::parse(&c)),
            probability: text(&["probability_of_return_threshold", "probability_40pct_return"])
                .and_then(|p| ConfidenceTier::parse(&p)),
            expected_return: text(&["expected_return", "expected_return_3y"])
                .unwrap_or_else(|| "N/A".to_string()),
            fundamentals,
            risk,
            red_flags: red_flags(value.get("red_flags_found")),
            financial_concerns: meaningful_strings(value.get("financial_concerns")),
            key_drivers: meaningful_strings(value.get("key_drivers")),
            key_risks: meaningful_strings(value.get("key_risks")),
            reasoning: text(&["reasoning"]).unwrap_or_default(),
        }
    }
}

/// Placeholder entries that mean "nothing found".
fn is_placeholder(text: &str) -> bool {
    let t = text.trim().trim_end_matches('.').to_lowercase();
    matches!(
        t.as_str(),
        "" | "none" | "n/a" | "na" | "nil" | "-" | "no red flags" | "no red flags found" | "none found"
    )
}

fn meaningful_strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !is_placeholder(s))
                .map(|s| s.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Strings, or `{category, description, resolved}` objects.
fn red_flags(value: Option<&Value>) -> Vec<SemanticRedFlag> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let (label, description, resolved) = match item {
                Value::String(s) => (None, s.trim().to_string(), false),
                Value::Object(map) => (
                    map.get("category").and_then(Value::as_str),
                    map.get("description")
                        .or_else(|| map.get("flag"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    map.get("resolved").and_then(Value::as_bool).unwrap_or(false),
                ),
                _ => return None,
            };

            if is_placeholder(&description) && label.is_none() {
                return None;
            }

            let derived = RedFlagCategory::classify(&format!("{} {}", label.unwrap_or(""), description));
            let category = label
                .and_then(RedFlagCategory::parse_label)
                .map_or(derived, |labelled| labelled.more_severe(derived));

            Some(SemanticRedFlag {
                category,
                description,
                resolved,
            })
        })
        .collect()
}

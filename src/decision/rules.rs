//! Deterministic red-flag rules over the numeric financial inputs.
//!
//! Every rule reports one of three outcomes. A metric that was not supplied
//! is `Missing`, which blocks BUY as incomplete evidence but is not itself
//! a red flag.

use crate::models::{FinancialInputs, RuleFinding, RuleStatus};

pub trait RedFlagRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, inputs: &FinancialInputs) -> RuleFinding;
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    /// Flag when the value is strictly below the threshold.
    Below(f64),
    /// Flag when the value is strictly above the threshold.
    Above(f64),
}

/// Single-metric threshold rule.
pub struct ThresholdRule {
    name: &'static str,
    label: &'static str,
    unit: &'static str,
    bound: Bound,
    metric: fn(&FinancialInputs) -> Option<f64>,
}

impl ThresholdRule {
    fn finding(&self, status: RuleStatus, details: String) -> RuleFinding {
        RuleFinding {
            rule_name: self.name.to_string(),
            status,
            details,
        }
    }
}

impl RedFlagRule for ThresholdRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, inputs: &FinancialInputs) -> RuleFinding {
        let Some(value) = (self.metric)(inputs) else {
            return self.finding(RuleStatus::Missing, format!("{} not provided", self.label));
        };

        let (triggered, relation, threshold) = match self.bound {
            Bound::Below(t) => (value < t, "below", t),
            Bound::Above(t) => (value > t, "above", t),
        };

        if triggered {
            self.finding(
                RuleStatus::Triggered,
                format!(
                    "{} {}{} is {} {}{}",
                    self.label, value, self.unit, relation, threshold, self.unit
                ),
            )
        } else {
            self.finding(
                RuleStatus::Clear,
                format!("{} {}{} within limit", self.label, value, self.unit),
            )
        }
    }
}

/// The fixed rule table, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn RedFlagRule>> {
    vec![
        Box::new(ThresholdRule {
            name: "promoter_holding_below_50",
            label: "Promoter holding",
            unit: "%",
            bound: Bound::Below(50.0),
            metric: |f| f.promoter_holding_pct,
        }),
        Box::new(ThresholdRule {
            name: "fii_holding_declining",
            label: "Change in FII holding",
            unit: "%",
            bound: Bound::Below(0.0),
            metric: |f| f.fii_holding_change_pct,
        }),
        Box::new(ThresholdRule {
            name: "dii_holding_declining",
            label: "Change in DII holding",
            unit: "%",
            bound: Bound::Below(0.0),
            metric: |f| f.dii_holding_change_pct,
        }),
        Box::new(ThresholdRule {
            name: "debt_to_equity_above_1",
            label: "Debt/Equity",
            unit: "",
            bound: Bound::Above(1.0),
            metric: |f| f.debt_to_equity,
        }),
        Box::new(ThresholdRule {
            name: "negative_free_cash_flow",
            label: "Free cash flow (3Y)",
            unit: " Cr",
            bound: Bound::Below(0.0),
            metric: |f| f.free_cash_flow_3y,
        }),
        Box::new(ThresholdRule {
            name: "working_capital_days_above_90",
            label: "Working capital days",
            unit: "",
            bound: Bound::Above(90.0),
            metric: |f| f.working_capital_days,
        }),
        Box::new(ThresholdRule {
            name: "cash_conversion_cycle_above_90",
            label: "Cash conversion cycle days",
            unit: "",
            bound: Bound::Above(90.0),
            metric: |f| f.cash_conversion_cycle_days,
        }),
    ]
}

pub fn evaluate_all(rules: &[Box<dyn RedFlagRule>], inputs: &FinancialInputs) -> Vec<RuleFinding> {
    rules.iter().map(|rule| rule.evaluate(inputs)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> FinancialInputs {
        FinancialInputs {
            promoter_holding_pct: Some(62.0),
            fii_holding_change_pct: Some(0.8),
            dii_holding_change_pct: Some(0.3),
            debt_to_equity: Some(0.2),
            free_cash_flow_3y: Some(850.0),
            working_capital_days: Some(45.0),
            cash_conversion_cycle_days: Some(30.0),
            ..Default::default()
        }
    }

    fn status_of(findings: &[RuleFinding], name: &str) -> RuleStatus {
        findings
            .iter()
            .find(|f| f.rule_name == name)
            .map(|f| f.status)
            .unwrap()
    }

    #[test]
    fn test_healthy_inputs_clear_every_rule() {
        let findings = evaluate_all(&default_rules(), &healthy());
        assert_eq!(findings.len(), 7);
        assert!(findings.iter().all(|f| f.status == RuleStatus::Clear));
    }

    #[test]
    fn test_each_threshold_triggers() {
        let inputs = FinancialInputs {
            promoter_holding_pct: Some(40.0),
            fii_holding_change_pct: Some(-0.1),
            dii_holding_change_pct: Some(-2.0),
            debt_to_equity: Some(1.5),
            free_cash_flow_3y: Some(-10.0),
            working_capital_days: Some(120.0),
            cash_conversion_cycle_days: Some(95.0),
            ..Default::default()
        };
        let findings = evaluate_all(&default_rules(), &inputs);
        assert!(findings.iter().all(|f| f.status == RuleStatus::Triggered));

        let promoter = findings.iter().find(|f| f.rule_name == "promoter_holding_below_50").unwrap();
        assert_eq!(promoter.details, "Promoter holding 40% is below 50%");
    }

    #[test]
    fn test_thresholds_are_strict() {
        let inputs = FinancialInputs {
            promoter_holding_pct: Some(50.0),
            fii_holding_change_pct: Some(0.0),
            debt_to_equity: Some(1.0),
            working_capital_days: Some(90.0),
            ..healthy()
        };
        let findings = evaluate_all(&default_rules(), &inputs);
        assert_eq!(status_of(&findings, "promoter_holding_below_50"), RuleStatus::Clear);
        assert_eq!(status_of(&findings, "fii_holding_declining"), RuleStatus::Clear);
        assert_eq!(status_of(&findings, "debt_to_equity_above_1"), RuleStatus::Clear);
        assert_eq!(status_of(&findings, "working_capital_days_above_90"), RuleStatus::Clear);
    }

    #[test]
    fn test_absent_metric_is_missing_not_clear() {
        let inputs = FinancialInputs {
            free_cash_flow_3y: None,
            ..healthy()
        };
        let findings = evaluate_all(&default_rules(), &inputs);
        assert_eq!(status_of(&findings, "negative_free_cash_flow"), RuleStatus::Missing);
    }
}

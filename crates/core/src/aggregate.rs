//! Turns a trigger plus its expert findings and risk assessment into a
//! single actionable diagnosis.

use crate::domain::diagnosis::{
    ActionLevel, Confidence, Diagnosis, Finding, RiskAssessment, RiskStatus, Severity, Trigger,
};
use crate::experts::evaluators;

/// Root-cause phrasing per expert. Experts without a mapping contribute
/// findings but never the headline.
fn root_cause_for(expert: &str) -> Option<&'static str> {
    match expert {
        evaluators::SEARCH_QUALITY => Some("traffic quality decline"),
        evaluators::PRODUCT_SHELF => Some("structural margin issue"),
        evaluators::CHANNEL_MIX => Some("channel washing/subsidy"),
        evaluators::GEO => Some("geographic blackhole"),
        evaluators::KEYWORD => Some("core-term leakage"),
        _ => None,
    }
}

const NO_RULE_MATCHED: &str = "macro efficiency fluctuation (no rule matched)";

pub fn aggregate(
    trigger: Trigger,
    findings: Vec<Finding>,
    risk: RiskAssessment,
    coverage: f64,
) -> Diagnosis {
    let mut causes: Vec<&'static str> = Vec::new();
    for f in &findings {
        if let Some(cause) = root_cause_for(&f.expert) {
            if !causes.contains(&cause) {
                causes.push(cause);
            }
        }
    }
    let root_cause = if causes.is_empty() {
        NO_RULE_MATCHED.to_string()
    } else {
        causes.join(" & ")
    };

    let confidence = if findings.iter().any(|f| f.severity == Severity::High) {
        Confidence::High
    } else if !findings.is_empty() {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    let action_level = match risk.status {
        RiskStatus::Block => ActionLevel::RiskBlocked,
        RiskStatus::Mark => ActionLevel::FlagForObservation,
        RiskStatus::Pass => {
            if findings.iter().any(|f| f.severity == Severity::High) {
                ActionLevel::Immediate
            } else if !findings.is_empty() {
                ActionLevel::Investigate
            } else {
                ActionLevel::Observe
            }
        }
    };

    Diagnosis {
        entity_id: trigger.entity_id.clone(),
        root_cause,
        confidence,
        action_level,
        findings,
        risk,
        trigger,
        coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnosis::Dimension;
    use crate::domain::metrics::EntityKind;
    use chrono::NaiveDate;

    fn trigger() -> Trigger {
        Trigger {
            entity_id: "c1".to_string(),
            kind: EntityKind::Campaign,
            name: Some("Spring Push".to_string()),
            entity_type: Some("SEARCH".to_string()),
            target_date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            growth_rate: -0.4,
            current_conv: 3.0,
            prev_conv: 5.0,
            curr_roas: 1.0,
            prev_roas: 2.0,
            curr_cpa: 50.0,
            prev_cpa: 25.0,
            cost_impact: 150.0,
            reason_text: "ROAS declined".to_string(),
            suggested: vec![Dimension::SearchTerm, Dimension::Keyword],
        }
    }

    fn finding(expert: &str, severity: Severity) -> Finding {
        Finding {
            expert: expert.to_string(),
            issue: "test issue".to_string(),
            severity,
            evidence: "test evidence".to_string(),
            suggestion: "test suggestion".to_string(),
        }
    }

    #[test]
    fn no_findings_yields_fallback_cause_and_observe() {
        let d = aggregate(trigger(), Vec::new(), RiskAssessment::pass(), 1.0);
        assert_eq!(d.root_cause, NO_RULE_MATCHED);
        assert_eq!(d.confidence, Confidence::Low);
        assert_eq!(d.action_level, ActionLevel::Observe);
    }

    #[test]
    fn confidence_is_high_iff_any_finding_is_high() {
        let medium_only = aggregate(
            trigger(),
            vec![
                finding(evaluators::SEARCH_QUALITY, Severity::Medium),
                finding(evaluators::CHANNEL_MIX, Severity::Low),
            ],
            RiskAssessment::pass(),
            1.0,
        );
        assert_eq!(medium_only.confidence, Confidence::Medium);
        assert_eq!(medium_only.action_level, ActionLevel::Investigate);

        let with_high = aggregate(
            trigger(),
            vec![
                finding(evaluators::SEARCH_QUALITY, Severity::Medium),
                finding(evaluators::GEO, Severity::High),
            ],
            RiskAssessment::pass(),
            1.0,
        );
        assert_eq!(with_high.confidence, Confidence::High);
        assert_eq!(with_high.action_level, ActionLevel::Immediate);
    }

    #[test]
    fn confidence_is_order_independent_across_permutations() {
        let base = [
            finding(evaluators::SEARCH_QUALITY, Severity::Medium),
            finding(evaluators::GEO, Severity::High),
            finding(evaluators::CHANNEL_MIX, Severity::Low),
        ];
        const ORDERS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in ORDERS {
            let findings: Vec<Finding> = order.iter().map(|&i| base[i].clone()).collect();
            let d = aggregate(trigger(), findings, RiskAssessment::pass(), 1.0);
            assert_eq!(d.confidence, Confidence::High);

            let without_high: Vec<Finding> = order
                .iter()
                .map(|&i| base[i].clone())
                .filter(|f| f.severity != Severity::High)
                .collect();
            let d = aggregate(trigger(), without_high, RiskAssessment::pass(), 1.0);
            assert_eq!(d.confidence, Confidence::Medium);
        }
    }

    #[test]
    fn root_causes_dedupe_and_preserve_finding_order() {
        let d = aggregate(
            trigger(),
            vec![
                finding(evaluators::GEO, Severity::High),
                finding(evaluators::SEARCH_QUALITY, Severity::Medium),
                finding(evaluators::GEO, Severity::High),
            ],
            RiskAssessment::pass(),
            1.0,
        );
        assert_eq!(d.root_cause, "geographic blackhole & traffic quality decline");
    }

    #[test]
    fn demographic_findings_never_set_the_headline() {
        let d = aggregate(
            trigger(),
            vec![finding(evaluators::DEMOGRAPHIC, Severity::Medium)],
            RiskAssessment::pass(),
            1.0,
        );
        assert_eq!(d.root_cause, NO_RULE_MATCHED);
        assert_eq!(d.confidence, Confidence::Medium);
    }

    #[test]
    fn marked_risk_forces_observation_even_with_high_findings() {
        let mut risk = RiskAssessment::pass();
        risk.escalate(RiskStatus::Mark, "promotion window".to_string());
        let d = aggregate(
            trigger(),
            vec![finding(evaluators::KEYWORD, Severity::High)],
            risk,
            1.0,
        );
        assert_eq!(d.action_level, ActionLevel::FlagForObservation);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn blocked_risk_outranks_everything() {
        let mut risk = RiskAssessment::pass();
        risk.escalate(RiskStatus::Block, "cold start".to_string());
        let d = aggregate(
            trigger(),
            vec![finding(evaluators::GEO, Severity::High)],
            risk,
            0.5,
        );
        assert_eq!(d.action_level, ActionLevel::RiskBlocked);
        assert!((d.coverage - 0.5).abs() < f64::EPSILON);
    }
}

pub mod evaluators;

use crate::config::RuleConfig;
use crate::domain::diagnosis::{Dimension, Finding};
use crate::store::MetricStore;
use chrono::NaiveDate;

/// One deterministic per-dimension evaluator. Pure over its dimension slice:
/// same store contents, same findings. Evaluators never consult each other.
#[async_trait::async_trait]
pub trait Expert: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> Dimension;

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>>;
}

/// Outcome of running the selected evaluators for one entity.
#[derive(Debug, Default)]
pub struct EngineOutcome {
    pub findings: Vec<Finding>,
    /// Evaluators the detector selected for this entity.
    pub selected: usize,
    /// Evaluators that completed without error.
    pub ran: usize,
}

impl EngineOutcome {
    /// Trace-only coverage indicator; never feeds the verdict.
    pub fn coverage(&self) -> f64 {
        if self.selected == 0 {
            1.0
        } else {
            self.ran as f64 / self.selected as f64
        }
    }
}

/// Registry mapping dimension keys to typed evaluators.
pub struct ExpertRegistry {
    experts: Vec<Box<dyn Expert>>,
}

impl ExpertRegistry {
    pub fn new(experts: Vec<Box<dyn Expert>>) -> Self {
        Self { experts }
    }

    /// The full default bank wired from the rule thresholds.
    pub fn with_defaults(rules: &RuleConfig) -> Self {
        Self::new(evaluators::default_bank(rules))
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }

    /// Run the evaluators matching the suggested dimensions. Each one is
    /// isolated: a failing rule is logged and skipped, never suppressing the
    /// other rules' findings.
    pub async fn evaluate_selected(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
        dimensions: &[Dimension],
    ) -> EngineOutcome {
        let mut outcome = EngineOutcome::default();
        for expert in self
            .experts
            .iter()
            .filter(|e| dimensions.contains(&e.dimension()))
        {
            outcome.selected += 1;
            match expert.evaluate(store, entity_id, target_date).await {
                Ok(findings) => {
                    outcome.ran += 1;
                    outcome.findings.extend(findings);
                }
                Err(err) => {
                    tracing::warn!(
                        entity = entity_id,
                        expert = expert.name(),
                        error = %err,
                        "expert evaluator failed; continuing with the rest"
                    );
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnosis::Severity;
    use crate::store::MemoryStore;

    struct FixedExpert {
        name: &'static str,
        dimension: Dimension,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Expert for FixedExpert {
        fn name(&self) -> &'static str {
            self.name
        }

        fn dimension(&self) -> Dimension {
            self.dimension
        }

        async fn evaluate(
            &self,
            _store: &dyn MetricStore,
            _entity_id: &str,
            _target_date: NaiveDate,
        ) -> anyhow::Result<Vec<Finding>> {
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(vec![Finding {
                expert: self.name.to_string(),
                issue: "issue".to_string(),
                severity: Severity::Low,
                evidence: "evidence".to_string(),
                suggestion: "suggestion".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn one_failing_rule_does_not_suppress_others() {
        let registry = ExpertRegistry::new(vec![
            Box::new(FixedExpert {
                name: "a",
                dimension: Dimension::Geo,
                fail: true,
            }),
            Box::new(FixedExpert {
                name: "b",
                dimension: Dimension::Age,
                fail: false,
            }),
        ]);

        let store = MemoryStore::new();
        let target = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let outcome = registry
            .evaluate_selected(&store, "c1", target, &[Dimension::Geo, Dimension::Age])
            .await;

        assert_eq!(outcome.selected, 2);
        assert_eq!(outcome.ran, 1);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].expert, "b");
        assert!((outcome.coverage() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unselected_dimensions_do_not_run() {
        let registry = ExpertRegistry::new(vec![Box::new(FixedExpert {
            name: "a",
            dimension: Dimension::Geo,
            fail: false,
        })]);

        let store = MemoryStore::new();
        let target = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let outcome = registry
            .evaluate_selected(&store, "c1", target, &[Dimension::Channel])
            .await;

        assert_eq!(outcome.selected, 0);
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.coverage(), 1.0);
    }
}

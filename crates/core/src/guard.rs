use crate::config::GuardConfig;
use crate::domain::diagnosis::{RiskAssessment, RiskStatus};
use crate::store::MetricStore;
use chrono::{Duration, NaiveDate};

/// Risk overlay over the raw anomaly signal. Business constraints (promotions,
/// repricing cooldowns, cold start, learning phase) downgrade or block action
/// recommendations. Assessment never fails: a store error degrades to PASS
/// with a warning log, and absent data is simply no risk.
pub struct ContextGuard<'a> {
    cfg: &'a GuardConfig,
}

impl<'a> ContextGuard<'a> {
    pub fn new(cfg: &'a GuardConfig) -> Self {
        Self { cfg }
    }

    pub async fn assess(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> RiskAssessment {
        let mut risk = RiskAssessment::pass();

        self.check_promotions(&mut risk, target_date);
        self.check_repricing(&mut risk, store, entity_id, target_date).await;
        self.check_lifecycle(&mut risk, store, entity_id, target_date).await;

        risk
    }

    fn check_promotions(&self, risk: &mut RiskAssessment, target_date: NaiveDate) {
        for window in &self.cfg.promotion_windows {
            let lead_up_start = window.start - Duration::days(self.cfg.lead_up_days);
            if window.contains(target_date) {
                risk.escalate(
                    RiskStatus::Mark,
                    format!(
                        "promotion window ({} to {}): protection active, observe only",
                        window.start, window.end
                    ),
                );
            } else if lead_up_start <= target_date && target_date < window.start {
                risk.escalate(
                    RiskStatus::Mark,
                    format!(
                        "promotion lead-up (starts {}): data may swing, tag only",
                        window.start
                    ),
                );
            }
        }
    }

    async fn check_repricing(
        &self,
        risk: &mut RiskAssessment,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) {
        let budgets = match store
            .budget_history(entity_id, target_date, self.cfg.repricing_window_days)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(entity = entity_id, error = %err, "budget history unavailable; skipping repricing check");
                return;
            }
        };
        if budgets.len() < 2 {
            return;
        }

        // Distinct budget values over the window; bit-compare to avoid float
        // equality pitfalls on identical stored values.
        let mut distinct: Vec<u64> = budgets
            .iter()
            .filter_map(|b| b.budget)
            .map(f64::to_bits)
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 1 {
            risk.escalate(
                RiskStatus::Mark,
                "repricing cooldown: budget changed within the last 72 hours, data not yet stable",
            );
        }
    }

    async fn check_lifecycle(
        &self,
        risk: &mut RiskAssessment,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) {
        let stats = match store.lifetime_stats(entity_id, target_date).await {
            Ok(Some(stats)) => stats,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(entity = entity_id, error = %err, "lifetime stats unavailable; skipping lifecycle check");
                return;
            }
        };

        let age_days = (target_date - stats.first_date).num_days();
        if age_days < self.cfg.cold_start_days {
            risk.escalate(
                RiskStatus::Block,
                format!(
                    "cold start: live for only {} days (under {}), cut/cancel recommendations suppressed",
                    age_days + 1,
                    self.cfg.cold_start_days
                ),
            );
        } else if stats.total_conversions < self.cfg.learning_conversion_floor {
            risk.note(format!(
                "learning phase: cumulative conversions {:.0} below {:.0}, audience model still settling",
                stats.total_conversions, self.cfg.learning_conversion_floor
            ));
        }
    }
}

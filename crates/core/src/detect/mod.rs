pub mod rolling;

use crate::config::DetectorConfig;
use crate::domain::diagnosis::{Dimension, Trigger};
use crate::error::AuditError;
use crate::domain::metrics::{EntityKind, EntitySeries};
use crate::store::MetricStore;
use chrono::NaiveDate;
use rolling::{DayRecord, MetricLabels, RollingConfig, CTR_CPC, ROAS_CPA};

/// Scan every entity of `kind` for the target date and return raw triggers.
/// `target_date = None` resolves to the latest date present in the store.
/// Returns the resolved date alongside; `None` means the store had no data.
pub async fn scan(
    store: &dyn MetricStore,
    cfg: &DetectorConfig,
    kind: EntityKind,
    target_date: Option<NaiveDate>,
) -> anyhow::Result<(Option<NaiveDate>, Vec<Trigger>)> {
    let target = match target_date {
        Some(d) => d,
        None => match store.latest_date(kind).await? {
            Some(d) => d,
            None => return Ok((None, Vec::new())),
        },
    };

    let all_series = store.series(kind, target, cfg.lookback_days).await?;

    let rolling_cfg = RollingConfig {
        drop_ratio: cfg.drop_ratio,
        rise_ratio: cfg.rise_ratio,
        check_days: cfg.check_days,
        history_days: cfg.history_days,
        growth_offset_days: cfg.growth_offset_days,
    };

    let mut triggers = Vec::new();
    for series in &all_series {
        if series.len() < cfg.min_history_days {
            let skip = AuditError::data_unavailable(
                &series.entity_id,
                format!("{} days of history, need {}", series.len(), cfg.min_history_days),
            );
            tracing::debug!(reason = %skip, "skipping entity");
            continue;
        }

        if let Some(trigger) = evaluate_entity(series, target, &rolling_cfg) {
            triggers.push(trigger);
        }
    }

    tracing::info!(
        %target,
        kind = kind.as_str(),
        scanned = all_series.len(),
        triggered = triggers.len(),
        "anomaly scan complete"
    );
    Ok((Some(target), triggers))
}

fn evaluate_entity(
    series: &EntitySeries,
    target: NaiveDate,
    cfg: &RollingConfig,
) -> Option<Trigger> {
    let (days, labels): (Vec<DayRecord>, &MetricLabels) = match series.kind {
        EntityKind::Campaign => (
            series
                .points
                .iter()
                .map(|p| DayRecord {
                    date: p.date,
                    quality: p.roas(),
                    unit_cost: p.cpa(),
                    volume: p.conversions,
                    cost: p.cost,
                })
                .collect(),
            &ROAS_CPA,
        ),
        EntityKind::Product => (
            series
                .points
                .iter()
                .map(|p| DayRecord {
                    date: p.date,
                    quality: p.ctr(),
                    unit_cost: p.cpc(),
                    volume: p.clicks,
                    cost: p.cost,
                })
                .collect(),
            &CTR_CPC,
        ),
    };

    let out = rolling::evaluate(&days, target, cfg, labels)?;

    Some(Trigger {
        entity_id: series.entity_id.clone(),
        kind: series.kind,
        name: series.name.clone(),
        entity_type: series.entity_type.clone(),
        target_date: target,
        growth_rate: out.growth_rate,
        current_conv: out.current_volume,
        prev_conv: out.prev_volume,
        curr_roas: out.curr_quality,
        prev_roas: out.prev_quality,
        curr_cpa: out.curr_unit_cost,
        prev_cpa: out.prev_unit_cost,
        cost_impact: out.cost_impact,
        reason_text: out.reason_text,
        suggested: suggested_dimensions(series.kind, series.entity_type.as_deref()),
    })
}

/// Coarse routing: which expert dimensions are worth running for this entity.
pub fn suggested_dimensions(kind: EntityKind, entity_type: Option<&str>) -> Vec<Dimension> {
    if kind == EntityKind::Product {
        return vec![Dimension::ProductShelf];
    }

    let ty = entity_type.unwrap_or("").to_ascii_lowercase();
    if ty.contains("search") {
        vec![
            Dimension::SearchTerm,
            Dimension::Keyword,
            Dimension::Age,
            Dimension::Gender,
        ]
    } else if ty.contains("pmax") || ty.contains("performance max") {
        vec![Dimension::Channel, Dimension::ProductShelf, Dimension::Geo]
    } else {
        vec![Dimension::Age, Dimension::Gender, Dimension::Geo]
    }
}

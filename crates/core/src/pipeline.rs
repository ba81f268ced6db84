//! Full scan orchestration: detect, guard, evaluate, aggregate.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::config::AuditConfig;
use crate::detect;
use crate::domain::diagnosis::{Diagnosis, ScanReport, ScanStatus, Trigger};
use crate::domain::metrics::EntityKind;
use crate::error::AuditError;
use crate::experts::ExpertRegistry;
use crate::guard::ContextGuard;
use crate::store::MetricStore;

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AuditError>()
        .map(AuditError::is_transient)
        .unwrap_or(false)
}

/// Run one full scan for `kind`. `target_date = None` resolves to the
/// latest date in the store. A transient detector failure is retried once
/// before it becomes fatal.
pub async fn run_scan(
    store: Arc<dyn MetricStore>,
    cfg: &AuditConfig,
    kind: EntityKind,
    target_date: Option<NaiveDate>,
) -> anyhow::Result<ScanReport> {
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, kind = kind.as_str(), "starting scan");

    // An explicitly requested date outside the analyzable range is "no data",
    // not an all-clear.
    if let Some(requested) = target_date {
        let in_range = match store.date_range(kind).await? {
            Some((min, max)) => min <= requested && requested <= max,
            None => false,
        };
        if !in_range {
            tracing::warn!(%requested, kind = kind.as_str(), "requested date outside the analyzable range");
            return Ok(ScanReport {
                run_id,
                kind,
                target_date: Some(requested),
                status: ScanStatus::NoData,
                generated_at: Utc::now(),
                diagnoses: Vec::new(),
                skipped: Vec::new(),
            });
        }
    }

    let (target, triggers) =
        match detect::scan(store.as_ref(), &cfg.detector, kind, target_date).await {
            Ok(v) => v,
            Err(err) if is_transient(&err) => {
                tracing::warn!(error = %err, "detector scan failed; retrying once");
                detect::scan(store.as_ref(), &cfg.detector, kind, target_date).await?
            }
            Err(err) => return Err(err),
        };

    let Some(target) = target else {
        tracing::warn!(kind = kind.as_str(), "no data available for scan");
        return Ok(ScanReport {
            run_id,
            kind,
            target_date: None,
            status: ScanStatus::NoData,
            generated_at: Utc::now(),
            diagnoses: Vec::new(),
            skipped: Vec::new(),
        });
    };

    let (diagnoses, skipped) = diagnose_all(store, cfg, triggers).await;

    let status = if diagnoses.is_empty() {
        ScanStatus::Clear
    } else {
        ScanStatus::Anomalies
    };
    tracing::info!(
        %run_id,
        %target,
        anomalies = diagnoses.len(),
        skipped = skipped.len(),
        "scan complete"
    );

    Ok(ScanReport {
        run_id,
        kind,
        target_date: Some(target),
        status,
        generated_at: Utc::now(),
        diagnoses,
        skipped,
    })
}

/// Diagnose every trigger under the configured concurrency cap. An entity
/// whose task fails is skipped, never the whole scan.
async fn diagnose_all(
    store: Arc<dyn MetricStore>,
    cfg: &AuditConfig,
    triggers: Vec<Trigger>,
) -> (Vec<Diagnosis>, Vec<String>) {
    let cfg = Arc::new(cfg.clone());
    let registry = Arc::new(ExpertRegistry::with_defaults(&cfg.rules));
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency));

    let mut handles = Vec::with_capacity(triggers.len());
    for trigger in triggers {
        let entity_id = trigger.entity_id.clone();
        let store = Arc::clone(&store);
        let cfg = Arc::clone(&cfg);
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            Ok::<Diagnosis, anyhow::Error>(diagnose_one(&store, &cfg, &registry, trigger).await)
        });
        handles.push((entity_id, handle));
    }

    let mut diagnoses = Vec::new();
    let mut skipped = Vec::new();
    for (entity_id, handle) in handles {
        match handle.await {
            Ok(Ok(diagnosis)) => diagnoses.push(diagnosis),
            Ok(Err(err)) => {
                tracing::error!(entity = %entity_id, error = %err, "diagnosis failed; skipping entity");
                skipped.push(entity_id);
            }
            Err(err) => {
                tracing::error!(entity = %entity_id, error = %err, "diagnosis task panicked; skipping entity");
                skipped.push(entity_id);
            }
        }
    }

    // Worst offenders first: spend at risk, then a stable id tiebreak.
    diagnoses.sort_by(|a, b| {
        b.trigger
            .cost_impact
            .partial_cmp(&a.trigger.cost_impact)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });

    (diagnoses, skipped)
}

async fn diagnose_one(
    store: &Arc<dyn MetricStore>,
    cfg: &AuditConfig,
    registry: &ExpertRegistry,
    trigger: Trigger,
) -> Diagnosis {
    let guard = ContextGuard::new(&cfg.guard);
    let risk = guard
        .assess(store.as_ref(), &trigger.entity_id, trigger.target_date)
        .await;

    let outcome = registry
        .evaluate_selected(
            store.as_ref(),
            &trigger.entity_id,
            trigger.target_date,
            &trigger.suggested,
        )
        .await;
    let coverage = outcome.coverage();

    aggregate(trigger, outcome.findings, risk, coverage)
}

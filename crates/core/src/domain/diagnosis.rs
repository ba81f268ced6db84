use crate::domain::metrics::EntityKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auxiliary dimension tables an expert evaluator may consume. Doubles as the
/// routing key the detector attaches to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    SearchTerm,
    Keyword,
    Channel,
    ProductShelf,
    Age,
    Gender,
    Geo,
}

/// Business severity of a single finding. The derive order is the total
/// order: LOW < MEDIUM < HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Risk overlay status, most restrictive last: PASS < MARK < BLOCK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskStatus {
    Pass,
    Mark,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub status: RiskStatus,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    pub fn pass() -> Self {
        Self {
            status: RiskStatus::Pass,
            reasons: Vec::new(),
        }
    }

    /// Raise the status if the new one is more restrictive; reasons always
    /// accumulate.
    pub fn escalate(&mut self, status: RiskStatus, reason: impl Into<String>) {
        self.status = self.status.max(status);
        self.reasons.push(reason.into());
    }

    /// Add a reason without touching the status (learning-phase notes).
    pub fn note(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    pub fn label(&self) -> &'static str {
        match self.status {
            RiskStatus::Block => "Protected (Tag Only)",
            RiskStatus::Mark => "Warning (Observing)",
            RiskStatus::Pass => "Critical",
        }
    }
}

/// Raw anomaly signal emitted by the detector, before risk adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub entity_id: String,
    pub kind: EntityKind,
    pub name: Option<String>,
    pub entity_type: Option<String>,
    pub target_date: NaiveDate,
    pub growth_rate: f64,
    pub current_conv: f64,
    pub prev_conv: f64,
    pub curr_roas: f64,
    pub prev_roas: f64,
    pub curr_cpa: f64,
    pub prev_cpa: f64,
    /// Summed cost over the current 3-day window; ordering key for reports.
    pub cost_impact: f64,
    pub reason_text: String,
    pub suggested: Vec<Dimension>,
}

/// One deterministic rule's output for one entity/date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub expert: String,
    pub issue: String,
    pub severity: Severity,
    pub evidence: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "high (core rule matched)",
            Self::Medium => "medium (observable pattern)",
            Self::Low => "low (trend signal only)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLevel {
    RiskBlocked,
    FlagForObservation,
    Immediate,
    Investigate,
    Observe,
}

impl ActionLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RiskBlocked => "risk-blocked, tag only",
            Self::FlagForObservation => "flag for observation",
            Self::Immediate => "immediate optimization",
            Self::Investigate => "investigate further",
            Self::Observe => "observe only",
        }
    }
}

/// Final, risk-adjusted, rule-annotated verdict for one entity. Render-ready:
/// every comparison is already resolved into evidence text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub entity_id: String,
    pub root_cause: String,
    pub confidence: Confidence,
    pub action_level: ActionLevel,
    pub findings: Vec<Finding>,
    pub risk: RiskAssessment,
    pub trigger: Trigger,
    /// Fraction of selected evaluators that actually ran. Trace only; never
    /// feeds confidence or action level.
    pub coverage: f64,
}

/// Outcome status of a whole scan. `NoData` is distinct from a genuine
/// all-clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    NoData,
    Clear,
    Anomalies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub kind: EntityKind,
    pub target_date: Option<NaiveDate>,
    pub status: ScanStatus,
    pub generated_at: DateTime<Utc>,
    pub diagnoses: Vec<Diagnosis>,
    /// Entities whose diagnosis task did not complete (panic or runtime
    /// shutdown). Store errors never land here: the guard degrades to PASS
    /// and evaluators are isolated individually.
    pub skipped: Vec<String>,
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Campaign,
    Product,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::Product => "product",
        }
    }
}

/// One entity-day of raw metrics as delivered by the ingestion collaborator.
/// Immutable once ingested; efficiency metrics are derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub entity_id: String,
    pub date: NaiveDate,
    pub cost: f64,
    pub conversions: f64,
    pub conv_value: f64,
    pub clicks: f64,
    pub impressions: f64,
}

impl MetricPoint {
    /// Return on ad spend. Zero when there is no spend to divide by, which the
    /// detector's `avg > 0` guards then treat as "no signal".
    pub fn roas(&self) -> f64 {
        if self.cost > 0.0 {
            self.conv_value / self.cost
        } else {
            0.0
        }
    }

    pub fn cpa(&self) -> f64 {
        if self.conversions > 0.0 {
            self.cost / self.conversions
        } else {
            0.0
        }
    }

    pub fn ctr(&self) -> f64 {
        if self.impressions > 0.0 {
            self.clicks / self.impressions
        } else {
            0.0
        }
    }

    pub fn cpc(&self) -> f64 {
        if self.clicks > 0.0 {
            self.cost / self.clicks
        } else {
            0.0
        }
    }
}

/// Date-ordered series for one entity. Gaps are legitimate: an exact-date
/// lookup that misses means "insufficient data", never zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySeries {
    pub entity_id: String,
    pub kind: EntityKind,
    /// Display name where the id is opaque (product titles).
    pub name: Option<String>,
    /// Coarse type tag used for expert routing ("Search", "Performance Max", ...).
    pub entity_type: Option<String>,
    pub points: Vec<MetricPoint>,
}

impl EntitySeries {
    pub fn new(entity_id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            name: None,
            entity_type: None,
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, point: MetricPoint) {
        self.points.push(point);
        self.points.sort_by_key(|p| p.date);
    }

    pub fn point_on(&self, date: NaiveDate) -> Option<&MetricPoint> {
        self.points.iter().find(|p| p.date == date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub mod memory;
pub mod postgres;

use crate::domain::metrics::{EntityKind, EntitySeries};
use chrono::NaiveDate;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demographic {
    Age,
    Gender,
}

impl Demographic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Gender => "gender",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BudgetEntry {
    pub date: NaiveDate,
    pub budget: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LifetimeStats {
    pub first_date: NaiveDate,
    pub total_conversions: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone)]
pub struct SearchTermRow {
    pub term: String,
    pub match_type: String,
    pub cost: f64,
    pub conversions: f64,
    pub clicks: f64,
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub channel: String,
    pub cost: f64,
    pub conv_value: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone)]
pub struct ProductCostRow {
    pub item_id: String,
    pub title: String,
    pub cost: f64,
    pub clicks: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordRow {
    pub keyword: String,
    pub match_type: String,
    pub cost: f64,
    pub conversions: f64,
    pub conv_value: f64,
}

#[derive(Debug, Clone)]
pub struct SegmentRow {
    pub segment: String,
    pub cost: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone)]
pub struct GeoRow {
    pub location: String,
    pub cost: f64,
    pub conversions: f64,
}

/// Read-only seam to the metric store the ingestion collaborator writes.
/// Every window is inclusive and expressed as (until, trailing days).
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync {
    /// Latest date with any data for the kind; None when the table is empty.
    async fn latest_date(&self, kind: EntityKind) -> anyhow::Result<Option<NaiveDate>>;

    /// Min/max usable dates for the kind (the analyzable range).
    async fn date_range(&self, kind: EntityKind)
        -> anyhow::Result<Option<(NaiveDate, NaiveDate)>>;

    /// All per-entity series with points in `[until - lookback_days, until]`.
    async fn series(
        &self,
        kind: EntityKind,
        until: NaiveDate,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<EntitySeries>>;

    /// Budget values over the trailing window, newest first.
    async fn budget_history(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<BudgetEntry>>;

    /// Lifetime aggregates up to `until`; None when the entity has no data.
    async fn lifetime_stats(
        &self,
        entity_id: &str,
        until: NaiveDate,
    ) -> anyhow::Result<Option<LifetimeStats>>;

    async fn search_terms(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SearchTermRow>>;

    async fn channels(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<ChannelRow>>;

    /// Top spenders across the whole product shelf, cost-descending. The
    /// product table carries no campaign column, so this is account-global.
    async fn top_products(
        &self,
        until: NaiveDate,
        days: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<ProductCostRow>>;

    async fn keywords(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<KeywordRow>>;

    async fn segments(
        &self,
        entity_id: &str,
        demographic: Demographic,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SegmentRow>>;

    async fn locations(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<GeoRow>>;
}

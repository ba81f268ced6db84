use crate::domain::metrics::{EntityKind, EntitySeries, MetricPoint};
use crate::error::AuditError;
use crate::store::{
    BudgetEntry, ChannelRow, Demographic, GeoRow, KeywordRow, LifetimeStats, MetricStore,
    ProductCostRow, SearchTermRow, SegmentRow,
};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Deterministic in-memory store for tests and stub runs. Mirrors the
/// aggregation semantics of the Postgres reader (grouped sums over inclusive
/// trailing windows).
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: Vec<EntitySeries>,
    budgets: HashMap<String, Vec<BudgetEntry>>,
    search_terms: HashMap<String, Vec<(NaiveDate, SearchTermRow)>>,
    channels: HashMap<String, Vec<(NaiveDate, ChannelRow)>>,
    product_costs: Vec<(NaiveDate, ProductCostRow)>,
    keywords: HashMap<String, Vec<(NaiveDate, KeywordRow)>>,
    ages: HashMap<String, Vec<(NaiveDate, SegmentRow)>>,
    genders: HashMap<String, Vec<(NaiveDate, SegmentRow)>>,
    locations: HashMap<String, Vec<(NaiveDate, GeoRow)>>,
    /// Remaining injected failures per trait method, for failure-path tests.
    fail_counts: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_series(&mut self, series: EntitySeries) {
        self.series.push(series);
    }

    pub fn push_point(&mut self, kind: EntityKind, point: MetricPoint) {
        if let Some(series) = self
            .series
            .iter_mut()
            .find(|s| s.kind == kind && s.entity_id == point.entity_id)
        {
            series.push(point);
            return;
        }
        let mut series = EntitySeries::new(point.entity_id.clone(), kind);
        series.push(point);
        self.series.push(series);
    }

    pub fn set_entity_type(&mut self, entity_id: &str, entity_type: &str) {
        for s in self.series.iter_mut().filter(|s| s.entity_id == entity_id) {
            s.entity_type = Some(entity_type.to_string());
        }
    }

    pub fn push_budget(&mut self, entity_id: &str, date: NaiveDate, budget: Option<f64>) {
        self.budgets
            .entry(entity_id.to_string())
            .or_default()
            .push(BudgetEntry { date, budget });
    }

    pub fn push_search_term(&mut self, entity_id: &str, date: NaiveDate, row: SearchTermRow) {
        self.search_terms
            .entry(entity_id.to_string())
            .or_default()
            .push((date, row));
    }

    pub fn push_channel(&mut self, entity_id: &str, date: NaiveDate, row: ChannelRow) {
        self.channels
            .entry(entity_id.to_string())
            .or_default()
            .push((date, row));
    }

    pub fn push_product_cost(&mut self, date: NaiveDate, row: ProductCostRow) {
        self.product_costs.push((date, row));
    }

    pub fn push_keyword(&mut self, entity_id: &str, date: NaiveDate, row: KeywordRow) {
        self.keywords
            .entry(entity_id.to_string())
            .or_default()
            .push((date, row));
    }

    pub fn push_segment(
        &mut self,
        entity_id: &str,
        demographic: Demographic,
        date: NaiveDate,
        row: SegmentRow,
    ) {
        let map = match demographic {
            Demographic::Age => &mut self.ages,
            Demographic::Gender => &mut self.genders,
        };
        map.entry(entity_id.to_string()).or_default().push((date, row));
    }

    pub fn push_location(&mut self, entity_id: &str, date: NaiveDate, row: GeoRow) {
        self.locations
            .entry(entity_id.to_string())
            .or_default()
            .push((date, row));
    }

    /// Make the next `times` calls of the named trait method fail with a
    /// transient `QueryFailure`.
    pub fn inject_failure(&self, method: &str, times: u32) {
        if let Ok(mut counts) = self.fail_counts.lock() {
            counts.insert(method.to_string(), times);
        }
    }

    fn maybe_fail(&self, method: &str) -> anyhow::Result<()> {
        if let Ok(mut counts) = self.fail_counts.lock() {
            if let Some(n) = counts.get_mut(method) {
                if *n > 0 {
                    *n -= 1;
                    return Err(anyhow::Error::new(AuditError::query_failure(format!(
                        "injected failure in {method}"
                    ))));
                }
            }
        }
        Ok(())
    }

    fn in_window(date: NaiveDate, until: NaiveDate, days: i64) -> bool {
        date <= until && date >= until - Duration::days(days)
    }
}

#[async_trait::async_trait]
impl MetricStore for MemoryStore {
    async fn latest_date(&self, kind: EntityKind) -> anyhow::Result<Option<NaiveDate>> {
        self.maybe_fail("latest_date")?;
        Ok(self
            .series
            .iter()
            .filter(|s| s.kind == kind)
            .flat_map(|s| s.points.iter().map(|p| p.date))
            .max())
    }

    async fn date_range(
        &self,
        kind: EntityKind,
    ) -> anyhow::Result<Option<(NaiveDate, NaiveDate)>> {
        self.maybe_fail("date_range")?;
        let dates: Vec<NaiveDate> = self
            .series
            .iter()
            .filter(|s| s.kind == kind)
            .flat_map(|s| s.points.iter().map(|p| p.date))
            .collect();
        Ok(match (dates.iter().min(), dates.iter().max()) {
            (Some(min), Some(max)) => Some((*min, *max)),
            _ => None,
        })
    }

    async fn series(
        &self,
        kind: EntityKind,
        until: NaiveDate,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<EntitySeries>> {
        self.maybe_fail("series")?;
        let mut out = Vec::new();
        for s in self.series.iter().filter(|s| s.kind == kind) {
            let points: Vec<MetricPoint> = s
                .points
                .iter()
                .filter(|p| Self::in_window(p.date, until, lookback_days))
                .cloned()
                .collect();
            if points.is_empty() {
                continue;
            }
            out.push(EntitySeries {
                entity_id: s.entity_id.clone(),
                kind: s.kind,
                name: s.name.clone(),
                entity_type: s.entity_type.clone(),
                points,
            });
        }
        Ok(out)
    }

    async fn budget_history(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<BudgetEntry>> {
        self.maybe_fail("budget_history")?;
        let mut out: Vec<BudgetEntry> = self
            .budgets
            .get(entity_id)
            .map(|rows| {
                rows.iter()
                    .filter(|b| Self::in_window(b.date, until, days))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(out)
    }

    async fn lifetime_stats(
        &self,
        entity_id: &str,
        until: NaiveDate,
    ) -> anyhow::Result<Option<LifetimeStats>> {
        self.maybe_fail("lifetime_stats")?;
        let points: Vec<&MetricPoint> = self
            .series
            .iter()
            .filter(|s| s.entity_id == entity_id)
            .flat_map(|s| s.points.iter())
            .filter(|p| p.date <= until)
            .collect();

        let Some(first_date) = points.iter().map(|p| p.date).min() else {
            return Ok(None);
        };
        Ok(Some(LifetimeStats {
            first_date,
            total_conversions: points.iter().map(|p| p.conversions).sum(),
            total_cost: points.iter().map(|p| p.cost).sum(),
        }))
    }

    async fn search_terms(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SearchTermRow>> {
        self.maybe_fail("search_terms")?;
        let mut grouped: BTreeMap<(String, String), SearchTermRow> = BTreeMap::new();
        for (date, row) in self.search_terms.get(entity_id).into_iter().flatten() {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped
                .entry((row.term.clone(), row.match_type.clone()))
                .or_insert_with(|| SearchTermRow {
                    term: row.term.clone(),
                    match_type: row.match_type.clone(),
                    cost: 0.0,
                    conversions: 0.0,
                    clicks: 0.0,
                });
            entry.cost += row.cost;
            entry.conversions += row.conversions;
            entry.clicks += row.clicks;
        }
        Ok(grouped.into_values().collect())
    }

    async fn channels(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<ChannelRow>> {
        self.maybe_fail("channels")?;
        let mut grouped: BTreeMap<String, ChannelRow> = BTreeMap::new();
        for (date, row) in self.channels.get(entity_id).into_iter().flatten() {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped.entry(row.channel.clone()).or_insert_with(|| ChannelRow {
                channel: row.channel.clone(),
                cost: 0.0,
                conv_value: 0.0,
                conversions: 0.0,
            });
            entry.cost += row.cost;
            entry.conv_value += row.conv_value;
            entry.conversions += row.conversions;
        }
        Ok(grouped.into_values().collect())
    }

    async fn top_products(
        &self,
        until: NaiveDate,
        days: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<ProductCostRow>> {
        self.maybe_fail("top_products")?;
        let mut grouped: BTreeMap<String, ProductCostRow> = BTreeMap::new();
        for (date, row) in &self.product_costs {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped
                .entry(row.item_id.clone())
                .or_insert_with(|| ProductCostRow {
                    item_id: row.item_id.clone(),
                    title: row.title.clone(),
                    cost: 0.0,
                    clicks: 0.0,
                });
            entry.cost += row.cost;
            entry.clicks += row.clicks;
        }
        let mut out: Vec<ProductCostRow> = grouped.into_values().collect();
        out.sort_by(|a, b| {
            b.cost
                .partial_cmp(&a.cost)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn keywords(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<KeywordRow>> {
        self.maybe_fail("keywords")?;
        let mut grouped: BTreeMap<(String, String), KeywordRow> = BTreeMap::new();
        for (date, row) in self.keywords.get(entity_id).into_iter().flatten() {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped
                .entry((row.keyword.clone(), row.match_type.clone()))
                .or_insert_with(|| KeywordRow {
                    keyword: row.keyword.clone(),
                    match_type: row.match_type.clone(),
                    cost: 0.0,
                    conversions: 0.0,
                    conv_value: 0.0,
                });
            entry.cost += row.cost;
            entry.conversions += row.conversions;
            entry.conv_value += row.conv_value;
        }
        Ok(grouped.into_values().collect())
    }

    async fn segments(
        &self,
        entity_id: &str,
        demographic: Demographic,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SegmentRow>> {
        self.maybe_fail("segments")?;
        let map = match demographic {
            Demographic::Age => &self.ages,
            Demographic::Gender => &self.genders,
        };
        let mut grouped: BTreeMap<String, SegmentRow> = BTreeMap::new();
        for (date, row) in map.get(entity_id).into_iter().flatten() {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped.entry(row.segment.clone()).or_insert_with(|| SegmentRow {
                segment: row.segment.clone(),
                cost: 0.0,
                conversions: 0.0,
            });
            entry.cost += row.cost;
            entry.conversions += row.conversions;
        }
        Ok(grouped.into_values().collect())
    }

    async fn locations(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<GeoRow>> {
        self.maybe_fail("locations")?;
        let mut grouped: BTreeMap<String, GeoRow> = BTreeMap::new();
        for (date, row) in self.locations.get(entity_id).into_iter().flatten() {
            if !Self::in_window(*date, until, days) {
                continue;
            }
            let entry = grouped.entry(row.location.clone()).or_insert_with(|| GeoRow {
                location: row.location.clone(),
                cost: 0.0,
                conversions: 0.0,
            });
            entry.cost += row.cost;
            entry.conversions += row.conversions;
        }
        Ok(grouped.into_values().collect())
    }
}

use crate::domain::metrics::{EntityKind, EntitySeries, MetricPoint};
use crate::error::AuditError;
use crate::store::{
    BudgetEntry, ChannelRow, Demographic, GeoRow, KeywordRow, LifetimeStats, MetricStore,
    ProductCostRow, SearchTermRow, SegmentRow,
};
use chrono::{Duration, NaiveDate};
use sqlx::PgPool;

/// Reader over the ingestion collaborator's tables. This core never writes.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn table_for(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Campaign => "campaign",
            EntityKind::Product => "product",
        }
    }
}

fn query_err(what: &str, e: sqlx::Error) -> anyhow::Error {
    anyhow::Error::new(AuditError::query_failure(format!("{what}: {e}")))
}

#[async_trait::async_trait]
impl MetricStore for PostgresStore {
    async fn latest_date(&self, kind: EntityKind) -> anyhow::Result<Option<NaiveDate>> {
        let table = Self::table_for(kind);
        let row: (Option<NaiveDate>,) =
            sqlx::query_as(&format!("SELECT MAX(date) FROM {table}"))
                .persistent(false)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_err("latest date", e))?;
        Ok(row.0)
    }

    async fn date_range(
        &self,
        kind: EntityKind,
    ) -> anyhow::Result<Option<(NaiveDate, NaiveDate)>> {
        let table = Self::table_for(kind);
        let row: (Option<NaiveDate>, Option<NaiveDate>) =
            sqlx::query_as(&format!("SELECT MIN(date), MAX(date) FROM {table}"))
                .persistent(false)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_err("date range", e))?;
        Ok(match row {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        })
    }

    async fn series(
        &self,
        kind: EntityKind,
        until: NaiveDate,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<EntitySeries>> {
        let from = until - Duration::days(lookback_days);

        match kind {
            EntityKind::Campaign => {
                let rows: Vec<(
                    NaiveDate,
                    String,
                    Option<String>,
                    f64,
                    f64,
                    f64,
                    f64,
                    f64,
                )> = sqlx::query_as(
                    "SELECT date, campaign, campaign_type, \
                            COALESCE(cost, 0)::float8, COALESCE(conversions, 0)::float8, \
                            COALESCE(conv_value, 0)::float8, COALESCE(clicks, 0)::float8, \
                            COALESCE(impressions, 0)::float8 \
                     FROM campaign \
                     WHERE date <= $1 AND date >= $2 \
                     ORDER BY campaign, date ASC",
                )
                .persistent(false)
                .bind(until)
                .bind(from)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| query_err("campaign series", e))?;

                let mut out: Vec<EntitySeries> = Vec::new();
                for (date, campaign, campaign_type, cost, conversions, conv_value, clicks, impressions) in
                    rows
                {
                    if out.last().map(|s| s.entity_id.as_str()) != Some(campaign.as_str()) {
                        let mut s = EntitySeries::new(campaign.clone(), EntityKind::Campaign);
                        s.entity_type = campaign_type.clone();
                        out.push(s);
                    }
                    if let Some(series) = out.last_mut() {
                        series.points.push(MetricPoint {
                            entity_id: campaign,
                            date,
                            cost,
                            conversions,
                            conv_value,
                            clicks,
                            impressions,
                        });
                    }
                }
                Ok(out)
            }
            EntityKind::Product => {
                let rows: Vec<(NaiveDate, String, Option<String>, f64, f64, f64)> =
                    sqlx::query_as(
                        "SELECT date, item_id, title, \
                                COALESCE(cost, 0)::float8, COALESCE(clicks, 0)::float8, \
                                COALESCE(impr, 0)::float8 \
                         FROM product \
                         WHERE date <= $1 AND date >= $2 \
                         ORDER BY item_id, date ASC",
                    )
                    .persistent(false)
                    .bind(until)
                    .bind(from)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| query_err("product series", e))?;

                let mut out: Vec<EntitySeries> = Vec::new();
                for (date, item_id, title, cost, clicks, impressions) in rows {
                    if out.last().map(|s| s.entity_id.as_str()) != Some(item_id.as_str()) {
                        let mut s = EntitySeries::new(item_id.clone(), EntityKind::Product);
                        s.name = title.clone();
                        out.push(s);
                    }
                    if let Some(series) = out.last_mut() {
                        // The latest title wins; the feed occasionally renames items.
                        if title.is_some() {
                            series.name = title;
                        }
                        series.points.push(MetricPoint {
                            entity_id: item_id,
                            date,
                            cost,
                            conversions: 0.0,
                            conv_value: 0.0,
                            clicks,
                            impressions,
                        });
                    }
                }
                Ok(out)
            }
        }
    }

    async fn budget_history(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<BudgetEntry>> {
        let from = until - Duration::days(days);
        let rows: Vec<(NaiveDate, Option<f64>)> = sqlx::query_as(
            "SELECT date, budget::float8 FROM campaign \
             WHERE campaign = $1 AND date <= $2 AND date >= $3 \
             ORDER BY date DESC",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("budget history", e))?;

        Ok(rows
            .into_iter()
            .map(|(date, budget)| BudgetEntry { date, budget })
            .collect())
    }

    async fn lifetime_stats(
        &self,
        entity_id: &str,
        until: NaiveDate,
    ) -> anyhow::Result<Option<LifetimeStats>> {
        let row: (Option<NaiveDate>, Option<f64>, Option<f64>) = sqlx::query_as(
            "SELECT MIN(date), COALESCE(SUM(conversions), 0)::float8, \
                    COALESCE(SUM(cost), 0)::float8 \
             FROM campaign \
             WHERE campaign = $1 AND date <= $2",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_err("lifetime stats", e))?;

        Ok(row.0.map(|first_date| LifetimeStats {
            first_date,
            total_conversions: row.1.unwrap_or(0.0),
            total_cost: row.2.unwrap_or(0.0),
        }))
    }

    async fn search_terms(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SearchTermRow>> {
        let from = until - Duration::days(days);
        let rows: Vec<(String, String, f64, f64, f64)> = sqlx::query_as(
            "SELECT search_term, match_type, COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(conversions), 0)::float8, COALESCE(SUM(interactions), 0)::float8 \
             FROM search_term \
             WHERE campaign = $1 AND date <= $2 AND date >= $3 \
             GROUP BY search_term, match_type",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("search terms", e))?;

        Ok(rows
            .into_iter()
            .map(|(term, match_type, cost, conversions, clicks)| SearchTermRow {
                term,
                match_type,
                cost,
                conversions,
                clicks,
            })
            .collect())
    }

    async fn channels(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<ChannelRow>> {
        let from = until - Duration::days(days);
        let rows: Vec<(String, f64, f64, f64)> = sqlx::query_as(
            "SELECT channels, COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(results_value), 0)::float8, COALESCE(SUM(conversions), 0)::float8 \
             FROM channel \
             WHERE campaigns = $1 AND date <= $2 AND date >= $3 \
             GROUP BY channels",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("channels", e))?;

        Ok(rows
            .into_iter()
            .map(|(channel, cost, conv_value, conversions)| ChannelRow {
                channel,
                cost,
                conv_value,
                conversions,
            })
            .collect())
    }

    async fn top_products(
        &self,
        until: NaiveDate,
        days: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<ProductCostRow>> {
        let from = until - Duration::days(days);
        let rows: Vec<(String, Option<String>, f64, f64)> = sqlx::query_as(
            "SELECT item_id, MAX(title), COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(clicks), 0)::float8 \
             FROM product \
             WHERE date <= $1 AND date >= $2 \
             GROUP BY item_id \
             ORDER BY 3 DESC \
             LIMIT $3",
        )
        .persistent(false)
        .bind(until)
        .bind(from)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("top products", e))?;

        Ok(rows
            .into_iter()
            .map(|(item_id, title, cost, clicks)| ProductCostRow {
                title: title.unwrap_or_else(|| item_id.clone()),
                item_id,
                cost,
                clicks,
            })
            .collect())
    }

    async fn keywords(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<KeywordRow>> {
        let from = until - Duration::days(days);
        let rows: Vec<(String, String, f64, f64, f64)> = sqlx::query_as(
            "SELECT keyword, match_type, COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(conversions), 0)::float8, COALESCE(SUM(conv_value), 0)::float8 \
             FROM keyword \
             WHERE campaign = $1 AND date <= $2 AND date >= $3 \
             GROUP BY keyword, match_type \
             ORDER BY 3 DESC",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("keywords", e))?;

        Ok(rows
            .into_iter()
            .map(|(keyword, match_type, cost, conversions, conv_value)| KeywordRow {
                keyword,
                match_type,
                cost,
                conversions,
                conv_value,
            })
            .collect())
    }

    async fn segments(
        &self,
        entity_id: &str,
        demographic: Demographic,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<SegmentRow>> {
        let from = until - Duration::days(days);
        let col = demographic.as_str();
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(&format!(
            "SELECT {col}, COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(conversions), 0)::float8 \
             FROM {col} \
             WHERE campaign = $1 AND date <= $2 AND date >= $3 \
             GROUP BY {col}"
        ))
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("segments", e))?;

        Ok(rows
            .into_iter()
            .map(|(segment, cost, conversions)| SegmentRow {
                segment,
                cost,
                conversions,
            })
            .collect())
    }

    async fn locations(
        &self,
        entity_id: &str,
        until: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<GeoRow>> {
        let from = until - Duration::days(days);
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            "SELECT location, COALESCE(SUM(cost), 0)::float8, \
                    COALESCE(SUM(conversions), 0)::float8 \
             FROM location_by_cities_all_campaign \
             WHERE campaign = $1 AND date <= $2 AND date >= $3 \
             GROUP BY location",
        )
        .persistent(false)
        .bind(entity_id)
        .bind(until)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("locations", e))?;

        Ok(rows
            .into_iter()
            .map(|(location, cost, conversions)| GeoRow {
                location,
                cost,
                conversions,
            })
            .collect())
    }
}

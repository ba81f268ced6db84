use crate::config::RuleConfig;
use crate::domain::diagnosis::{Dimension, Finding, Severity};
use crate::experts::Expert;
use crate::store::{Demographic, MetricStore};
use chrono::NaiveDate;

pub const SEARCH_QUALITY: &str = "search-quality";
pub const CHANNEL_MIX: &str = "channel-mix";
pub const PRODUCT_SHELF: &str = "product-shelf";
pub const KEYWORD: &str = "keyword";
pub const DEMOGRAPHIC: &str = "demographic";
pub const GEO: &str = "geo";

/// The full evaluator bank wired from the rule thresholds.
pub fn default_bank(rules: &RuleConfig) -> Vec<Box<dyn Expert>> {
    vec![
        Box::new(SearchQualityExpert {
            reference_cpa: rules.reference_cpa,
            broad_share_limit: rules.broad_share_limit,
            brand_terms: rules.brand_terms.clone(),
        }),
        Box::new(ChannelMixExpert {
            share_limit: rules.channel_share_limit,
            washing_ratio: rules.washing_roas_ratio,
            subsidy_ratio: rules.subsidy_roas_ratio,
        }),
        Box::new(ProductShelfExpert {
            hegemony_share: rules.hegemony_share,
            cost_ceiling: rules.product_cost_ceiling,
        }),
        Box::new(KeywordExpert {
            cost_floor: rules.keyword_cost_floor,
            roas_floor: rules.keyword_roas_floor,
        }),
        Box::new(DemographicExpert {
            demographic: Demographic::Age,
            share_limit: rules.segment_share_limit,
            cpa_ratio: rules.segment_cpa_ratio,
            reference_cpa: rules.reference_cpa,
        }),
        Box::new(DemographicExpert {
            demographic: Demographic::Gender,
            share_limit: rules.segment_share_limit,
            cpa_ratio: rules.segment_cpa_ratio,
            reference_cpa: rules.reference_cpa,
        }),
        Box::new(GeoExpert {
            cost_floor: rules.geo_cost_floor,
        }),
    ]
}

fn finding(
    expert: &str,
    issue: &str,
    severity: Severity,
    evidence: String,
    suggestion: &str,
) -> Finding {
    Finding {
        expert: expert.to_string(),
        issue: issue.to_string(),
        severity,
        evidence,
        suggestion: suggestion.to_string(),
    }
}

/// Flags high-waste search terms and declining match quality over the
/// trailing 7 days.
pub struct SearchQualityExpert {
    reference_cpa: f64,
    broad_share_limit: f64,
    brand_terms: Vec<String>,
}

#[async_trait::async_trait]
impl Expert for SearchQualityExpert {
    fn name(&self) -> &'static str {
        SEARCH_QUALITY
    }

    fn dimension(&self) -> Dimension {
        Dimension::SearchTerm
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store.search_terms(entity_id, target_date, 7).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let total_cost: f64 = rows.iter().map(|r| r.cost).sum();
        if total_cost == 0.0 {
            return Ok(Vec::new());
        }

        let mut flags = Vec::new();
        for r in &rows {
            let term = r.term.to_lowercase();
            if self.brand_terms.iter().any(|b| term.contains(b)) {
                continue;
            }
            if r.cost > self.reference_cpa * 1.5 && r.conversions == 0.0 {
                flags.push(finding(
                    SEARCH_QUALITY,
                    "high-waste search term (suggest exclusion)",
                    Severity::High,
                    format!(
                        "search term '{}' spent ${:.0} over 7 days with 0 conversions",
                        r.term, r.cost
                    ),
                    "add as a negative keyword",
                ));
            }
        }

        let broad_cost: f64 = rows
            .iter()
            .filter(|r| r.match_type.eq_ignore_ascii_case("broad"))
            .map(|r| r.cost)
            .sum();
        let broad_share = broad_cost / total_cost;
        if broad_share > self.broad_share_limit {
            flags.push(finding(
                SEARCH_QUALITY,
                "traffic match quality decline",
                Severity::Medium,
                format!(
                    "broad match holds {:.1}% of spend, risking irrelevant traffic",
                    broad_share * 100.0
                ),
                "review the search term report; consider phrase or exact match for control",
            ));
        }
        Ok(flags)
    }
}

/// Multi-channel placements: traffic washing and cross-subsidy over the
/// trailing 7 days.
pub struct ChannelMixExpert {
    share_limit: f64,
    washing_ratio: f64,
    subsidy_ratio: f64,
}

const WASHING_CHANNELS: [&str; 2] = ["Display", "Video"];
const SUBSIDY_CHANNEL: &str = "Shopping";

#[async_trait::async_trait]
impl Expert for ChannelMixExpert {
    fn name(&self) -> &'static str {
        CHANNEL_MIX
    }

    fn dimension(&self) -> Dimension {
        Dimension::Channel
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store.channels(entity_id, target_date, 7).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let total_cost: f64 = rows.iter().map(|r| r.cost).sum();
        let total_value: f64 = rows.iter().map(|r| r.conv_value).sum();
        let blended_roas = if total_cost > 0.0 {
            total_value / total_cost
        } else {
            0.0
        };
        if total_cost == 0.0 {
            return Ok(Vec::new());
        }

        let mut flags = Vec::new();
        for name in WASHING_CHANNELS {
            let Some(r) = rows.iter().find(|r| r.channel == name) else {
                continue;
            };
            let share = r.cost / total_cost;
            let roas = if r.cost > 0.0 { r.conv_value / r.cost } else { 0.0 };
            if share > self.share_limit && roas < blended_roas * self.washing_ratio {
                flags.push(finding(
                    CHANNEL_MIX,
                    "traffic washing",
                    Severity::High,
                    format!(
                        "{name} takes {:.0}% of spend at ROAS {roas:.2}, far below the blended {blended_roas:.2}",
                        share * 100.0
                    ),
                    "review audience signals on the asset groups; consider excluding low-quality placements",
                ));
            }
        }

        if let Some(r) = rows.iter().find(|r| r.channel == SUBSIDY_CHANNEL) {
            let roas = if r.cost > 0.0 { r.conv_value / r.cost } else { 0.0 };
            if roas > blended_roas * self.subsidy_ratio {
                flags.push(finding(
                    CHANNEL_MIX,
                    "cross-subsidy",
                    Severity::Medium,
                    format!(
                        "{SUBSIDY_CHANNEL} ROAS ({roas:.2}) is masking losses in the other channels"
                    ),
                    "optimize or cut the under-converting non-shopping asset groups",
                ));
            }
        }
        Ok(flags)
    }
}

/// Product shelf structure: budget hegemony and unverified high spenders.
/// The product feed has no campaign column, so this looks at the global
/// top spenders.
pub struct ProductShelfExpert {
    hegemony_share: f64,
    cost_ceiling: f64,
}

#[async_trait::async_trait]
impl Expert for ProductShelfExpert {
    fn name(&self) -> &'static str {
        PRODUCT_SHELF
    }

    fn dimension(&self) -> Dimension {
        Dimension::ProductShelf
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        _entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store.top_products(target_date, 7, 10).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let total_cost: f64 = rows.iter().map(|r| r.cost).sum();
        if total_cost == 0.0 {
            return Ok(Vec::new());
        }

        let mut flags = Vec::new();
        let top = &rows[0];
        let top_share = top.cost / total_cost;
        if top_share > self.hegemony_share {
            flags.push(finding(
                PRODUCT_SHELF,
                "budget hegemony (global top item)",
                Severity::Medium,
                format!(
                    "item '{}' holds {:.0}% of the top-spender budget (campaign-level drill-down not available for this table)",
                    top.title,
                    top_share * 100.0
                ),
                "monitor how this item is allocated across campaigns",
            ));
        }

        for r in &rows {
            if r.cost > self.cost_ceiling {
                flags.push(finding(
                    PRODUCT_SHELF,
                    "high-spend item (no conversion signal)",
                    Severity::Low,
                    format!("item '{}' spent ${:.0} over 7 days", r.title, r.cost),
                    "verify the item's actual conversion performance in the ads console",
                ));
            }
        }
        Ok(flags)
    }
}

/// Core-term leakage: expensive keywords returning under half their spend
/// over 14 days.
pub struct KeywordExpert {
    cost_floor: f64,
    roas_floor: f64,
}

#[async_trait::async_trait]
impl Expert for KeywordExpert {
    fn name(&self) -> &'static str {
        KEYWORD
    }

    fn dimension(&self) -> Dimension {
        Dimension::Keyword
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store.keywords(entity_id, target_date, 14).await?;
        let mut flags = Vec::new();
        for r in &rows {
            let roas = if r.cost > 0.0 { r.conv_value / r.cost } else { 0.0 };
            if r.cost > self.cost_floor && roas < self.roas_floor {
                flags.push(finding(
                    KEYWORD,
                    "core-term overspend",
                    Severity::High,
                    format!(
                        "keyword '{}' spent ${:.0} at ROAS {roas:.2} over 14 days",
                        r.keyword, r.cost
                    ),
                    "pause the keyword or cut its bid sharply",
                ));
            }
        }
        Ok(flags)
    }
}

/// Structural inefficiency by age or gender segment over 30 days.
pub struct DemographicExpert {
    demographic: Demographic,
    share_limit: f64,
    cpa_ratio: f64,
    reference_cpa: f64,
}

#[async_trait::async_trait]
impl Expert for DemographicExpert {
    fn name(&self) -> &'static str {
        DEMOGRAPHIC
    }

    fn dimension(&self) -> Dimension {
        match self.demographic {
            Demographic::Age => Dimension::Age,
            Demographic::Gender => Dimension::Gender,
        }
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store
            .segments(entity_id, self.demographic, target_date, 30)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let total_cost: f64 = rows.iter().map(|r| r.cost).sum();
        let total_conv: f64 = rows.iter().map(|r| r.conversions).sum();
        if total_cost == 0.0 {
            return Ok(Vec::new());
        }
        let avg_cpa = if total_conv > 0.0 {
            total_cost / total_conv
        } else {
            self.reference_cpa
        };

        let mut flags = Vec::new();
        for r in &rows {
            // No conversions means no true CPA; penalize with a 2x proxy.
            let cpa = if r.conversions > 0.0 {
                r.cost / r.conversions
            } else {
                r.cost * 2.0
            };
            let share = r.cost / total_cost;
            if share > self.share_limit && cpa > avg_cpa * self.cpa_ratio {
                flags.push(finding(
                    DEMOGRAPHIC,
                    &format!("{} segment inefficiency", self.demographic.as_str()),
                    Severity::Medium,
                    format!(
                        "segment '{}' holds {:.0}% of spend with CPA more than 50% above the blended average",
                        r.segment,
                        share * 100.0
                    ),
                    "apply a negative bid adjustment (-50% or more) to the segment",
                ));
            }
        }
        Ok(flags)
    }
}

/// Geographic blackholes: locations burning budget with zero conversions
/// over 30 days.
pub struct GeoExpert {
    cost_floor: f64,
}

#[async_trait::async_trait]
impl Expert for GeoExpert {
    fn name(&self) -> &'static str {
        GEO
    }

    fn dimension(&self) -> Dimension {
        Dimension::Geo
    }

    async fn evaluate(
        &self,
        store: &dyn MetricStore,
        entity_id: &str,
        target_date: NaiveDate,
    ) -> anyhow::Result<Vec<Finding>> {
        let rows = store.locations(entity_id, target_date, 30).await?;
        let mut flags = Vec::new();
        for r in &rows {
            if r.cost > self.cost_floor && r.conversions == 0.0 {
                flags.push(finding(
                    GEO,
                    "geographic blackhole",
                    Severity::High,
                    format!(
                        "location '{}' spent ${:.0} over 30 days with 0 conversions",
                        r.location, r.cost
                    ),
                    "exclude the region to stop the bleed",
                ));
            }
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        ChannelRow, GeoRow, KeywordRow, MemoryStore, ProductCostRow, SearchTermRow, SegmentRow,
    };

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
    }

    fn rules() -> RuleConfig {
        RuleConfig::default()
    }

    #[tokio::test]
    async fn search_expert_flags_waste_and_broad_share() {
        let mut store = MemoryStore::new();
        store.push_search_term(
            "c1",
            date(),
            SearchTermRow {
                term: "cheap widgets".to_string(),
                match_type: "Broad".to_string(),
                cost: 80.0,
                conversions: 0.0,
                clicks: 40.0,
            },
        );
        store.push_search_term(
            "c1",
            date(),
            SearchTermRow {
                term: "widget pro".to_string(),
                match_type: "Exact".to_string(),
                cost: 20.0,
                conversions: 2.0,
                clicks: 10.0,
            },
        );

        let r = rules();
        let expert = SearchQualityExpert {
            reference_cpa: r.reference_cpa,
            broad_share_limit: r.broad_share_limit,
            brand_terms: r.brand_terms.clone(),
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        // $80 > 1.5 * $40 with zero conversions, and broad share is 80%.
        assert_eq!(flags.len(), 2);
        assert!(flags.iter().any(|f| f.severity == Severity::High
            && f.evidence.contains("cheap widgets")));
        assert!(flags.iter().any(|f| f.severity == Severity::Medium
            && f.evidence.contains("80.0%")));
    }

    #[tokio::test]
    async fn search_expert_skips_brand_terms() {
        let mut store = MemoryStore::new();
        store.push_search_term(
            "c1",
            date(),
            SearchTermRow {
                term: "brandname widgets".to_string(),
                match_type: "Exact".to_string(),
                cost: 500.0,
                conversions: 0.0,
                clicks: 100.0,
            },
        );

        let r = rules();
        let expert = SearchQualityExpert {
            reference_cpa: r.reference_cpa,
            broad_share_limit: r.broad_share_limit,
            brand_terms: r.brand_terms.clone(),
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();
        assert!(flags.iter().all(|f| f.severity != Severity::High));
    }

    #[tokio::test]
    async fn channel_expert_detects_washing_and_subsidy() {
        let mut store = MemoryStore::new();
        // Blended ROAS = 300/200 = 1.5. Display: 40% share, ROAS 0.25.
        // Shopping ROAS 2.83 > 1.5 * 1.5.
        store.push_channel(
            "c1",
            date(),
            ChannelRow {
                channel: "Display".to_string(),
                cost: 80.0,
                conv_value: 20.0,
                conversions: 2.0,
            },
        );
        store.push_channel(
            "c1",
            date(),
            ChannelRow {
                channel: "Shopping".to_string(),
                cost: 100.0,
                conv_value: 283.0,
                conversions: 20.0,
            },
        );
        store.push_channel(
            "c1",
            date(),
            ChannelRow {
                channel: "Search".to_string(),
                cost: 20.0,
                conv_value: 0.0,
                conversions: 0.0,
            },
        );

        let r = rules();
        let expert = ChannelMixExpert {
            share_limit: r.channel_share_limit,
            washing_ratio: r.washing_roas_ratio,
            subsidy_ratio: r.subsidy_roas_ratio,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        assert!(flags
            .iter()
            .any(|f| f.issue == "traffic washing" && f.severity == Severity::High));
        assert!(flags
            .iter()
            .any(|f| f.issue == "cross-subsidy" && f.severity == Severity::Medium));
    }

    #[tokio::test]
    async fn product_expert_flags_hegemony_with_share_in_evidence() {
        let mut store = MemoryStore::new();
        store.push_product_cost(
            date(),
            ProductCostRow {
                item_id: "sku-1".to_string(),
                title: "Big Seller".to_string(),
                cost: 90.0,
                clicks: 200.0,
            },
        );
        store.push_product_cost(
            date(),
            ProductCostRow {
                item_id: "sku-2".to_string(),
                title: "Also Ran".to_string(),
                cost: 10.0,
                clicks: 30.0,
            },
        );

        let r = rules();
        let expert = ProductShelfExpert {
            hegemony_share: r.hegemony_share,
            cost_ceiling: r.product_cost_ceiling,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        let hegemony = flags
            .iter()
            .find(|f| f.issue.contains("budget hegemony"))
            .expect("hegemony finding");
        assert_eq!(hegemony.severity, Severity::Medium);
        assert!(hegemony.evidence.contains("90%"));
    }

    #[tokio::test]
    async fn product_expert_flags_items_over_the_cost_ceiling() {
        let mut store = MemoryStore::new();
        store.push_product_cost(
            date(),
            ProductCostRow {
                item_id: "sku-1".to_string(),
                title: "Heavy Spender".to_string(),
                cost: 150.0,
                clicks: 400.0,
            },
        );
        store.push_product_cost(
            date(),
            ProductCostRow {
                item_id: "sku-2".to_string(),
                title: "Modest".to_string(),
                cost: 60.0,
                clicks: 80.0,
            },
        );

        let r = rules();
        let expert = ProductShelfExpert {
            hegemony_share: r.hegemony_share,
            cost_ceiling: r.product_cost_ceiling,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        // 150/210 is below the hegemony share, so only the ceiling fires.
        let low: Vec<_> = flags.iter().filter(|f| f.severity == Severity::Low).collect();
        assert_eq!(low.len(), 1);
        assert!(low[0].evidence.contains("Heavy Spender"));
        assert!(low[0].evidence.contains("$150"));
        assert!(flags.iter().all(|f| !f.issue.contains("budget hegemony")));
    }

    #[tokio::test]
    async fn keyword_expert_flags_expensive_low_roas_terms() {
        let mut store = MemoryStore::new();
        store.push_keyword(
            "c1",
            date(),
            KeywordRow {
                keyword: "buy widgets".to_string(),
                match_type: "Phrase".to_string(),
                cost: 60.0,
                conversions: 1.0,
                conv_value: 12.0,
            },
        );
        store.push_keyword(
            "c1",
            date(),
            KeywordRow {
                keyword: "widget reviews".to_string(),
                match_type: "Broad".to_string(),
                cost: 30.0,
                conversions: 0.0,
                conv_value: 0.0,
            },
        );

        let r = rules();
        let expert = KeywordExpert {
            cost_floor: r.keyword_cost_floor,
            roas_floor: r.keyword_roas_floor,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        // Only "buy widgets" crosses the $50 floor; $30 is under it.
        assert_eq!(flags.len(), 1);
        assert!(flags[0].evidence.contains("buy widgets"));
        assert_eq!(flags[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn demographic_expert_flags_heavy_inefficient_segment() {
        let mut store = MemoryStore::new();
        // Blended CPA = 300/10 = 30. '65+' holds 40% of spend at CPA 120.
        store.push_segment(
            "c1",
            Demographic::Age,
            date(),
            SegmentRow {
                segment: "65+".to_string(),
                cost: 120.0,
                conversions: 1.0,
            },
        );
        store.push_segment(
            "c1",
            Demographic::Age,
            date(),
            SegmentRow {
                segment: "25-34".to_string(),
                cost: 180.0,
                conversions: 9.0,
            },
        );

        let r = rules();
        let expert = DemographicExpert {
            demographic: Demographic::Age,
            share_limit: r.segment_share_limit,
            cpa_ratio: r.segment_cpa_ratio,
            reference_cpa: r.reference_cpa,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        assert_eq!(flags.len(), 1);
        assert!(flags[0].evidence.contains("65+"));
        assert_eq!(flags[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn geo_expert_flags_zero_conversion_spend() {
        let mut store = MemoryStore::new();
        store.push_location(
            "c1",
            date(),
            GeoRow {
                location: "Anchorage".to_string(),
                cost: 150.0,
                conversions: 0.0,
            },
        );
        store.push_location(
            "c1",
            date(),
            GeoRow {
                location: "Denver".to_string(),
                cost: 300.0,
                conversions: 12.0,
            },
        );

        let expert = GeoExpert {
            cost_floor: rules().geo_cost_floor,
        };
        let flags = expert.evaluate(&store, "c1", date()).await.unwrap();

        assert_eq!(flags.len(), 1);
        assert!(flags[0].evidence.contains("Anchorage"));
        assert_eq!(flags[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn default_bank_covers_all_dimensions() {
        let bank = default_bank(&rules());
        let dims: Vec<Dimension> = bank.iter().map(|e| e.dimension()).collect();
        for dim in [
            Dimension::SearchTerm,
            Dimension::Channel,
            Dimension::ProductShelf,
            Dimension::Keyword,
            Dimension::Age,
            Dimension::Gender,
            Dimension::Geo,
        ] {
            assert!(dims.contains(&dim));
        }
    }
}

pub mod aggregate;
pub mod detect;
pub mod domain;
pub mod error;
pub mod experts;
pub mod guard;
pub mod pipeline;
pub mod store;

pub mod config {
    use crate::error::AuditError;
    use anyhow::Context;
    use chrono::NaiveDate;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    /// An inclusive promotion blackout interval.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DateRange {
        pub start: NaiveDate,
        pub end: NaiveDate,
    }

    impl DateRange {
        pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AuditError> {
            if end < start {
                return Err(AuditError::configuration(format!(
                    "promotion window end {end} precedes start {start}"
                )));
            }
            Ok(Self { start, end })
        }

        pub fn contains(&self, date: NaiveDate) -> bool {
            self.start <= date && date <= self.end
        }
    }

    #[derive(Debug, Clone)]
    pub struct DetectorConfig {
        /// A day fails efficiency when quality drops below this fraction of its trailing mean.
        pub drop_ratio: f64,
        /// A day fails efficiency when unit cost rises above this multiple of its trailing mean.
        pub rise_ratio: f64,
        /// Consecutive days that must all fail efficiency.
        pub check_days: i64,
        /// Trailing-mean window per day check, exclusive of the day itself.
        pub history_days: i64,
        /// Minimum days of history before an entity is considered at all.
        pub min_history_days: usize,
        /// Week-over-week offset for the growth comparison.
        pub growth_offset_days: i64,
        /// Days fetched per scan relative to the target date.
        pub lookback_days: i64,
    }

    impl Default for DetectorConfig {
        fn default() -> Self {
            Self {
                drop_ratio: 0.8,
                rise_ratio: 1.25,
                check_days: 3,
                history_days: 7,
                min_history_days: 10,
                growth_offset_days: 7,
                lookback_days: 45,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct GuardConfig {
        pub promotion_windows: Vec<DateRange>,
        /// Days before a promotion start that count as lead-up.
        pub lead_up_days: i64,
        /// Trailing window inspected for budget changes.
        pub repricing_window_days: i64,
        /// Entities younger than this are hard-blocked.
        pub cold_start_days: i64,
        /// Below this lifetime conversion count the entity is noted as still learning.
        pub learning_conversion_floor: f64,
    }

    impl Default for GuardConfig {
        fn default() -> Self {
            Self {
                promotion_windows: Vec::new(),
                lead_up_days: 3,
                repricing_window_days: 3,
                cold_start_days: 7,
                learning_conversion_floor: 30.0,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct RuleConfig {
        /// Account-level reference CPA used where no blended average is derivable.
        pub reference_cpa: f64,
        pub broad_share_limit: f64,
        pub brand_terms: Vec<String>,
        pub channel_share_limit: f64,
        pub washing_roas_ratio: f64,
        pub subsidy_roas_ratio: f64,
        pub hegemony_share: f64,
        pub product_cost_ceiling: f64,
        pub keyword_cost_floor: f64,
        pub keyword_roas_floor: f64,
        pub segment_share_limit: f64,
        pub segment_cpa_ratio: f64,
        pub geo_cost_floor: f64,
    }

    impl Default for RuleConfig {
        fn default() -> Self {
            Self {
                reference_cpa: 40.0,
                broad_share_limit: 0.45,
                brand_terms: vec![
                    "brandname".to_string(),
                    "google".to_string(),
                    "official".to_string(),
                ],
                channel_share_limit: 0.35,
                washing_roas_ratio: 0.5,
                subsidy_roas_ratio: 1.5,
                hegemony_share: 0.85,
                product_cost_ceiling: 100.0,
                keyword_cost_floor: 50.0,
                keyword_roas_floor: 0.5,
                segment_share_limit: 0.15,
                segment_cpa_ratio: 1.5,
                geo_cost_floor: 100.0,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct AuditConfig {
        pub detector: DetectorConfig,
        pub guard: GuardConfig,
        pub rules: RuleConfig,
        pub concurrency: usize,
    }

    impl Default for AuditConfig {
        fn default() -> Self {
            Self {
                detector: DetectorConfig::default(),
                guard: GuardConfig::default(),
                rules: RuleConfig::default(),
                concurrency: 4,
            }
        }
    }

    impl AuditConfig {
        /// Build from the environment. Malformed values are fatal at startup,
        /// never deferred to scan time.
        pub fn from_env() -> anyhow::Result<Self> {
            let mut cfg = Self::default();

            if let Ok(s) = std::env::var("PROMOTION_WINDOWS") {
                cfg.guard.promotion_windows = parse_promotion_windows(&s)?;
            }
            if let Ok(s) = std::env::var("AUDIT_DROP_RATIO") {
                cfg.detector.drop_ratio = parse_ratio("AUDIT_DROP_RATIO", &s)?;
            }
            if let Ok(s) = std::env::var("AUDIT_RISE_RATIO") {
                cfg.detector.rise_ratio = parse_ratio("AUDIT_RISE_RATIO", &s)?;
            }
            if let Ok(s) = std::env::var("AUDIT_CONCURRENCY") {
                cfg.concurrency = s.parse::<usize>().map_err(|_| {
                    AuditError::configuration(format!("AUDIT_CONCURRENCY is not a number: {s}"))
                })?;
            }

            anyhow::ensure!(cfg.concurrency >= 1, "AUDIT_CONCURRENCY must be >= 1");
            Ok(cfg)
        }
    }

    fn parse_ratio(name: &str, s: &str) -> Result<f64, AuditError> {
        let v = s
            .trim()
            .parse::<f64>()
            .map_err(|_| AuditError::configuration(format!("{name} is not a number: {s}")))?;
        if !v.is_finite() || v <= 0.0 {
            return Err(AuditError::configuration(format!(
                "{name} must be a finite positive ratio (got {s})"
            )));
        }
        Ok(v)
    }

    /// Format: "YYYY-MM-DD..YYYY-MM-DD" ranges, comma separated.
    pub fn parse_promotion_windows(s: &str) -> Result<Vec<DateRange>, AuditError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (start, end) = part.split_once("..").ok_or_else(|| {
                AuditError::configuration(format!("promotion window missing '..': {part}"))
            })?;
            let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").map_err(|_| {
                AuditError::configuration(format!("bad promotion window start: {part}"))
            })?;
            let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| {
                AuditError::configuration(format!("bad promotion window end: {part}"))
            })?;
            out.push(DateRange::new(start, end)?);
        }
        Ok(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_promotion_windows() {
            let windows =
                parse_promotion_windows("2025-11-20..2025-12-05, 2026-06-01..2026-06-20").unwrap();
            assert_eq!(windows.len(), 2);
            assert!(windows[0].contains(NaiveDate::from_ymd_opt(2025, 11, 25).unwrap()));
            assert!(!windows[0].contains(NaiveDate::from_ymd_opt(2025, 12, 6).unwrap()));
        }

        #[test]
        fn rejects_inverted_window() {
            let res = parse_promotion_windows("2026-06-20..2026-06-01");
            assert!(res.is_err());
        }

        #[test]
        fn rejects_malformed_window() {
            assert!(parse_promotion_windows("2026-06-01").is_err());
            assert!(parse_promotion_windows("not-a-date..2026-06-01").is_err());
        }
    }
}

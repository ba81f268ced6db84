use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaudit_core::config;
use adaudit_core::domain::diagnosis::ScanReport;
use adaudit_core::domain::metrics::{EntityKind, MetricPoint};
use adaudit_core::pipeline;
use adaudit_core::store::{MemoryStore, MetricStore, PostgresStore, ProductCostRow, SearchTermRow};

mod report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScanKind {
    Campaigns,
    Products,
    All,
}

impl ScanKind {
    fn kinds(self) -> Vec<EntityKind> {
        match self {
            Self::Campaigns => vec![EntityKind::Campaign],
            Self::Products => vec![EntityKind::Product],
            Self::All => vec![EntityKind::Campaign, EntityKind::Product],
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "adaudit_worker")]
struct Args {
    /// Scan date (YYYY-MM-DD). Defaults to the latest date in the store.
    #[arg(long)]
    target_date: Option<String>,

    /// Which entity families to scan.
    #[arg(long, value_enum, default_value_t = ScanKind::All)]
    kind: ScanKind,

    /// Cap the rendered list at the N worst entities per report.
    #[arg(long)]
    top: Option<usize>,

    /// Emit the raw reports as JSON instead of markdown.
    #[arg(long)]
    json: bool,

    /// Run against a small built-in dataset instead of Postgres.
    #[arg(long)]
    stub: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let cfg = config::AuditConfig::from_env()?;

    let target_date = args
        .target_date
        .as_deref()
        .map(|s| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("bad --target-date: {s}"))
        })
        .transpose()?;

    let store: Arc<dyn MetricStore> = if args.stub {
        tracing::info!("running against the built-in stub dataset");
        Arc::new(stub_store())
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        Arc::new(PostgresStore::new(pool))
    };

    let mut reports: Vec<ScanReport> = Vec::new();
    for kind in args.kind.kinds() {
        match pipeline::run_scan(Arc::clone(&store), &cfg, kind, target_date).await {
            Ok(report) => reports.push(report),
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(kind = kind.as_str(), error = %err, "scan failed");
                return Err(err);
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print!("{}", report::render(&reports, args.top));
    }

    Ok(())
}

fn init_sentry(settings: &config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

/// A two-campaign, one-product dataset ending today: one campaign collapses
/// over the last three days, one stays healthy and the product's CTR craters.
fn stub_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let end = chrono::Utc::now().date_naive();
    let day = |offset: i64| end - chrono::Duration::days(offset);

    for offset in (0..13).rev() {
        let collapsed = offset < 3;
        store.push_point(
            EntityKind::Campaign,
            MetricPoint {
                entity_id: "cmp-decline".to_string(),
                date: day(offset),
                cost: 50.0,
                conversions: if collapsed { 0.0 } else { 5.0 },
                conv_value: if collapsed { 30.0 } else { 150.0 },
                clicks: 60.0,
                impressions: 1200.0,
            },
        );
        store.push_point(
            EntityKind::Campaign,
            MetricPoint {
                entity_id: "cmp-steady".to_string(),
                date: day(offset),
                cost: 40.0,
                conversions: 4.0,
                conv_value: 120.0,
                clicks: 50.0,
                impressions: 1000.0,
            },
        );
        store.push_point(
            EntityKind::Product,
            MetricPoint {
                entity_id: "sku-1".to_string(),
                date: day(offset),
                cost: 20.0,
                conversions: 2.0,
                conv_value: 60.0,
                clicks: if collapsed { 5.0 } else { 50.0 },
                impressions: 1000.0,
            },
        );
    }
    store.set_entity_type("cmp-decline", "SEARCH");

    store.push_search_term(
        "cmp-decline",
        day(1),
        SearchTermRow {
            term: "free cheap deal".to_string(),
            match_type: "Broad".to_string(),
            cost: 85.0,
            conversions: 0.0,
            clicks: 40.0,
        },
    );
    store.push_product_cost(
        day(1),
        ProductCostRow {
            item_id: "sku-1".to_string(),
            title: "Flagship Widget".to_string(),
            cost: 90.0,
            clicks: 200.0,
        },
    );
    store.push_product_cost(
        day(1),
        ProductCostRow {
            item_id: "sku-2".to_string(),
            title: "Budget Widget".to_string(),
            cost: 8.0,
            clicks: 30.0,
        },
    );

    store
}

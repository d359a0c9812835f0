use crate::infra::{build_availability, load_catalog};
use clap::Args;
use commumap::availability::{
    ActorId, AlertStore, AuditRecorder, CategoryType, ChannelRoute, Coordinate,
    InMemoryServiceStore, SearchCriteria, SearchHit, SearchRankingEngine, ServiceRecord,
    ServiceStore, StrategyRegistry,
};
use commumap::config::{AppConfig, FeatureFlagProvider, StaticFeatureFlags};
use commumap::error::AppError;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// CSV catalog to seed the demo with (defaults to the bundled sample)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Notification route as CHANNEL:RECIPIENT; repeatable
    #[arg(long = "notify", value_parser = crate::infra::parse_route)]
    pub(crate) routes: Vec<ChannelRoute>,
    /// Skip the emergency search at the end of the demo
    #[arg(long)]
    pub(crate) skip_search: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// CSV catalog to rank (defaults to the bundled sample)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Free-text query matched against name, description, tags and address
    #[arg(long)]
    pub(crate) query: Option<String>,
    /// Latitude of the searcher
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub(crate) lat: Option<f64>,
    /// Longitude of the searcher
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub(crate) lon: Option<f64>,
    /// Maximum distance in kilometres
    #[arg(long)]
    pub(crate) radius_km: Option<f64>,
    /// Restrict to one category slug (e.g. shelter, food)
    #[arg(long, value_parser = parse_category)]
    pub(crate) category: Option<CategoryType>,
    /// Ranking strategy name
    #[arg(long, default_value = "smart")]
    pub(crate) strategy: String,
    /// Only emergency services
    #[arg(long)]
    pub(crate) emergency_only: bool,
    /// Keep full services in availability ranking
    #[arg(long)]
    pub(crate) include_full: bool,
    /// Maximum number of results to print
    #[arg(long, default_value_t = 10)]
    pub(crate) limit: usize,
}

fn parse_category(raw: &str) -> Result<CategoryType, String> {
    CategoryType::from_str(raw).map_err(|err| err.to_string())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        catalog,
        routes,
        skip_search,
    } = args;

    let config = AppConfig::load()?;
    let records = load_catalog(catalog.as_deref())?;
    let availability = build_availability(&config, records, routes)?;
    let engine = &availability.state.engine;

    println!("CommuMap availability demo");
    println!(
        "- {} services loaded | emergency mode {}",
        availability.store.len(),
        if availability.flags.emergency_mode() {
            "ON"
        } else {
            "off"
        }
    );

    let Some(shelter) = pick_tracked_service(&availability.store)? else {
        println!("  No service in the catalog tracks capacity; nothing to demo.");
        return Ok(());
    };
    let Some(max) = shelter.max_capacity else {
        return Ok(());
    };
    let manager = ActorId("demo-manager".to_string());

    println!(
        "\nCapacity walk for {} ({}/{} {})",
        shelter.name,
        shelter.current_capacity,
        max,
        shelter.capacity_band().label()
    );
    let nearly_full = i64::from(max) * 85 / 100;
    for target in [nearly_full, i64::from(max)] {
        let outcome = match engine.update_capacity(&shelter.id, target, &manager).await {
            Ok(outcome) => outcome,
            Err(err) => {
                println!("  Update to {target} rejected: {err}");
                return Ok(());
            }
        };
        println!(
            "- capacity -> {} | status {} | version {}",
            outcome.record.current_capacity,
            outcome.record.status.label(),
            outcome.record.version
        );
        for event in &outcome.events {
            println!("    event: {}", event.message);
        }
    }

    match availability
        .alerts
        .active_for(&shelter.id, chrono::Utc::now())
    {
        Ok(alerts) => {
            println!("\nActive alerts ({})", alerts.len());
            for alert in &alerts {
                println!(
                    "  - [{}] {} | {}",
                    alert.priority_label(),
                    alert.title,
                    alert.message
                );
            }
        }
        Err(err) => println!("\nAlerts unavailable: {err}"),
    }

    match availability.audit.entries_for(&shelter.id) {
        Ok(entries) => {
            println!("\nAudit trail ({} entries)", entries.len());
            for entry in &entries {
                println!(
                    "  - {} by {}: {}",
                    entry.action.label(),
                    entry.actor,
                    entry.description
                );
            }
        }
        Err(err) => println!("\nAudit trail unavailable: {err}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "\nChannel deliveries: {} sent, {} failed",
        availability.ledger.delivered(),
        availability.ledger.failures().len()
    );

    if skip_search {
        return Ok(());
    }

    println!("\nEmergency services near {}", shelter.name);
    let criteria = SearchCriteria {
        origin: Some(shelter.location),
        emergency_only: true,
        limit: Some(5),
        ..SearchCriteria::default()
    };
    match availability.state.search.search(&criteria) {
        Ok(hits) => render_hits(&hits),
        Err(err) => println!("  Search unavailable: {err}"),
    }

    Ok(())
}

fn pick_tracked_service(store: &InMemoryServiceStore) -> Result<Option<ServiceRecord>, AppError> {
    let records = store.list()?;
    let preferred = records
        .iter()
        .find(|record| {
            record.is_emergency_service && record.max_capacity.is_some_and(|max| max > 0)
        })
        .or_else(|| {
            records
                .iter()
                .find(|record| record.max_capacity.is_some_and(|max| max > 0))
        })
        .cloned();
    Ok(preferred)
}

pub(crate) fn run_search(args: SearchArgs) -> Result<(), AppError> {
    let origin = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => match Coordinate::new(lat, lon) {
            Ok(origin) => Some(origin),
            Err(err) => {
                println!("Search failed: {err}");
                return Ok(());
            }
        },
        _ => None,
    };

    let records = load_catalog(args.catalog.as_deref())?;
    let store = Arc::new(InMemoryServiceStore::with_records(records)?);
    let engine = SearchRankingEngine::new(
        store,
        StrategyRegistry::with_defaults(),
        Arc::new(StaticFeatureFlags::default()),
    );

    let criteria = SearchCriteria {
        query: args.query,
        origin,
        max_distance_km: args.radius_km,
        category: args.category,
        emergency_only: args.emergency_only,
        include_full: args.include_full,
        limit: Some(args.limit),
        ..SearchCriteria::default()
    };

    match engine.search_with(&args.strategy, &criteria) {
        Ok(hits) => {
            println!("{} results ({} strategy)", hits.len(), args.strategy);
            render_hits(&hits);
        }
        Err(err) => println!("Search failed: {err}"),
    }
    Ok(())
}

fn render_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("  (no matches)");
    }
    for (rank, hit) in hits.iter().enumerate() {
        let distance = hit
            .distance_km
            .map(|km| format!("{km:.1} km"))
            .unwrap_or_else(|| "-".to_string());
        let score = hit
            .score
            .map(|score| format!("{:.2}", score.composite))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}. {} [{}] | {} | {} | score {}",
            rank + 1,
            hit.record.name,
            hit.record.status.label(),
            hit.record.category.label(),
            distance,
            score
        );
    }
}

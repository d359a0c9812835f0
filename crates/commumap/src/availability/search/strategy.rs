use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::scoring::ScoreBreakdown;
use super::{SearchCriteria, SearchError, SearchHit};
use crate::availability::domain::{ServiceRecord, ServiceStatus};
use crate::availability::geo::distance_km;

pub const DEFAULT_STRATEGY: &str = "smart";
const EMERGENCY_DEFAULT_RADIUS_KM: f64 = 5.0;

/// One named ranking policy. Receives candidates already narrowed by the
/// listing and emergency filters.
pub trait RankingStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit>;
}

/// Named strategies available to the search engine.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn RankingStrategy>>,
    default_name: String,
}

impl StrategyRegistry {
    pub fn empty(default_name: impl Into<String>) -> Self {
        Self {
            strategies: BTreeMap::new(),
            default_name: default_name.into(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty(DEFAULT_STRATEGY);
        registry.register(Arc::new(BasicTextStrategy));
        registry.register(Arc::new(GeographicStrategy));
        registry.register(Arc::new(CategoryStrategy));
        registry.register(Arc::new(EmergencyStrategy));
        registry.register(Arc::new(AvailabilityStrategy));
        registry.register(Arc::new(SmartStrategy));
        registry
    }

    /// Add or replace a strategy under its own name.
    pub fn register(
        &mut self,
        strategy: Arc<dyn RankingStrategy>,
    ) -> Option<Arc<dyn RankingStrategy>> {
        self.strategies.insert(strategy.name().to_string(), strategy)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RankingStrategy>, SearchError> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| SearchError::UnknownStrategy {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn default_strategy(&self) -> Result<Arc<dyn RankingStrategy>, SearchError> {
        self.get(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.strategies
            .values()
            .map(|strategy| {
                (
                    strategy.name().to_string(),
                    strategy.description().to_string(),
                )
            })
            .collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn normalized_query(criteria: &SearchCriteria) -> Option<String> {
    criteria
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(str::to_lowercase)
}

fn matches_query(record: &ServiceRecord, query: Option<&str>) -> bool {
    query.map_or(true, |query| record.search_blob.contains(query))
}

fn distance_from_origin(record: &ServiceRecord, criteria: &SearchCriteria) -> Option<f64> {
    criteria
        .origin
        .map(|origin| distance_km(origin, record.location))
}

fn within(distance: Option<f64>, radius: Option<f64>) -> bool {
    match (distance, radius) {
        (Some(distance), Some(radius)) => distance <= radius,
        _ => true,
    }
}

fn by_name_then_id(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.record
        .name
        .cmp(&b.record.name)
        .then_with(|| a.record.id.cmp(&b.record.id))
}

fn plain_hit(record: ServiceRecord, distance_km: Option<f64>) -> SearchHit {
    SearchHit {
        record,
        distance_km,
        score: None,
    }
}

/// Case-insensitive substring match, alphabetical.
pub struct BasicTextStrategy;

impl RankingStrategy for BasicTextStrategy {
    fn name(&self) -> &str {
        "basic"
    }

    fn description(&self) -> &str {
        "Text match over name, description, tags and address, ordered by name"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let query = normalized_query(criteria);
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| matches_query(record, query.as_deref()))
            .map(|record| {
                let distance = distance_from_origin(&record, criteria);
                plain_hit(record, distance)
            })
            .collect();
        hits.sort_by(by_name_then_id);
        hits
    }
}

/// Radius filter, nearest first.
pub struct GeographicStrategy;

impl RankingStrategy for GeographicStrategy {
    fn name(&self) -> &str {
        "geographic"
    }

    fn description(&self) -> &str {
        "Services within the search radius, nearest first"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|record| {
                let distance = distance_from_origin(&record, criteria);
                within(distance, criteria.max_distance_km).then(|| plain_hit(record, distance))
            })
            .collect();

        hits.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(left), Some(right)) => left.total_cmp(&right).then_with(|| by_name_then_id(a, b)),
            _ => by_name_then_id(a, b),
        });
        hits
    }
}

/// Category filter, best rated first.
pub struct CategoryStrategy;

impl RankingStrategy for CategoryStrategy {
    fn name(&self) -> &str {
        "category"
    }

    fn description(&self) -> &str {
        "Services in one category, highest quality first"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| criteria.category.map_or(true, |c| record.category == c))
            .map(|record| {
                let distance = distance_from_origin(&record, criteria);
                plain_hit(record, distance)
            })
            .collect();
        hits.sort_by(|a, b| {
            b.record
                .quality_score
                .total_cmp(&a.record.quality_score)
                .then_with(|| by_name_then_id(a, b))
        });
        hits
    }
}

/// Emergency services able to take someone right now.
pub struct EmergencyStrategy;

impl EmergencyStrategy {
    fn status_priority(status: ServiceStatus) -> u8 {
        match status {
            ServiceStatus::EmergencyOnly => 3,
            ServiceStatus::Open => 2,
            ServiceStatus::Limited => 1,
            _ => 0,
        }
    }
}

impl RankingStrategy for EmergencyStrategy {
    fn name(&self) -> &str {
        "emergency"
    }

    fn description(&self) -> &str {
        "Emergency services currently accepting people, nearest and most urgent first"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let radius = criteria
            .origin
            .map(|_| criteria.max_distance_km.unwrap_or(EMERGENCY_DEFAULT_RADIUS_KM));

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| {
                record.is_emergency_service
                    && matches!(
                        record.status,
                        ServiceStatus::Open | ServiceStatus::Limited | ServiceStatus::EmergencyOnly
                    )
            })
            .filter_map(|record| {
                let distance = distance_from_origin(&record, criteria);
                within(distance, radius).then(|| plain_hit(record, distance))
            })
            .collect();

        if criteria.origin.is_some() {
            hits.sort_by(|a, b| {
                Self::status_priority(b.record.status)
                    .cmp(&Self::status_priority(a.record.status))
                    .then_with(|| {
                        let left = a.distance_km.unwrap_or(f64::INFINITY);
                        let right = b.distance_km.unwrap_or(f64::INFINITY);
                        left.total_cmp(&right)
                    })
                    .then_with(|| by_name_then_id(a, b))
            });
        } else {
            hits.sort_by(|a, b| {
                b.record
                    .quality_score
                    .total_cmp(&a.record.quality_score)
                    .then_with(|| by_name_then_id(a, b))
            });
        }
        hits
    }
}

/// Services with room, most available first.
pub struct AvailabilityStrategy;

impl AvailabilityStrategy {
    fn availability_rank(status: ServiceStatus) -> u8 {
        match status {
            ServiceStatus::Open => 4,
            ServiceStatus::Limited => 3,
            ServiceStatus::EmergencyOnly => 2,
            ServiceStatus::Full => 1,
            ServiceStatus::Closed | ServiceStatus::TemporarilyClosed => 0,
        }
    }

    fn headroom_rank(record: &ServiceRecord) -> u8 {
        match record.capacity_percentage() {
            None => 2,
            Some(pct) if pct < 50.0 => 4,
            Some(pct) if pct < 80.0 => 3,
            Some(pct) if pct < 100.0 => 2,
            Some(_) => 1,
        }
    }
}

impl RankingStrategy for AvailabilityStrategy {
    fn name(&self) -> &str {
        "availability"
    }

    fn description(&self) -> &str {
        "Open services with free capacity first"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| match record.status {
                ServiceStatus::Closed | ServiceStatus::TemporarilyClosed => false,
                ServiceStatus::Full => criteria.include_full,
                _ => true,
            })
            .map(|record| {
                let distance = distance_from_origin(&record, criteria);
                plain_hit(record, distance)
            })
            .collect();

        hits.sort_by(|a, b| {
            Self::availability_rank(b.record.status)
                .cmp(&Self::availability_rank(a.record.status))
                .then_with(|| Self::headroom_rank(&b.record).cmp(&Self::headroom_rank(&a.record)))
                .then_with(|| b.record.quality_score.total_cmp(&a.record.quality_score))
                .then_with(|| by_name_then_id(a, b))
        });
        hits
    }
}

/// Combined filters with the weighted multi-signal composite.
pub struct SmartStrategy;

impl RankingStrategy for SmartStrategy {
    fn name(&self) -> &str {
        "smart"
    }

    fn description(&self) -> &str {
        "Weighted blend of text relevance, distance, availability, quality and emergency need"
    }

    fn rank(&self, candidates: Vec<ServiceRecord>, criteria: &SearchCriteria) -> Vec<SearchHit> {
        let query = normalized_query(criteria);

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| matches_query(record, query.as_deref()))
            .filter(|record| criteria.category.map_or(true, |c| record.category == c))
            .filter(|record| !criteria.emergency_only || record.is_emergency_service)
            .filter_map(|record| {
                let distance = distance_from_origin(&record, criteria);
                if !within(distance, criteria.max_distance_km) {
                    return None;
                }
                let score = ScoreBreakdown::compute(
                    &record,
                    query.is_some(),
                    distance,
                    criteria.emergency_only,
                );
                Some(SearchHit {
                    record,
                    distance_km: distance,
                    score: Some(score),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            let left = a.score.map_or(0.0, |score| score.composite);
            let right = b.score.map_or(0.0, |score| score.composite);
            right.total_cmp(&left).then_with(|| by_name_then_id(a, b))
        });
        hits
    }
}

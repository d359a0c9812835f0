//! Discovery ranking over committed store state.

pub mod scoring;
mod strategy;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{CategoryType, ServiceRecord};
use super::geo::Coordinate;
use super::store::{ServiceStore, StoreError};
use crate::config::FeatureFlagProvider;

pub use scoring::ScoreBreakdown;
pub use strategy::{
    AvailabilityStrategy, BasicTextStrategy, CategoryStrategy, EmergencyStrategy,
    GeographicStrategy, RankingStrategy, SmartStrategy, StrategyRegistry, DEFAULT_STRATEGY,
};

/// Filters and paging for one search; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub query: Option<String>,
    pub origin: Option<Coordinate>,
    pub max_distance_km: Option<f64>,
    pub category: Option<CategoryType>,
    pub emergency_only: bool,
    /// Keep Full services in availability ranking.
    pub include_full: bool,
    /// Also consider inactive or unverified listings.
    pub include_unlisted: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub record: ServiceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("unknown search strategy '{name}' (available: {})", available.join(", "))]
    UnknownStrategy {
        name: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only search over the store, ranked by a named strategy.
pub struct SearchRankingEngine<S> {
    store: Arc<S>,
    registry: StrategyRegistry,
    flags: Arc<dyn FeatureFlagProvider>,
}

impl<S> SearchRankingEngine<S>
where
    S: ServiceStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        registry: StrategyRegistry,
        flags: Arc<dyn FeatureFlagProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            flags,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Rank with the default strategy.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>, SearchError> {
        let strategy = self.registry.default_strategy()?;
        self.run(strategy.as_ref(), criteria)
    }

    pub fn search_with(
        &self,
        strategy_name: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let strategy = self.registry.get(strategy_name)?;
        self.run(strategy.as_ref(), criteria)
    }

    fn run(
        &self,
        strategy: &dyn RankingStrategy,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut effective = criteria.clone();
        if self.flags.emergency_mode() {
            effective.emergency_only = true;
        }

        let candidates: Vec<ServiceRecord> = self
            .store
            .list()?
            .into_iter()
            .filter(|record| effective.include_unlisted || record.is_listed())
            .filter(|record| !effective.emergency_only || record.is_emergency_service)
            .collect();
        let considered = candidates.len();

        let ranked = strategy.rank(candidates, &effective);
        let total = ranked.len();
        let page: Vec<SearchHit> = ranked
            .into_iter()
            .skip(effective.offset)
            .take(effective.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::debug!(
            strategy = strategy.name(),
            emergency_only = effective.emergency_only,
            considered,
            matched = total,
            returned = page.len(),
            "search ranked"
        );
        Ok(page)
    }
}

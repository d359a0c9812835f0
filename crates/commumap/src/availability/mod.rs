//! Service availability: status/capacity transitions, observer fan-out, alerting
//! and discovery ranking.

pub mod alerts;
pub mod audit;
pub mod catalog;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod events;
pub mod geo;
pub mod memory;
pub mod onboarding;
pub mod router;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod tests;

pub use alerts::{Alert, AlertDecision, AlertFactory, AlertPolicy, AlertStore, AlertStoreError, AlertType};
pub use audit::{AuditAction, AuditEntry, AuditError, AuditRecorder};
pub use catalog::{CatalogError, CatalogImporter};
pub use dispatch::{
    AlertObserver, AuditObserver, Channel, ChannelObserver, ChannelRoute, ChannelSendError,
    ChannelSender, ChannelWorker, DeliveryLedger, DispatchReport, NotificationDispatcher,
    Observer, ObserverError, ObserverId, ObserverOutcome, RetryPolicy,
};
pub use domain::{
    ActorId, CapacityBand, CategoryType, ServiceId, ServiceRecord, ServiceStatus,
};
pub use engine::{StatusTransitionEngine, TransitionError, TransitionOutcome};
pub use events::{ChangeEvent, ChangeType, ChangeValue};
pub use geo::{distance_km, Coordinate, CoordinateError};
pub use memory::{InMemoryAlertStore, InMemoryAuditRecorder, InMemoryServiceStore};
pub use onboarding::{OnboardingError, ServiceDraft, ServiceFactory, ServiceFactoryRegistry};
pub use router::{availability_router, AvailabilityState};
pub use search::{
    RankingStrategy, ScoreBreakdown, SearchCriteria, SearchError, SearchHit,
    SearchRankingEngine, StrategyRegistry,
};
pub use store::{Commit, ServiceStore, StoreError};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::availability::alerts::AlertStore;
use crate::availability::dispatch::{
    AlertObserver, AuditObserver, NotificationDispatcher, Observer, ObserverError,
};
use crate::availability::domain::{CategoryType, ServiceId, ServiceRecord, ServiceStatus};
use crate::availability::engine::StatusTransitionEngine;
use crate::availability::events::ChangeEvent;
use crate::availability::geo::Coordinate;
use crate::availability::memory::{InMemoryAlertStore, InMemoryAuditRecorder, InMemoryServiceStore};
use crate::availability::router::{availability_router, AvailabilityState};
use crate::availability::search::{SearchRankingEngine, StrategyRegistry};
use crate::availability::store::{ServiceStore, StoreError};
use crate::config::{EngineConfig, StaticFeatureFlags};

/// Downtown Kuala Lumpur.
pub(crate) fn origin() -> Coordinate {
    Coordinate::new(3.1390, 101.6869).expect("valid origin")
}

/// Listed, open record near `origin()`.
pub(crate) fn record_with_capacity(id: &str, current: u32, max: Option<u32>) -> ServiceRecord {
    let mut record = ServiceRecord {
        id: ServiceId(id.to_string()),
        name: format!("Service {id}"),
        description: "Community drop-in centre".to_string(),
        category: CategoryType::Shelter,
        tags: vec!["shelter".to_string()],
        address: "1 Jalan Test".to_string(),
        city: "Kuala Lumpur".to_string(),
        location: origin(),
        current_capacity: current,
        max_capacity: max,
        status: ServiceStatus::Open,
        is_emergency_service: false,
        is_verified: true,
        is_active: true,
        accepts_walk_ins: true,
        requires_appointment: false,
        is_24_7: false,
        quality_score: 3.0,
        total_ratings: 4,
        status_updated_by: None,
        status_updated_at: None,
        capacity_last_updated_at: None,
        verified_by: None,
        verified_at: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).single().expect("valid date"),
        version: 0,
        search_blob: String::new(),
    };
    record.refresh_search_blob();
    record
}

/// Listed record placed at an explicit point with a given name and status.
pub(crate) fn placed(
    id: &str,
    name: &str,
    latitude: f64,
    longitude: f64,
    status: ServiceStatus,
) -> ServiceRecord {
    let mut record = record_with_capacity(id, 0, None);
    record.name = name.to_string();
    record.location = Coordinate::new(latitude, longitude).expect("valid coordinate");
    record.status = status;
    record.refresh_search_blob();
    record
}

pub(crate) struct Harness {
    pub(crate) engine: Arc<StatusTransitionEngine<InMemoryServiceStore>>,
    pub(crate) store: Arc<InMemoryServiceStore>,
    pub(crate) dispatcher: Arc<NotificationDispatcher>,
    pub(crate) audit: Arc<InMemoryAuditRecorder>,
    pub(crate) alerts: Arc<InMemoryAlertStore>,
}

pub(crate) fn harness(records: Vec<ServiceRecord>) -> Harness {
    let store = Arc::new(InMemoryServiceStore::with_records(records).expect("seed store"));
    let dispatcher = Arc::new(NotificationDispatcher::new(Duration::from_millis(500)));
    let audit = Arc::new(InMemoryAuditRecorder::default());
    let alerts = Arc::new(InMemoryAlertStore::default());
    dispatcher.subscribe(Arc::new(AuditObserver::new(audit.clone())));
    dispatcher.subscribe(Arc::new(AlertObserver::new(alerts.clone())));
    let engine = Arc::new(StatusTransitionEngine::new(
        store.clone(),
        dispatcher.clone(),
        EngineConfig::default(),
    ));
    Harness {
        engine,
        store,
        dispatcher,
        audit,
        alerts,
    }
}

pub(crate) fn search_engine(
    store: Arc<InMemoryServiceStore>,
    emergency_mode: bool,
) -> SearchRankingEngine<InMemoryServiceStore> {
    SearchRankingEngine::new(
        store,
        StrategyRegistry::with_defaults(),
        Arc::new(StaticFeatureFlags { emergency_mode }),
    )
}

pub(crate) fn router_for(harness: &Harness) -> axum::Router {
    let alerts: Arc<dyn AlertStore> = harness.alerts.clone();
    availability_router(Arc::new(AvailabilityState {
        engine: harness.engine.clone(),
        search: Arc::new(search_engine(harness.store.clone(), false)),
        alerts,
    }))
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }
}

impl Observer for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), ObserverError> {
        self.events
            .lock()
            .expect("observer mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(crate) struct FailingObserver;

impl Observer for FailingObserver {
    fn name(&self) -> &str {
        "failing"
    }

    fn handle(&self, _event: &ChangeEvent) -> Result<(), ObserverError> {
        Err(ObserverError::Other("sink offline".to_string()))
    }
}

pub(crate) struct PanickingObserver;

impl Observer for PanickingObserver {
    fn name(&self) -> &str {
        "panicking"
    }

    fn handle(&self, _event: &ChangeEvent) -> Result<(), ObserverError> {
        panic!("observer exploded");
    }
}

pub(crate) struct SlowObserver(pub(crate) Duration);

impl Observer for SlowObserver {
    fn name(&self) -> &str {
        "slow"
    }

    fn handle(&self, _event: &ChangeEvent) -> Result<(), ObserverError> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

pub(crate) struct UnavailableStore;

impl ServiceStore for UnavailableStore {
    fn get(&self, _id: &ServiceId) -> Result<Option<ServiceRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<ServiceRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _record: ServiceRecord) -> Result<ServiceRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn compare_and_swap(
        &self,
        _expected_version: u64,
        _next: ServiceRecord,
    ) -> Result<ServiceRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

/// Lets a rival writer bump the record before each of the first `interference` swaps.
pub(crate) struct ContendedStore {
    pub(crate) inner: InMemoryServiceStore,
    interference: AtomicU32,
}

impl ContendedStore {
    pub(crate) fn new(record: ServiceRecord, interference: u32) -> Self {
        Self {
            inner: InMemoryServiceStore::with_records([record]).expect("seed store"),
            interference: AtomicU32::new(interference),
        }
    }
}

impl ServiceStore for ContendedStore {
    fn get(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StoreError> {
        self.inner.get(id)
    }

    fn list(&self) -> Result<Vec<ServiceRecord>, StoreError> {
        self.inner.list()
    }

    fn insert(&self, record: ServiceRecord) -> Result<ServiceRecord, StoreError> {
        self.inner.insert(record)
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: ServiceRecord,
    ) -> Result<ServiceRecord, StoreError> {
        let remaining = self.interference.load(Ordering::SeqCst);
        if remaining > 0 {
            self.interference.store(remaining - 1, Ordering::SeqCst);
            let rival = self
                .inner
                .get(&next.id)?
                .ok_or_else(|| StoreError::NotFound(next.id.clone()))?;
            let mut bumped = rival.clone();
            bumped.total_ratings += 1;
            self.inner.compare_and_swap(rival.version, bumped)?;
        }
        self.inner.compare_and_swap(expected_version, next)
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

//! In-memory collaborators used by the API service, the demo and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use super::alerts::{Alert, AlertStore, AlertStoreError};
use super::audit::{AuditEntry, AuditError, AuditRecorder};
use super::domain::{ServiceId, ServiceRecord};
use super::store::{ServiceStore, StoreError};

type Slot = Arc<ArcSwap<ServiceRecord>>;

/// Lock-free record store: an `ArcSwap` index of per-record `ArcSwap` slots.
#[derive(Default)]
pub struct InMemoryServiceStore {
    index: ArcSwap<HashMap<ServiceId, Slot>>,
}

impl InMemoryServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ServiceRecord>) -> Result<Self, StoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &ServiceId) -> Option<Slot> {
        self.index.load().get(id).cloned()
    }
}

impl ServiceStore for InMemoryServiceStore {
    fn get(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StoreError> {
        Ok(self.slot(id).map(|slot| ServiceRecord::clone(&slot.load())))
    }

    fn list(&self) -> Result<Vec<ServiceRecord>, StoreError> {
        let index = self.index.load();
        let mut records: Vec<ServiceRecord> = index
            .values()
            .map(|slot| ServiceRecord::clone(&slot.load()))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn insert(&self, mut record: ServiceRecord) -> Result<ServiceRecord, StoreError> {
        record.version = 1;
        loop {
            let current = self.index.load_full();
            if current.contains_key(&record.id) {
                return Err(StoreError::AlreadyExists(record.id.clone()));
            }
            let mut next = HashMap::clone(&current);
            next.insert(
                record.id.clone(),
                Arc::new(ArcSwap::from_pointee(record.clone())),
            );
            let prev = self.index.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&prev, &current) {
                return Ok(record);
            }
        }
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        next: ServiceRecord,
    ) -> Result<ServiceRecord, StoreError> {
        let slot = self
            .slot(&next.id)
            .ok_or_else(|| StoreError::NotFound(next.id.clone()))?;

        let current = slot.load_full();
        if current.version != expected_version {
            return Err(StoreError::Conflict {
                service_id: next.id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut committed = next;
        committed.version = expected_version + 1;
        let committed = Arc::new(committed);
        let prev = slot.compare_and_swap(&current, Arc::clone(&committed));
        if Arc::ptr_eq(&prev, &current) {
            Ok(ServiceRecord::clone(&committed))
        } else {
            Err(StoreError::Conflict {
                service_id: committed.id.clone(),
                expected: expected_version,
                actual: prev.version,
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditRecorder {
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditRecorder for InMemoryAuditRecorder {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }

    fn entries_for(&self, service_id: &ServiceId) -> Result<Vec<AuditEntry>, AuditError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|entry| entry.service_id().as_ref() == Some(service_id))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertStore {
    pub fn all(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AlertStore for InMemoryAlertStore {
    fn persist(&self, alert: Alert) -> Result<Alert, AlertStoreError> {
        let mut guard = self
            .alerts
            .lock()
            .map_err(|_| AlertStoreError::Unavailable("alert store lock poisoned".to_string()))?;
        guard.push(alert.clone());
        Ok(alert)
    }

    /// Current alerts, highest priority first.
    fn active_for(
        &self,
        service_id: &ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, AlertStoreError> {
        let guard = self
            .alerts
            .lock()
            .map_err(|_| AlertStoreError::Unavailable("alert store lock poisoned".to_string()))?;
        let mut active: Vec<Alert> = guard
            .iter()
            .filter(|alert| &alert.service_id == service_id && alert.is_current(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.start_time.cmp(&a.start_time))
        });
        Ok(active)
    }

    fn close(&self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert, AlertStoreError> {
        let mut guard = self
            .alerts
            .lock()
            .map_err(|_| AlertStoreError::Unavailable("alert store lock poisoned".to_string()))?;
        let alert = guard
            .iter_mut()
            .find(|alert| alert.id == alert_id)
            .ok_or_else(|| AlertStoreError::NotFound(alert_id.to_string()))?;
        alert.close(now);
        Ok(alert.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::alerts::AlertFactory;
    use crate::availability::domain::ActorId;
    use crate::availability::events::{ChangeEvent, ChangeType, ChangeValue};
    use crate::availability::tests::common::record_with_capacity;

    #[test]
    fn audit_entries_survive_a_poisoned_lock() {
        let recorder = Arc::new(InMemoryAuditRecorder::default());
        let record = Arc::new(record_with_capacity("svc-1", 5, Some(10)));
        let event = ChangeEvent::new(
            &record,
            ChangeType::Capacity,
            ChangeValue::Capacity(4),
            ChangeValue::Capacity(5),
            ActorId("manager-1".to_string()),
            Utc::now(),
        );
        recorder
            .append(AuditEntry::from_event(&event))
            .expect("append succeeds");

        let poisoner = recorder.clone();
        let outcome = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().expect("first lock");
            panic!("poison the audit log");
        })
        .join();
        assert!(outcome.is_err());

        assert_eq!(recorder.entries().len(), 1);
    }

    #[test]
    fn alert_listing_survives_a_poisoned_lock() {
        let store = Arc::new(InMemoryAlertStore::default());
        let record = record_with_capacity("svc-1", 0, None);
        store
            .persist(AlertFactory.emergency_alert(&record, "evacuate", None, Utc::now()))
            .expect("persist succeeds");

        let poisoner = store.clone();
        let outcome = std::thread::spawn(move || {
            let _guard = poisoner.alerts.lock().expect("first lock");
            panic!("poison the alert store");
        })
        .join();
        assert!(outcome.is_err());

        assert_eq!(store.all().len(), 1);
    }
}

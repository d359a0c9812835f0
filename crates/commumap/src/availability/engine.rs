use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::dispatch::NotificationDispatcher;
use super::domain::{ActorId, ServiceId, ServiceRecord, ServiceStatus};
use super::events::{ChangeEvent, ChangeType, ChangeValue};
use super::store::{ServiceStore, StoreError};
use crate::config::EngineConfig;

/// Committed record plus the events emitted for it, in emission order.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: ServiceRecord,
    pub events: Vec<Arc<ChangeEvent>>,
}

impl TransitionOutcome {
    pub fn primary_event(&self) -> Option<&ChangeEvent> {
        self.events.first().map(Arc::as_ref)
    }
}

/// Why a capacity, status or flag change was not committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("service {0} not found")]
    NotFound(ServiceId),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("service {service_id} is being updated concurrently ({attempts} attempts)")]
    Conflict { service_id: ServiceId, attempts: u32 },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransitionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::RetriesExhausted {
                service_id,
                attempts,
            } => Self::Conflict {
                service_id,
                attempts,
            },
            other => Self::Store(other),
        }
    }
}

/// Pending event recorded by a pure transition, materialised once the commit lands.
#[derive(Debug, Clone, Copy)]
struct Change {
    change_type: ChangeType,
    old: ChangeValue,
    new: ChangeValue,
}

/// Single writer of service status, capacity and moderation flags.
pub struct StatusTransitionEngine<S> {
    store: Arc<S>,
    dispatcher: Arc<NotificationDispatcher>,
    config: EngineConfig,
}

impl<S> StatusTransitionEngine<S>
where
    S: ServiceStore + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<NotificationDispatcher>, config: EngineConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn get(&self, id: &ServiceId) -> Result<ServiceRecord, TransitionError> {
        self.store
            .get(id)?
            .ok_or_else(|| TransitionError::NotFound(id.clone()))
    }

    /// Set the occupancy count and derive Full/Open from it.
    pub async fn update_capacity(
        &self,
        id: &ServiceId,
        new_capacity: i64,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, TransitionError> {
        let new_capacity = u32::try_from(new_capacity).map_err(|_| {
            TransitionError::InvalidInput(format!(
                "capacity must be between 0 and {} (got {new_capacity})",
                u32::MAX
            ))
        })?;

        self.transition(id, actor, |current, now| {
            Ok(apply_capacity(current, new_capacity, actor, now))
        })
        .await
    }

    /// Set the operational status. Always emits one status event.
    pub async fn update_status(
        &self,
        id: &ServiceId,
        new_status: ServiceStatus,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.transition(id, actor, |current, now| {
            Ok(apply_status(current, new_status, actor, now))
        })
        .await
    }

    /// Parse a status supplied by a caller at the edge, then apply it.
    pub async fn update_status_named(
        &self,
        id: &ServiceId,
        raw_status: &str,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, TransitionError> {
        let status = raw_status
            .parse::<ServiceStatus>()
            .map_err(|err| TransitionError::InvalidTransition(err.to_string()))?;
        self.update_status(id, status, actor).await
    }

    /// Mark a service verified. A second call is a no-op without events.
    pub async fn verify(
        &self,
        id: &ServiceId,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.transition(id, actor, |current, now| {
            let mut next = current.clone();
            let mut changes = Vec::new();
            if !current.is_verified {
                next.is_verified = true;
                next.verified_by = Some(actor.clone());
                next.verified_at = Some(now);
                changes.push(Change {
                    change_type: ChangeType::Verification,
                    old: ChangeValue::Flag(false),
                    new: ChangeValue::Flag(true),
                });
            }
            Ok((next, changes))
        })
        .await
    }

    pub async fn set_active(
        &self,
        id: &ServiceId,
        active: bool,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.transition(id, actor, |current, _now| {
            let mut next = current.clone();
            let mut changes = Vec::new();
            if current.is_active != active {
                next.is_active = active;
                changes.push(Change {
                    change_type: ChangeType::Activation,
                    old: ChangeValue::Flag(current.is_active),
                    new: ChangeValue::Flag(active),
                });
            }
            Ok((next, changes))
        })
        .await
    }

    async fn transition<F>(
        &self,
        id: &ServiceId,
        actor: &ActorId,
        mut apply: F,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        F: FnMut(
            &ServiceRecord,
            DateTime<Utc>,
        ) -> Result<(ServiceRecord, Vec<Change>), TransitionError>,
    {
        let committed = self
            .store
            .commit(id, self.config.conflict_retries, |current| {
                let now = Utc::now();
                apply(current, now).map(|(next, changes)| (next, (changes, now)))
            })
            .inspect_err(|err| {
                tracing::warn!(service_id = %id, error = %err, "transition rejected");
            })?;

        let record = Arc::new(committed.after);
        let (changes, timestamp) = committed.output;
        let events: Vec<Arc<ChangeEvent>> = changes
            .into_iter()
            .map(|change| {
                Arc::new(ChangeEvent::new(
                    &record,
                    change.change_type,
                    change.old,
                    change.new,
                    actor.clone(),
                    timestamp,
                ))
            })
            .collect();

        if !events.is_empty() {
            tracing::info!(
                service_id = %record.id,
                actor = %actor,
                version = record.version,
                events = events.len(),
                "transition committed"
            );
        }

        for event in &events {
            let report = self.dispatcher.publish(Arc::clone(event)).await;
            if !report.all_delivered() {
                tracing::warn!(
                    service_id = %record.id,
                    event_id = %report.event_id,
                    failed = report.failed(),
                    "some observers did not handle the event"
                );
            }
        }

        Ok(TransitionOutcome {
            record: ServiceRecord::clone(&record),
            events,
        })
    }
}

fn apply_capacity(
    current: &ServiceRecord,
    new_capacity: u32,
    actor: &ActorId,
    now: DateTime<Utc>,
) -> (ServiceRecord, Vec<Change>) {
    let mut next = current.clone();
    next.current_capacity = new_capacity;
    next.capacity_last_updated_at = Some(now);

    let mut changes = vec![Change {
        change_type: ChangeType::Capacity,
        old: ChangeValue::Capacity(current.current_capacity),
        new: ChangeValue::Capacity(new_capacity),
    }];

    if let Some(derived) = derived_status(current.status, new_capacity, current.max_capacity) {
        next.status = derived;
        next.status_updated_by = Some(actor.clone());
        next.status_updated_at = Some(now);
        changes.push(Change {
            change_type: ChangeType::Status,
            old: ChangeValue::Status(current.status),
            new: ChangeValue::Status(derived),
        });
    }

    (next, changes)
}

fn apply_status(
    current: &ServiceRecord,
    new_status: ServiceStatus,
    actor: &ActorId,
    now: DateTime<Utc>,
) -> (ServiceRecord, Vec<Change>) {
    let mut next = current.clone();
    next.status = new_status;
    next.status_updated_by = Some(actor.clone());
    next.status_updated_at = Some(now);
    let changes = vec![Change {
        change_type: ChangeType::Status,
        old: ChangeValue::Status(current.status),
        new: ChangeValue::Status(new_status),
    }];
    (next, changes)
}

/// Status implied by a capacity change, when it differs from `status`.
pub fn derived_status(
    status: ServiceStatus,
    new_capacity: u32,
    max_capacity: Option<u32>,
) -> Option<ServiceStatus> {
    let max = max_capacity.filter(|max| *max > 0)?;
    match status {
        ServiceStatus::Open if new_capacity >= max => Some(ServiceStatus::Full),
        ServiceStatus::Full if new_capacity < max => Some(ServiceStatus::Open),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_service_fills_at_max() {
        assert_eq!(
            derived_status(ServiceStatus::Open, 100, Some(100)),
            Some(ServiceStatus::Full)
        );
        assert_eq!(derived_status(ServiceStatus::Open, 99, Some(100)), None);
    }

    #[test]
    fn full_service_reopens_below_max() {
        assert_eq!(
            derived_status(ServiceStatus::Full, 40, Some(100)),
            Some(ServiceStatus::Open)
        );
    }

    #[test]
    fn other_statuses_are_untouched() {
        for status in [
            ServiceStatus::Closed,
            ServiceStatus::Limited,
            ServiceStatus::EmergencyOnly,
            ServiceStatus::TemporarilyClosed,
        ] {
            assert_eq!(derived_status(status, 500, Some(100)), None);
        }
        assert_eq!(derived_status(ServiceStatus::Open, 500, None), None);
    }
}

use std::sync::Arc;

use super::{Observer, ObserverError};
use crate::availability::alerts::{AlertFactory, AlertPolicy, AlertStore};
use crate::availability::audit::{AuditEntry, AuditRecorder};
use crate::availability::events::ChangeEvent;

/// Appends one audit line per committed change.
pub struct AuditObserver<R> {
    recorder: Arc<R>,
}

impl<R: AuditRecorder> AuditObserver<R> {
    pub fn new(recorder: Arc<R>) -> Self {
        Self { recorder }
    }
}

impl<R: AuditRecorder> Observer for AuditObserver<R> {
    fn name(&self) -> &str {
        "audit"
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), ObserverError> {
        self.recorder.append(AuditEntry::from_event(event))?;
        Ok(())
    }
}

/// Runs the alert policy and persists whatever it decides to raise.
pub struct AlertObserver<S> {
    store: Arc<S>,
    policy: AlertPolicy,
    factory: AlertFactory,
}

impl<S: AlertStore> AlertObserver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            policy: AlertPolicy,
            factory: AlertFactory,
        }
    }
}

impl<S: AlertStore> Observer for AlertObserver<S> {
    fn name(&self) -> &str {
        "alerts"
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), ObserverError> {
        let Some(decision) = self.policy.decide(event, &event.record) else {
            return Ok(());
        };

        let alert = self.factory.from_decision(
            &event.record,
            decision,
            Some(event.actor_id.clone()),
            event.timestamp,
        );
        let stored = self.store.persist(alert)?;
        tracing::info!(
            service_id = %stored.service_id,
            alert_id = %stored.id,
            priority = stored.priority,
            "alert raised"
        );
        Ok(())
    }
}

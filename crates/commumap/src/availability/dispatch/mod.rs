//! Explicit observer hub for committed changes.
//!
//! Each observer runs on the blocking pool under a timeout, so a slow, failing
//! or panicking observer is reported in the [`DispatchReport`] and never reaches
//! the publisher.

mod channels;
mod observers;

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use super::alerts::AlertStoreError;
use super::audit::AuditError;
use super::events::ChangeEvent;

pub use channels::{
    Channel, ChannelDelivery, ChannelObserver, ChannelRoute, ChannelSendError, ChannelSender,
    ChannelWorker, DeliveryFailure, DeliveryLedger, RetryPolicy,
};
pub use observers::{AlertObserver, AuditObserver};

/// Receives committed changes. Implementations must be quick; the dispatcher
/// bounds each call by its timeout.
pub trait Observer: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, event: &ChangeEvent) -> Result<(), ObserverError>;
}

/// Failure reported by a single observer; never reaches the publisher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObserverError {
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    AlertStore(#[from] AlertStoreError),
    #[error("channel queue rejected delivery: {0}")]
    Queue(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObserverId(pub u64);

/// How one observer fared for one event.
#[derive(Debug, Clone)]
pub enum ObserverOutcome {
    Delivered,
    Failed(ObserverError),
    Panicked(String),
    TimedOut,
}

impl ObserverOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Debug, Clone)]
pub struct ObserverReport {
    pub observer_id: ObserverId,
    pub observer: String,
    pub outcome: ObserverOutcome,
}

/// Per-observer results of one `publish` call.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub event_id: String,
    pub outcomes: Vec<ObserverReport>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|report| report.outcome.is_delivered())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome_for(&self, observer: &str) -> Option<&ObserverOutcome> {
        self.outcomes
            .iter()
            .find(|report| report.observer == observer)
            .map(|report| &report.outcome)
    }
}

type Subscription = (ObserverId, Arc<dyn Observer>);

/// Fans committed change events out to subscribed observers, in subscription order.
pub struct NotificationDispatcher {
    observers: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(observer = observer.name(), observer_id = id.0, "observer subscribed");
        match self.observers.write() {
            Ok(mut guard) => guard.push((id, observer)),
            Err(poisoned) => poisoned.into_inner().push((id, observer)),
        }
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut guard = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = guard.len();
        guard.retain(|(existing, _)| *existing != id);
        before != guard.len()
    }

    pub fn observer_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Vec<Subscription> {
        match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliver `event` to every observer in subscription order.
    pub async fn publish(&self, event: Arc<ChangeEvent>) -> DispatchReport {
        let mut outcomes = Vec::new();

        for (observer_id, observer) in self.snapshot() {
            let name = observer.name().to_string();
            let task_event = Arc::clone(&event);
            let task = tokio::task::spawn_blocking(move || observer.handle(&task_event));

            let outcome = match tokio::time::timeout(self.timeout, task).await {
                Ok(Ok(Ok(()))) => ObserverOutcome::Delivered,
                Ok(Ok(Err(err))) => {
                    tracing::error!(
                        observer = %name,
                        service_id = %event.service_id,
                        event_id = %event.event_id,
                        error = %err,
                        "observer failed"
                    );
                    ObserverOutcome::Failed(err)
                }
                Ok(Err(join_error)) if join_error.is_panic() => {
                    let message = panic_message(join_error.into_panic());
                    tracing::error!(
                        observer = %name,
                        service_id = %event.service_id,
                        panic = %message,
                        "observer panicked"
                    );
                    ObserverOutcome::Panicked(message)
                }
                Ok(Err(join_error)) => {
                    tracing::error!(observer = %name, error = %join_error, "observer task cancelled");
                    ObserverOutcome::Failed(ObserverError::Other(join_error.to_string()))
                }
                Err(_) => {
                    tracing::error!(
                        observer = %name,
                        service_id = %event.service_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "observer timed out"
                    );
                    ObserverOutcome::TimedOut
                }
            };

            outcomes.push(ObserverReport {
                observer_id,
                observer: name,
                outcome,
            });
        }

        DispatchReport {
            event_id: event.event_id.clone(),
            outcomes,
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "observer panicked".to_string()
    }
}

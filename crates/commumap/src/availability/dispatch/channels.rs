use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::{Observer, ObserverError};
use crate::availability::domain::ServiceId;
use crate::availability::events::{ChangeEvent, ChangeType};
use crate::config::DispatchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }
}

/// Outbound transport for one channel kind.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &str,
    ) -> Result<(), ChannelSendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelSendError {
    /// Worth retrying (timeouts, throttling).
    #[error("transient send failure: {0}")]
    Transient(String),
    /// The provider refused the message; retrying will not help.
    #[error("recipient rejected: {0}")]
    Rejected(String),
}

/// Subscribes one recipient on one channel. An empty `change_types` matches every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoute {
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub change_types: Vec<ChangeType>,
}

impl ChannelRoute {
    pub fn matches(&self, change_type: ChangeType) -> bool {
        self.change_types.is_empty() || self.change_types.contains(&change_type)
    }
}

/// Queued unit of work for the channel worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub recipient: String,
    pub event_id: String,
    pub service_id: ServiceId,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling each time.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(DispatchConfig::default())
    }
}

impl From<DispatchConfig> for RetryPolicy {
    fn from(config: DispatchConfig) -> Self {
        Self {
            max_attempts: config.channel_max_attempts.max(1),
            initial_backoff: config.channel_backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub delivery: ChannelDelivery,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Final delivery outcomes, readable by an operator dashboard.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    failures: Mutex<Vec<DeliveryFailure>>,
    delivered: AtomicU64,
}

impl DeliveryLedger {
    pub fn failures(&self) -> Vec<DeliveryFailure> {
        match self.failures.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, failure: DeliveryFailure) {
        match self.failures.lock() {
            Ok(mut guard) => guard.push(failure),
            Err(poisoned) => poisoned.into_inner().push(failure),
        }
    }
}

/// Enqueues a delivery per matching route; never sends inline.
///
/// Deliveries that do not fit in the queue are recorded in the ledger with zero attempts.
pub struct ChannelObserver {
    routes: Vec<ChannelRoute>,
    queue: mpsc::Sender<ChannelDelivery>,
    ledger: Arc<DeliveryLedger>,
}

impl ChannelObserver {
    pub fn new(
        routes: Vec<ChannelRoute>,
        depth: usize,
        ledger: Arc<DeliveryLedger>,
    ) -> (Self, mpsc::Receiver<ChannelDelivery>) {
        let (queue, receiver) = mpsc::channel(depth.max(1));
        (
            Self {
                routes,
                queue,
                ledger,
            },
            receiver,
        )
    }
}

impl Observer for ChannelObserver {
    fn name(&self) -> &str {
        "channels"
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), ObserverError> {
        let matching: Vec<&ChannelRoute> = self
            .routes
            .iter()
            .filter(|route| route.matches(event.change_type))
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        let payload =
            serde_json::to_string(event).map_err(|err| ObserverError::Other(err.to_string()))?;

        let total = matching.len();
        let mut dropped = 0usize;
        let mut last_reason = "";
        for route in matching {
            let delivery = ChannelDelivery {
                channel: route.channel,
                recipient: route.recipient.clone(),
                event_id: event.event_id.clone(),
                service_id: event.service_id.clone(),
                payload: payload.clone(),
            };
            let (delivery, reason) = match self.queue.try_send(delivery) {
                Ok(()) => continue,
                Err(TrySendError::Full(delivery)) => (delivery, "queue full"),
                Err(TrySendError::Closed(delivery)) => (delivery, "worker stopped"),
            };
            tracing::error!(
                channel = delivery.channel.label(),
                recipient = %delivery.recipient,
                service_id = %delivery.service_id,
                reason,
                "channel delivery dropped"
            );
            self.ledger.record_failure(DeliveryFailure {
                delivery,
                attempts: 0,
                error: reason.to_string(),
                failed_at: Utc::now(),
            });
            dropped += 1;
            last_reason = reason;
        }

        if dropped > 0 {
            return Err(ObserverError::Queue(format!(
                "{dropped} of {total} deliveries dropped ({last_reason})"
            )));
        }
        Ok(())
    }
}

/// Drains the delivery queue and sends with bounded retry.
pub struct ChannelWorker<S> {
    receiver: mpsc::Receiver<ChannelDelivery>,
    sender: Arc<S>,
    policy: RetryPolicy,
    ledger: Arc<DeliveryLedger>,
}

impl<S> ChannelWorker<S>
where
    S: ChannelSender + 'static,
{
    pub fn new(
        receiver: mpsc::Receiver<ChannelDelivery>,
        sender: Arc<S>,
        policy: RetryPolicy,
        ledger: Arc<DeliveryLedger>,
    ) -> Self {
        Self {
            receiver,
            sender,
            policy,
            ledger,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every `ChannelObserver` holding the queue is dropped.
    pub async fn run(mut self) {
        while let Some(delivery) = self.receiver.recv().await {
            self.deliver(delivery).await;
        }
        tracing::debug!("channel queue closed, worker exiting");
    }

    async fn deliver(&self, delivery: ChannelDelivery) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .sender
                .send(delivery.channel, &delivery.recipient, &delivery.payload)
                .await;

            let error = match result {
                Ok(()) => {
                    tracing::debug!(
                        channel = delivery.channel.label(),
                        service_id = %delivery.service_id,
                        attempt,
                        "channel delivery sent"
                    );
                    self.ledger.record_delivered();
                    return;
                }
                Err(error) => error,
            };

            let retryable = matches!(error, ChannelSendError::Transient(_));
            if retryable && attempt < self.policy.max_attempts {
                let delay = self.policy.backoff_after(attempt);
                tracing::warn!(
                    channel = delivery.channel.label(),
                    service_id = %delivery.service_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "channel delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::error!(
                channel = delivery.channel.label(),
                recipient = %delivery.recipient,
                service_id = %delivery.service_id,
                attempt,
                error = %error,
                "channel delivery abandoned"
            );
            self.ledger.record_failure(DeliveryFailure {
                delivery,
                attempts: attempt,
                error: error.to_string(),
                failed_at: Utc::now(),
            });
            return;
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{capacity_percentage, ActorId, ServiceId, ServiceRecord, ServiceStatus};

/// Dimension of a service record that a committed transition touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Status,
    Capacity,
    Verification,
    Activation,
}

impl ChangeType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Capacity => "capacity",
            Self::Verification => "verification",
            Self::Activation => "activation",
        }
    }
}

/// Typed before/after value carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChangeValue {
    Status(ServiceStatus),
    Capacity(u32),
    Flag(bool),
}

impl ChangeValue {
    pub fn as_status(self) -> Option<ServiceStatus> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }

    pub fn as_capacity(self) -> Option<u32> {
        match self {
            Self::Capacity(value) => Some(value),
            _ => None,
        }
    }

    pub fn describe(self) -> String {
        match self {
            Self::Status(status) => status.code().to_string(),
            Self::Capacity(value) => value.to_string(),
            Self::Flag(flag) => flag.to_string(),
        }
    }
}

/// Immutable record of one committed change, fanned out to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub event_id: String,
    pub service_id: ServiceId,
    pub service_name: String,
    pub change_type: ChangeType,
    pub old_value: ChangeValue,
    pub new_value: ChangeValue,
    /// `max_capacity` at commit time, so observers can evaluate thresholds.
    pub max_capacity: Option<u32>,
    pub is_emergency_service: bool,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Record state produced by the commit that emitted this event.
    #[serde(skip)]
    pub record: Arc<ServiceRecord>,
}

impl ChangeEvent {
    pub(crate) fn new(
        record: &Arc<ServiceRecord>,
        change_type: ChangeType,
        old_value: ChangeValue,
        new_value: ChangeValue,
        actor_id: ActorId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            service_id: record.id.clone(),
            service_name: record.name.clone(),
            change_type,
            old_value,
            new_value,
            max_capacity: record.max_capacity,
            is_emergency_service: record.is_emergency_service,
            actor_id,
            timestamp,
            message: default_message(change_type, old_value, new_value),
            record: Arc::clone(record),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.old_value == self.new_value
    }

    pub fn old_capacity_percentage(&self) -> Option<f64> {
        self.old_value
            .as_capacity()
            .and_then(|value| capacity_percentage(value, self.max_capacity))
    }

    pub fn new_capacity_percentage(&self) -> Option<f64> {
        self.new_value
            .as_capacity()
            .and_then(|value| capacity_percentage(value, self.max_capacity))
    }

    /// Capacity delta for capacity events.
    pub fn capacity_change(&self) -> Option<i64> {
        match (self.old_value, self.new_value) {
            (ChangeValue::Capacity(old), ChangeValue::Capacity(new)) => {
                Some(i64::from(new) - i64::from(old))
            }
            _ => None,
        }
    }
}

fn default_message(change_type: ChangeType, old: ChangeValue, new: ChangeValue) -> String {
    match change_type {
        ChangeType::Status => format!(
            "Status changed from {} to {}",
            old.describe(),
            new.describe()
        ),
        ChangeType::Capacity => format!(
            "Capacity updated from {} to {}",
            old.describe(),
            new.describe()
        ),
        ChangeType::Verification => match new {
            ChangeValue::Flag(true) => "Service verified".to_string(),
            _ => "Service verification revoked".to_string(),
        },
        ChangeType::Activation => match new {
            ChangeValue::Flag(true) => "Service activated".to_string(),
            _ => "Service deactivated".to_string(),
        },
    }
}

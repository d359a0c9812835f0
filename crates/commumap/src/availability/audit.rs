use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, ServiceId, ServiceStatus};
use super::events::{ChangeEvent, ChangeType, ChangeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ServiceUpdated,
    ServiceApproved,
    ServiceRejected,
    EmergencyToggled,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ServiceUpdated => "Service Updated",
            Self::ServiceApproved => "Service Approved",
            Self::ServiceRejected => "Service Rejected",
            Self::EmergencyToggled => "Emergency Status Toggled",
        }
    }
}

/// Write-once audit log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor: ActorId,
    pub action: AuditAction,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn service_id(&self) -> Option<ServiceId> {
        self.metadata.get("service_id").cloned().map(ServiceId)
    }

    /// Map a committed change onto its audit line.
    pub fn from_event(event: &ChangeEvent) -> Self {
        let action = match (event.change_type, event.new_value) {
            (ChangeType::Verification, ChangeValue::Flag(true)) => AuditAction::ServiceApproved,
            (ChangeType::Verification, _) => AuditAction::ServiceRejected,
            (ChangeType::Status, _)
                if event.old_value.as_status() == Some(ServiceStatus::EmergencyOnly)
                    || event.new_value.as_status() == Some(ServiceStatus::EmergencyOnly) =>
            {
                AuditAction::EmergencyToggled
            }
            _ => AuditAction::ServiceUpdated,
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("service_id".to_string(), event.service_id.0.clone());
        metadata.insert("event_id".to_string(), event.event_id.clone());
        metadata.insert(
            "change_type".to_string(),
            event.change_type.label().to_string(),
        );
        metadata.insert("old_value".to_string(), event.old_value.describe());
        metadata.insert("new_value".to_string(), event.new_value.describe());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor: event.actor_id.clone(),
            action,
            description: format!("{}: {}", event.service_name, event.message),
            metadata,
            recorded_at: event.timestamp,
        }
    }
}

/// Append-only change log.
pub trait AuditRecorder: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
    fn entries_for(&self, service_id: &ServiceId) -> Result<Vec<AuditEntry>, AuditError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

//! Alert model, the threshold/status policy that decides when one is raised,
//! and the factory holding per-type display defaults.

mod factory;
mod policy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, ServiceId};

pub use factory::AlertFactory;
pub use policy::{AlertDecision, AlertPolicy, NEARLY_FULL_PERCENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Info,
    Warning,
    Urgent,
    Closure,
    Capacity,
    Schedule,
}

impl AlertType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "Information",
            Self::Warning => "Warning",
            Self::Urgent => "Urgent",
            Self::Closure => "Temporary Closure",
            Self::Capacity => "Capacity Alert",
            Self::Schedule => "Schedule Change",
        }
    }
}

/// Display and acknowledgement settings applied to a new alert of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDefaults {
    pub priority: u8,
    pub show_on_map: bool,
    pub requires_acknowledgment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub service_id: ServiceId,
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    /// 1 (low) to 5 (critical).
    pub priority: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub requires_acknowledgment: bool,
    pub show_on_map: bool,
    pub created_by: Option<ActorId>,
}

impl Alert {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| now > end)
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && self.end_time.map_or(true, |end| end > now)
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.is_active = false;
    }

    pub const fn priority_label(&self) -> &'static str {
        match self.priority {
            1 => "Low",
            2 => "Normal",
            3 => "Medium",
            4 => "High",
            5 => "Critical",
            _ => "Unknown",
        }
    }
}

/// Persistence seam for raised alerts.
pub trait AlertStore: Send + Sync {
    fn persist(&self, alert: Alert) -> Result<Alert, AlertStoreError>;
    fn active_for(
        &self,
        service_id: &ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, AlertStoreError>;
    fn close(&self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert, AlertStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertStoreError {
    #[error("alert {0} not found")]
    NotFound(String),
    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert(end_time: Option<DateTime<Utc>>) -> Alert {
        Alert {
            id: "alert-1".to_string(),
            service_id: ServiceId("svc-1".to_string()),
            alert_type: AlertType::Closure,
            title: "Closed".to_string(),
            message: "Flooding".to_string(),
            priority: 5,
            start_time: Utc::now() - Duration::hours(1),
            end_time,
            is_active: true,
            requires_acknowledgment: true,
            show_on_map: true,
            created_by: None,
        }
    }

    #[test]
    fn open_ended_alert_stays_current() {
        let now = Utc::now();
        let alert = alert(None);
        assert!(alert.is_current(now));
        assert!(!alert.is_expired(now));
        assert_eq!(alert.priority_label(), "Critical");
    }

    #[test]
    fn passed_end_time_expires_alert() {
        let now = Utc::now();
        let alert = alert(Some(now - Duration::minutes(5)));
        assert!(alert.is_expired(now));
        assert!(!alert.is_current(now));
    }

    #[test]
    fn closing_deactivates() {
        let now = Utc::now();
        let mut alert = alert(None);
        alert.close(now);
        assert!(!alert.is_active);
        assert_eq!(alert.end_time, Some(now));
        assert!(!alert.is_current(now));
    }
}

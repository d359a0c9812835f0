use chrono::{DateTime, Utc};

use super::{Alert, AlertDecision, AlertDefaults, AlertType};
use crate::availability::domain::{ActorId, ServiceRecord};

/// Builds alerts with per-type defaults; explicit decision fields win.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertFactory;

impl AlertFactory {
    pub const fn defaults(alert_type: AlertType) -> AlertDefaults {
        let (priority, show_on_map, requires_acknowledgment) = match alert_type {
            AlertType::Info => (1, true, false),
            AlertType::Warning => (3, true, false),
            AlertType::Urgent => (4, true, true),
            AlertType::Closure => (5, true, true),
            AlertType::Capacity => (2, true, false),
            AlertType::Schedule => (2, false, false),
        };
        AlertDefaults {
            priority,
            show_on_map,
            requires_acknowledgment,
        }
    }

    pub fn from_decision(
        &self,
        record: &ServiceRecord,
        decision: AlertDecision,
        created_by: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Alert {
        let defaults = Self::defaults(decision.alert_type);
        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            service_id: record.id.clone(),
            alert_type: decision.alert_type,
            title: decision.title,
            message: decision.message,
            priority: decision.priority.clamp(1, 5),
            start_time: now,
            end_time: None,
            is_active: true,
            requires_acknowledgment: decision
                .requires_acknowledgment
                .unwrap_or(defaults.requires_acknowledgment),
            show_on_map: decision.show_on_map.unwrap_or(defaults.show_on_map),
            created_by,
        }
    }

    pub fn closure_alert(
        &self,
        record: &ServiceRecord,
        reason: &str,
        end_time: Option<DateTime<Utc>>,
        created_by: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Alert {
        let mut message = format!("This service is temporarily closed. Reason: {reason}");
        if let Some(end) = end_time {
            message.push_str(&format!(
                " Expected to reopen: {}",
                end.format("%Y-%m-%d %H:%M")
            ));
        }

        let mut alert = self.from_decision(
            record,
            AlertDecision {
                alert_type: AlertType::Closure,
                priority: Self::defaults(AlertType::Closure).priority,
                title: format!("{} temporarily closed", record.name),
                message,
                requires_acknowledgment: None,
                show_on_map: None,
            },
            created_by,
            now,
        );
        alert.end_time = end_time;
        alert
    }

    pub fn emergency_alert(
        &self,
        record: &ServiceRecord,
        message: &str,
        created_by: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Alert {
        self.from_decision(
            record,
            AlertDecision {
                alert_type: AlertType::Urgent,
                priority: 5,
                title: format!("EMERGENCY: {}", record.name),
                message: message.to_string(),
                requires_acknowledgment: Some(true),
                show_on_map: None,
            },
            created_by,
            now,
        )
    }
}

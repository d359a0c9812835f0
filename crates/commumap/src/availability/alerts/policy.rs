use super::AlertType;
use crate::availability::domain::{ServiceRecord, ServiceStatus};
use crate::availability::events::{ChangeEvent, ChangeType};

pub const NEARLY_FULL_PERCENT: f64 = 90.0;
const FULL_PERCENT: f64 = 100.0;

/// What the policy wants raised. Fields left `None` fall back to type defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDecision {
    pub alert_type: AlertType,
    pub priority: u8,
    pub title: String,
    pub message: String,
    pub requires_acknowledgment: Option<bool>,
    pub show_on_map: Option<bool>,
}

/// Decides whether a committed change warrants a new alert. First matching rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertPolicy;

impl AlertPolicy {
    pub fn decide(&self, event: &ChangeEvent, record: &ServiceRecord) -> Option<AlertDecision> {
        match event.change_type {
            ChangeType::Capacity => self.capacity_rule(event, record),
            ChangeType::Status => self.status_rule(event, record),
            ChangeType::Verification | ChangeType::Activation => None,
        }
    }

    fn capacity_rule(&self, event: &ChangeEvent, record: &ServiceRecord) -> Option<AlertDecision> {
        let old_pct = event.old_capacity_percentage()?;
        let new_pct = event.new_capacity_percentage()?;
        let current = event.new_value.as_capacity()?;
        let max = event.max_capacity?;

        if old_pct < NEARLY_FULL_PERCENT && (NEARLY_FULL_PERCENT..FULL_PERCENT).contains(&new_pct)
        {
            return Some(AlertDecision {
                alert_type: AlertType::Capacity,
                priority: 3,
                title: format!("{} is nearly full", record.name),
                message: format!(
                    "This service is nearly at capacity ({current}/{max}). Contact them before visiting."
                ),
                requires_acknowledgment: None,
                show_on_map: None,
            });
        }

        if old_pct < FULL_PERCENT && new_pct >= FULL_PERCENT {
            return Some(AlertDecision {
                alert_type: AlertType::Capacity,
                priority: 4,
                title: format!("{} is at full capacity", record.name),
                message: format!(
                    "This service is currently at full capacity ({current}/{max}). Please check back later or consider alternative services."
                ),
                requires_acknowledgment: None,
                show_on_map: None,
            });
        }

        None
    }

    fn status_rule(&self, event: &ChangeEvent, record: &ServiceRecord) -> Option<AlertDecision> {
        if event.is_noop() {
            return None;
        }
        let new_status = event.new_value.as_status()?;
        let urgent = match new_status {
            ServiceStatus::EmergencyOnly | ServiceStatus::TemporarilyClosed => true,
            ServiceStatus::Closed => event.is_emergency_service,
            _ => false,
        };
        if !urgent {
            return None;
        }

        Some(AlertDecision {
            alert_type: AlertType::Urgent,
            priority: 5,
            title: format!("{} is now {}", record.name, new_status.label()),
            message: format!(
                "Status changed to {}. Please contact the service before visiting.",
                new_status.label()
            ),
            requires_acknowledgment: Some(true),
            show_on_map: None,
        })
    }
}

use super::common::*;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::availability::alerts::{AlertDecision, AlertFactory, AlertPolicy, AlertStore, AlertType};
use crate::availability::domain::{ActorId, ServiceId, ServiceStatus};
use crate::availability::events::{ChangeEvent, ChangeType, ChangeValue};
use crate::availability::memory::InMemoryAlertStore;

fn manager() -> ActorId {
    ActorId("manager-3".to_string())
}

fn capacity_change(old: u32, new: u32, max: Option<u32>) -> ChangeEvent {
    let record = Arc::new(record_with_capacity("svc-1", new, max));
    ChangeEvent::new(
        &record,
        ChangeType::Capacity,
        ChangeValue::Capacity(old),
        ChangeValue::Capacity(new),
        manager(),
        Utc::now(),
    )
}

fn status_change(old: ServiceStatus, new: ServiceStatus, emergency: bool) -> ChangeEvent {
    let mut record = record_with_capacity("svc-1", 0, None);
    record.status = new;
    record.is_emergency_service = emergency;
    ChangeEvent::new(
        &Arc::new(record),
        ChangeType::Status,
        ChangeValue::Status(old),
        ChangeValue::Status(new),
        manager(),
        Utc::now(),
    )
}

#[test]
fn crossing_ninety_percent_raises_medium_capacity_alert() {
    let event = capacity_change(89, 90, Some(100));
    let decision = AlertPolicy
        .decide(&event, &event.record)
        .expect("threshold crossing alerts");
    assert_eq!(decision.alert_type, AlertType::Capacity);
    assert_eq!(decision.priority, 3);
    assert!(decision.message.contains("90/100"));
}

#[test]
fn reaching_full_raises_high_capacity_alert() {
    let event = capacity_change(99, 100, Some(100));
    let decision = AlertPolicy
        .decide(&event, &event.record)
        .expect("full alerts");
    assert_eq!(decision.priority, 4);
    assert!(decision.title.contains("full capacity"));

    let jump = capacity_change(10, 120, Some(100));
    assert_eq!(
        AlertPolicy.decide(&jump, &jump.record).map(|d| d.priority),
        Some(4)
    );
}

#[test]
fn staying_above_threshold_is_silent() {
    for (old, new) in [(90, 95), (95, 92), (100, 100), (100, 105), (40, 60)] {
        let event = capacity_change(old, new, Some(100));
        assert_eq!(
            AlertPolicy.decide(&event, &event.record),
            None,
            "{old} -> {new} should not alert"
        );
    }
}

#[test]
fn untracked_capacity_never_alerts() {
    let event = capacity_change(0, 500, None);
    assert_eq!(AlertPolicy.decide(&event, &event.record), None);
    let zero_max = capacity_change(0, 5, Some(0));
    assert_eq!(AlertPolicy.decide(&zero_max, &zero_max.record), None);
}

#[test]
fn urgent_statuses_raise_critical_alert() {
    for status in [ServiceStatus::EmergencyOnly, ServiceStatus::TemporarilyClosed] {
        let event = status_change(ServiceStatus::Open, status, false);
        let decision = AlertPolicy
            .decide(&event, &event.record)
            .expect("urgent status alerts");
        assert_eq!(decision.alert_type, AlertType::Urgent);
        assert_eq!(decision.priority, 5);
        assert_eq!(decision.requires_acknowledgment, Some(true));
    }
}

#[test]
fn closing_only_alerts_for_emergency_services() {
    let ordinary = status_change(ServiceStatus::Open, ServiceStatus::Closed, false);
    assert_eq!(AlertPolicy.decide(&ordinary, &ordinary.record), None);

    let emergency = status_change(ServiceStatus::Open, ServiceStatus::Closed, true);
    assert_eq!(
        AlertPolicy
            .decide(&emergency, &emergency.record)
            .map(|d| d.priority),
        Some(5)
    );
}

#[test]
fn repeated_status_is_silent() {
    let event = status_change(
        ServiceStatus::TemporarilyClosed,
        ServiceStatus::TemporarilyClosed,
        true,
    );
    assert_eq!(AlertPolicy.decide(&event, &event.record), None);
}

#[test]
fn factory_fills_type_defaults_unless_overridden() {
    let record = record_with_capacity("svc-1", 0, None);
    let now = Utc::now();

    let schedule = AlertFactory.from_decision(
        &record,
        AlertDecision {
            alert_type: AlertType::Schedule,
            priority: 2,
            title: "New hours".to_string(),
            message: "Open until 22:00 this week".to_string(),
            requires_acknowledgment: None,
            show_on_map: None,
        },
        None,
        now,
    );
    assert!(!schedule.show_on_map);
    assert!(!schedule.requires_acknowledgment);
    assert!(schedule.is_current(now));

    let overridden = AlertFactory.from_decision(
        &record,
        AlertDecision {
            alert_type: AlertType::Schedule,
            priority: 9,
            title: "Moved".to_string(),
            message: "Moved to the hall".to_string(),
            requires_acknowledgment: Some(true),
            show_on_map: Some(true),
        },
        Some(manager()),
        now,
    );
    assert!(overridden.show_on_map);
    assert!(overridden.requires_acknowledgment);
    assert_eq!(overridden.priority, 5);
    assert_ne!(overridden.id, schedule.id);
}

#[test]
fn closure_alert_carries_reopen_time() {
    let record = record_with_capacity("svc-1", 0, None);
    let now = Utc::now();
    let reopen = now + Duration::hours(6);

    let alert = AlertFactory.closure_alert(&record, "Flooding", Some(reopen), None, now);
    assert_eq!(alert.alert_type, AlertType::Closure);
    assert_eq!(alert.priority, 5);
    assert!(alert.requires_acknowledgment);
    assert_eq!(alert.end_time, Some(reopen));
    assert!(alert.message.contains("Reason: Flooding"));
    assert!(alert.message.contains("Expected to reopen"));
    assert!(alert.is_expired(reopen + Duration::minutes(1)));

    let emergency = AlertFactory.emergency_alert(&record, "Evacuate", Some(manager()), now);
    assert!(emergency.title.starts_with("EMERGENCY: "));
    assert_eq!(emergency.priority, 5);
}

#[test]
fn store_lists_current_alerts_by_priority_and_closes() {
    let store = InMemoryAlertStore::default();
    let record = record_with_capacity("svc-1", 0, None);
    let other = record_with_capacity("svc-2", 0, None);
    let now = Utc::now();

    let low = store
        .persist(AlertFactory.from_decision(
            &record,
            AlertDecision {
                alert_type: AlertType::Info,
                priority: 1,
                title: "Info".to_string(),
                message: "Bring ID".to_string(),
                requires_acknowledgment: None,
                show_on_map: None,
            },
            None,
            now,
        ))
        .expect("persist");
    let high = store
        .persist(AlertFactory.emergency_alert(&record, "Evacuate", None, now))
        .expect("persist");
    store
        .persist(AlertFactory.emergency_alert(&other, "Elsewhere", None, now))
        .expect("persist");

    let active = store.active_for(&record.id, now).expect("list");
    let ids: Vec<&str> = active.iter().map(|alert| alert.id.as_str()).collect();
    assert_eq!(ids, vec![high.id.as_str(), low.id.as_str()]);

    let closed = store.close(&high.id, now).expect("close");
    assert!(!closed.is_active);
    assert_eq!(store.active_for(&record.id, now).expect("list").len(), 1);
    assert!(store.close("missing", now).is_err());
}

#[tokio::test]
async fn engine_driven_threshold_alerts_fire_once_per_crossing() {
    let h = harness(vec![record_with_capacity("svc-1", 80, Some(100))]);
    let id = ServiceId("svc-1".to_string());

    for capacity in [89, 90, 95, 99, 100] {
        h.engine
            .update_capacity(&id, capacity, &manager())
            .await
            .expect("update succeeds");
    }

    let priorities: Vec<u8> = h.alerts.all().iter().map(|alert| alert.priority).collect();
    assert_eq!(priorities, vec![3, 4]);
    assert!(h
        .alerts
        .all()
        .iter()
        .all(|alert| alert.created_by == Some(manager())));
}

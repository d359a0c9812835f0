//! Integer sub-scores and the weighted composite used by the smart strategy.

use serde::Serialize;

use crate::availability::domain::{ServiceRecord, ServiceStatus};

pub const TEXT_WEIGHT: f64 = 0.2;
pub const DISTANCE_WEIGHT: f64 = 0.25;
pub const AVAILABILITY_WEIGHT: f64 = 0.25;
pub const QUALITY_WEIGHT: f64 = 0.2;
pub const EMERGENCY_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub text: u8,
    pub distance: u8,
    pub availability: u8,
    pub quality: u8,
    pub emergency_boost: u8,
    pub composite: f64,
}

impl ScoreBreakdown {
    pub fn compute(
        record: &ServiceRecord,
        query_matched: bool,
        distance_km: Option<f64>,
        emergency_only: bool,
    ) -> Self {
        let text = text_score(query_matched);
        let distance = distance_km.map_or(3, distance_score);
        let availability = availability_score(record.status);
        let quality = quality_score(record.quality_score);
        let emergency_boost = if emergency_only && record.is_emergency_service {
            3
        } else {
            0
        };
        let composite = TEXT_WEIGHT * f64::from(text)
            + DISTANCE_WEIGHT * f64::from(distance)
            + AVAILABILITY_WEIGHT * f64::from(availability)
            + QUALITY_WEIGHT * f64::from(quality)
            + EMERGENCY_WEIGHT * f64::from(emergency_boost);

        Self {
            text,
            distance,
            availability,
            quality,
            emergency_boost,
            composite,
        }
    }
}

pub fn text_score(query_matched: bool) -> u8 {
    if query_matched {
        2
    } else {
        1
    }
}

pub fn distance_score(km: f64) -> u8 {
    match km {
        km if km <= 1.0 => 5,
        km if km <= 3.0 => 4,
        km if km <= 5.0 => 3,
        km if km <= 10.0 => 2,
        _ => 1,
    }
}

pub fn availability_score(status: ServiceStatus) -> u8 {
    match status {
        ServiceStatus::Open => 5,
        ServiceStatus::Limited => 4,
        ServiceStatus::EmergencyOnly => 3,
        ServiceStatus::Full => 2,
        ServiceStatus::Closed | ServiceStatus::TemporarilyClosed => 1,
    }
}

pub fn quality_score(score: f64) -> u8 {
    match score {
        s if s >= 4.5 => 5,
        s if s >= 3.5 => 4,
        s if s >= 2.5 => 3,
        s if s >= 1.5 => 2,
        _ => 1,
    }
}

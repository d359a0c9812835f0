use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::Coordinate;

/// Opaque identifier for a service listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the user (manager, moderator, system job) making a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operational status of a service. Any value may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Open,
    Closed,
    TemporarilyClosed,
    Full,
    Limited,
    EmergencyOnly,
}

impl ServiceStatus {
    pub const fn all() -> [Self; 6] {
        [
            Self::Open,
            Self::Closed,
            Self::TemporarilyClosed,
            Self::Full,
            Self::Limited,
            Self::EmergencyOnly,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::TemporarilyClosed => "temporarily_closed",
            Self::Full => "full",
            Self::Limited => "limited",
            Self::EmergencyOnly => "emergency_only",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::TemporarilyClosed => "Temporarily Closed",
            Self::Full => "At Capacity",
            Self::Limited => "Limited Availability",
            Self::EmergencyOnly => "Emergency Only",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ServiceStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "temporarily_closed" | "temp_closed" => Ok(Self::TemporarilyClosed),
            "full" | "at_capacity" => Ok(Self::Full),
            "limited" => Ok(Self::Limited),
            "emergency_only" | "emergency" => Ok(Self::EmergencyOnly),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }
}

/// Primary category a service is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Healthcare,
    Shelter,
    Food,
    Education,
    Emergency,
    Social,
    Employment,
    Legal,
    Transportation,
    Utilities,
    Recreation,
    Other,
}

impl CategoryType {
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Healthcare => "healthcare",
            Self::Shelter => "shelter",
            Self::Food => "food",
            Self::Education => "education",
            Self::Emergency => "emergency",
            Self::Social => "social",
            Self::Employment => "employment",
            Self::Legal => "legal",
            Self::Transportation => "transportation",
            Self::Utilities => "utilities",
            Self::Recreation => "recreation",
            Self::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthcare => "Healthcare & Medical",
            Self::Shelter => "Shelter & Housing",
            Self::Food => "Food & Nutrition",
            Self::Education => "Education & Learning",
            Self::Emergency => "Emergency Services",
            Self::Social => "Social Services",
            Self::Employment => "Employment & Training",
            Self::Legal => "Legal Aid",
            Self::Transportation => "Transportation",
            Self::Utilities => "Utilities & Basic Needs",
            Self::Recreation => "Recreation & Community",
            Self::Other => "Other Services",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for CategoryType {
    type Err = UnknownCategory;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        [
            Self::Healthcare,
            Self::Shelter,
            Self::Food,
            Self::Education,
            Self::Emergency,
            Self::Social,
            Self::Employment,
            Self::Legal,
            Self::Transportation,
            Self::Utilities,
            Self::Recreation,
            Self::Other,
        ]
        .into_iter()
        .find(|category| category.slug() == normalized)
        .ok_or_else(|| UnknownCategory(raw.to_string()))
    }
}

/// Coarse occupancy band shown next to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityBand {
    Unknown,
    PlentyOfSpace,
    Available,
    ModeratelyBusy,
    NearlyFull,
    Full,
}

impl CapacityBand {
    pub fn from_percentage(percentage: Option<f64>) -> Self {
        match percentage {
            None => Self::Unknown,
            Some(pct) if pct >= 100.0 => Self::Full,
            Some(pct) if pct >= 90.0 => Self::NearlyFull,
            Some(pct) if pct >= 70.0 => Self::ModeratelyBusy,
            Some(pct) if pct >= 30.0 => Self::Available,
            Some(_) => Self::PlentyOfSpace,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Capacity unknown",
            Self::PlentyOfSpace => "Plenty of space",
            Self::Available => "Available",
            Self::ModeratelyBusy => "Moderately busy",
            Self::NearlyFull => "Nearly full",
            Self::Full => "Full",
        }
    }
}

/// Percentage of `max` that `current` represents; `None` when capacity is untracked.
pub fn capacity_percentage(current: u32, max: Option<u32>) -> Option<f64> {
    match max {
        Some(max) if max > 0 => Some(f64::from(current) / f64::from(max) * 100.0),
        _ => None,
    }
}

/// One community service listing as held by the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
    pub category: CategoryType,
    pub tags: Vec<String>,
    pub address: String,
    pub city: String,
    pub location: Coordinate,
    pub current_capacity: u32,
    pub max_capacity: Option<u32>,
    pub status: ServiceStatus,
    pub is_emergency_service: bool,
    pub is_verified: bool,
    pub is_active: bool,
    pub accepts_walk_ins: bool,
    pub requires_appointment: bool,
    pub is_24_7: bool,
    pub quality_score: f64,
    pub total_ratings: u32,
    pub status_updated_by: Option<ActorId>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub capacity_last_updated_at: Option<DateTime<Utc>>,
    pub verified_by: Option<ActorId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency sequence; bumped by the store on every commit.
    pub version: u64,
    pub search_blob: String,
}

impl ServiceRecord {
    pub fn capacity_percentage(&self) -> Option<f64> {
        capacity_percentage(self.current_capacity, self.max_capacity)
    }

    pub fn capacity_band(&self) -> CapacityBand {
        CapacityBand::from_percentage(self.capacity_percentage())
    }

    pub fn is_at_capacity(&self) -> bool {
        self.capacity_percentage().is_some_and(|pct| pct >= 100.0)
    }

    /// Visible to the public directory.
    pub fn is_listed(&self) -> bool {
        self.is_active && self.is_verified
    }

    pub fn is_open_now(&self) -> bool {
        match self.status {
            ServiceStatus::Open => true,
            ServiceStatus::Limited => self.is_24_7,
            _ => false,
        }
    }

    /// Recompute the lowercase text used for substring matching.
    pub fn refresh_search_blob(&mut self) {
        let tags = self.tags.join(" ");
        self.search_blob = [
            self.name.as_str(),
            self.description.as_str(),
            tags.as_str(),
            self.address.as_str(),
            self.city.as_str(),
            self.category.label(),
        ]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    }
}

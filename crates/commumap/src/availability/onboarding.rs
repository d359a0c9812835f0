//! Category-specific factories that validate a draft and build a new record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::domain::{CategoryType, ServiceId, ServiceRecord, ServiceStatus};
use super::geo::{Coordinate, CoordinateError};

/// Caller-supplied fields for a new listing. `None` means "use the factory default".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceDraft {
    pub name: String,
    pub description: String,
    pub category: Option<CategoryType>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
    pub city: String,
    pub tags: Vec<String>,
    pub max_capacity: Option<u32>,
    pub current_capacity: Option<u32>,
    pub status: Option<ServiceStatus>,
    pub is_emergency_service: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub accepts_walk_ins: Option<bool>,
    pub requires_appointment: Option<bool>,
    pub is_24_7: Option<bool>,
    pub quality_score: Option<f64>,
    pub total_ratings: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OnboardingError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error(transparent)]
    InvalidLocation(#[from] CoordinateError),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("{kind} services must use the {kind} category (got {category})")]
    CategoryMismatch { kind: String, category: String },
    #[error("unknown factory type '{kind}'. Available: {}", available.join(", "))]
    UnknownKind {
        kind: String,
        available: Vec<String>,
    },
}

pub trait ServiceFactory: Send + Sync {
    fn kind(&self) -> &str;
    fn build(&self, draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError>;
}

/// Factory-level fallbacks applied where the draft is silent.
#[derive(Debug, Clone, Copy)]
struct Profile {
    accepts_walk_ins: bool,
    requires_appointment: bool,
    is_24_7: bool,
    is_emergency_service: bool,
    is_verified: bool,
    max_capacity: Option<u32>,
}

const GENERAL: Profile = Profile {
    accepts_walk_ins: true,
    requires_appointment: false,
    is_24_7: false,
    is_emergency_service: false,
    is_verified: false,
    max_capacity: None,
};

fn validate_required(draft: &ServiceDraft) -> Result<(CategoryType, Coordinate), OnboardingError> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("name", &draft.name),
        ("description", &draft.description),
        ("address", &draft.address),
        ("city", &draft.city),
    ] {
        if value.trim().is_empty() {
            missing.push(field);
        }
    }
    if draft.category.is_none() {
        missing.push("category");
    }
    if draft.latitude.is_none() || draft.longitude.is_none() {
        missing.push("location");
    }

    match (draft.category, draft.latitude, draft.longitude) {
        (Some(category), Some(latitude), Some(longitude)) if missing.is_empty() => {
            Ok((category, Coordinate::new(latitude, longitude)?))
        }
        _ => Err(OnboardingError::MissingFields(missing)),
    }
}

fn build_record(
    draft: ServiceDraft,
    now: DateTime<Utc>,
    profile: Profile,
    extra_tags: &[&str],
) -> Result<ServiceRecord, OnboardingError> {
    let (category, location) = validate_required(&draft)?;

    let max_capacity = draft.max_capacity.or(profile.max_capacity);
    if max_capacity == Some(0) {
        return Err(OnboardingError::InvalidField {
            field: "max_capacity",
            reason: "capacity must be at least 1".to_string(),
        });
    }

    let status = draft.status.unwrap_or(ServiceStatus::Open);
    if !matches!(status, ServiceStatus::Open | ServiceStatus::Closed) {
        return Err(OnboardingError::InvalidField {
            field: "status",
            reason: format!("new services start open or closed (got {status})"),
        });
    }

    let quality_score = draft.quality_score.unwrap_or(0.0);
    if !(0.0..=5.0).contains(&quality_score) {
        return Err(OnboardingError::InvalidField {
            field: "quality_score",
            reason: format!("expected 0..=5 (got {quality_score})"),
        });
    }

    let tags: BTreeSet<String> = draft
        .tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .chain(extra_tags.iter().map(|tag| tag.to_string()))
        .collect();

    let mut record = ServiceRecord {
        id: ServiceId::generate(),
        name: draft.name.trim().to_string(),
        description: draft.description.trim().to_string(),
        category,
        tags: tags.into_iter().collect(),
        address: draft.address.trim().to_string(),
        city: draft.city.trim().to_string(),
        location,
        current_capacity: draft.current_capacity.unwrap_or(0),
        max_capacity,
        status,
        is_emergency_service: draft
            .is_emergency_service
            .unwrap_or(profile.is_emergency_service),
        is_verified: draft.is_verified.unwrap_or(profile.is_verified),
        is_active: draft.is_active.unwrap_or(true),
        accepts_walk_ins: draft.accepts_walk_ins.unwrap_or(profile.accepts_walk_ins),
        requires_appointment: draft
            .requires_appointment
            .unwrap_or(profile.requires_appointment),
        is_24_7: draft.is_24_7.unwrap_or(profile.is_24_7),
        quality_score,
        total_ratings: draft.total_ratings.unwrap_or(0),
        status_updated_by: None,
        status_updated_at: None,
        capacity_last_updated_at: None,
        verified_by: None,
        verified_at: None,
        created_at: now,
        version: 0,
        search_blob: String::new(),
    };
    if record.is_verified {
        record.verified_at = Some(now);
    }
    record.refresh_search_blob();
    Ok(record)
}

pub struct GeneralServiceFactory;

impl ServiceFactory for GeneralServiceFactory {
    fn kind(&self) -> &str {
        "general"
    }

    fn build(&self, draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError> {
        build_record(draft, now, GENERAL, &[])
    }
}

pub struct HealthcareServiceFactory;

impl ServiceFactory for HealthcareServiceFactory {
    fn kind(&self) -> &str {
        "healthcare"
    }

    fn build(&self, draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError> {
        if let Some(category) = draft.category {
            if category != CategoryType::Healthcare {
                return Err(OnboardingError::CategoryMismatch {
                    kind: self.kind().to_string(),
                    category: category.slug().to_string(),
                });
            }
        }
        let profile = Profile {
            accepts_walk_ins: false,
            requires_appointment: true,
            ..GENERAL
        };
        build_record(draft, now, profile, &["medical", "healthcare", "treatment"])
    }
}

pub struct ShelterServiceFactory;

pub const DEFAULT_SHELTER_CAPACITY: u32 = 50;

impl ServiceFactory for ShelterServiceFactory {
    fn kind(&self) -> &str {
        "shelter"
    }

    fn build(&self, draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError> {
        let profile = Profile {
            is_24_7: true,
            is_emergency_service: true,
            max_capacity: Some(DEFAULT_SHELTER_CAPACITY),
            ..GENERAL
        };
        build_record(
            draft,
            now,
            profile,
            &["shelter", "housing", "accommodation", "temporary"],
        )
    }
}

pub struct FoodServiceFactory;

impl ServiceFactory for FoodServiceFactory {
    fn kind(&self) -> &str {
        "food"
    }

    fn build(&self, draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError> {
        build_record(draft, now, GENERAL, &["food", "nutrition", "meals", "groceries"])
    }
}

pub struct EmergencyServiceFactory;

impl ServiceFactory for EmergencyServiceFactory {
    fn kind(&self) -> &str {
        "emergency"
    }

    fn build(&self, mut draft: ServiceDraft, now: DateTime<Utc>) -> Result<ServiceRecord, OnboardingError> {
        draft.is_active = Some(true);
        draft.is_emergency_service = Some(true);
        let profile = Profile {
            is_24_7: true,
            is_verified: true,
            ..GENERAL
        };
        build_record(
            draft,
            now,
            profile,
            &["emergency", "urgent", "24/7", "immediate"],
        )
    }
}

/// Picks a factory by explicit kind, else by category.
#[derive(Clone)]
pub struct ServiceFactoryRegistry {
    factories: BTreeMap<String, Arc<dyn ServiceFactory>>,
}

impl ServiceFactoryRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(Arc::new(GeneralServiceFactory));
        registry.register(Arc::new(HealthcareServiceFactory));
        registry.register(Arc::new(ShelterServiceFactory));
        registry.register(Arc::new(FoodServiceFactory));
        registry.register(Arc::new(EmergencyServiceFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn ServiceFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn kind_for_category(category: CategoryType) -> &'static str {
        match category {
            CategoryType::Healthcare => "healthcare",
            CategoryType::Shelter => "shelter",
            CategoryType::Food => "food",
            CategoryType::Emergency => "emergency",
            _ => "general",
        }
    }

    pub fn factory_for(
        &self,
        kind: Option<&str>,
        category: Option<CategoryType>,
    ) -> Result<Arc<dyn ServiceFactory>, OnboardingError> {
        let selected = match (kind, category) {
            (Some(kind), _) => kind,
            (None, Some(category)) => Self::kind_for_category(category),
            (None, None) => "general",
        };
        self.factories
            .get(selected)
            .cloned()
            .ok_or_else(|| OnboardingError::UnknownKind {
                kind: selected.to_string(),
                available: self.kinds(),
            })
    }

    pub fn build(
        &self,
        kind: Option<&str>,
        draft: ServiceDraft,
        now: DateTime<Utc>,
    ) -> Result<ServiceRecord, OnboardingError> {
        let factory = self.factory_for(kind, draft.category)?;
        let record = factory.build(draft, now)?;
        tracing::debug!(
            factory = factory.kind(),
            service_id = %record.id,
            name = %record.name,
            "service record built"
        );
        Ok(record)
    }
}

impl Default for ServiceFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(category: CategoryType) -> ServiceDraft {
        ServiceDraft {
            name: "Eastside Center".to_string(),
            description: "Drop-in support".to_string(),
            category: Some(category),
            latitude: Some(3.139),
            longitude: Some(101.6869),
            address: "12 Jalan Ampang".to_string(),
            city: "Kuala Lumpur".to_string(),
            tags: vec!["Drop-in".to_string(), "medical".to_string()],
            ..ServiceDraft::default()
        }
    }

    #[test]
    fn general_defaults_apply() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let record = registry
            .build(None, draft(CategoryType::Legal), Utc::now())
            .expect("builds");
        assert_eq!(record.status, ServiceStatus::Open);
        assert!(!record.is_verified);
        assert!(record.is_active);
        assert_eq!(record.current_capacity, 0);
        assert_eq!(record.max_capacity, None);
        assert!(record.search_blob.contains("eastside center"));
        assert!(record.search_blob.contains("legal aid"));
    }

    #[test]
    fn healthcare_requires_appointments_and_merges_tags() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let record = registry
            .build(None, draft(CategoryType::Healthcare), Utc::now())
            .expect("builds");
        assert!(record.requires_appointment);
        assert!(!record.accepts_walk_ins);
        assert_eq!(
            record.tags,
            vec!["drop-in", "healthcare", "medical", "treatment"]
        );
    }

    #[test]
    fn explicit_healthcare_kind_rejects_other_categories() {
        let registry = ServiceFactoryRegistry::with_defaults();
        match registry.build(Some("healthcare"), draft(CategoryType::Food), Utc::now()) {
            Err(OnboardingError::CategoryMismatch { category, .. }) => assert_eq!(category, "food"),
            other => panic!("expected category mismatch, got {other:?}"),
        }
    }

    #[test]
    fn shelter_defaults_capacity_and_rejects_zero() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let record = registry
            .build(None, draft(CategoryType::Shelter), Utc::now())
            .expect("builds");
        assert_eq!(record.max_capacity, Some(DEFAULT_SHELTER_CAPACITY));
        assert!(record.is_24_7);
        assert!(record.is_emergency_service);

        let mut zero = draft(CategoryType::Shelter);
        zero.max_capacity = Some(0);
        assert!(matches!(
            registry.build(None, zero, Utc::now()),
            Err(OnboardingError::InvalidField {
                field: "max_capacity",
                ..
            })
        ));
    }

    #[test]
    fn emergency_factory_forces_flags_and_preverifies() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let mut input = draft(CategoryType::Emergency);
        input.is_active = Some(false);
        input.is_emergency_service = Some(false);
        let now = Utc::now();
        let record = registry.build(None, input, now).expect("builds");
        assert!(record.is_active);
        assert!(record.is_emergency_service);
        assert!(record.is_verified);
        assert_eq!(record.verified_at, Some(now));
        assert!(record.tags.contains(&"24/7".to_string()));
    }

    #[test]
    fn missing_fields_are_listed() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let input = ServiceDraft {
            name: "Only a name".to_string(),
            ..ServiceDraft::default()
        };
        match registry.build(None, input, Utc::now()) {
            Err(OnboardingError::MissingFields(fields)) => {
                assert_eq!(
                    fields,
                    vec!["description", "address", "city", "category", "location"]
                );
            }
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let registry = ServiceFactoryRegistry::with_defaults();
        let mut input = draft(CategoryType::Food);
        input.latitude = Some(91.0);
        assert!(matches!(
            registry.build(None, input, Utc::now()),
            Err(OnboardingError::InvalidLocation(CoordinateError::Latitude(_)))
        ));
    }

    #[test]
    fn unknown_kind_lists_available() {
        let registry = ServiceFactoryRegistry::with_defaults();
        match registry.factory_for(Some("spa"), None) {
            Err(OnboardingError::UnknownKind { available, .. }) => {
                assert_eq!(
                    available,
                    vec!["emergency", "food", "general", "healthcare", "shelter"]
                );
            }
            Err(other) => panic!("expected unknown kind, got {other:?}"),
            Ok(_) => panic!("expected unknown kind"),
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::alerts::AlertStore;
use super::domain::{ActorId, CategoryType, ServiceId};
use super::engine::{StatusTransitionEngine, TransitionError, TransitionOutcome};
use super::geo::Coordinate;
use super::search::{SearchCriteria, SearchError, SearchRankingEngine};
use super::store::ServiceStore;

/// Everything the availability endpoints need, shared behind one `Arc`.
pub struct AvailabilityState<S> {
    pub engine: Arc<StatusTransitionEngine<S>>,
    pub search: Arc<SearchRankingEngine<S>>,
    pub alerts: Arc<dyn AlertStore>,
}

pub fn availability_router<S>(state: Arc<AvailabilityState<S>>) -> Router
where
    S: ServiceStore + 'static,
{
    Router::new()
        .route("/api/v1/services", get(search_handler::<S>))
        .route("/api/v1/services/:service_id", get(service_handler::<S>))
        .route(
            "/api/v1/services/:service_id/capacity",
            post(capacity_handler::<S>),
        )
        .route(
            "/api/v1/services/:service_id/status",
            post(status_handler::<S>),
        )
        .route(
            "/api/v1/services/:service_id/verify",
            post(verify_handler::<S>),
        )
        .route(
            "/api/v1/services/:service_id/alerts",
            get(alerts_handler::<S>),
        )
        .route("/api/v1/search/strategies", get(strategies_handler::<S>))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_km: Option<f64>,
    pub category: Option<CategoryType>,
    pub emergency_only: bool,
    pub include_full: bool,
    pub strategy: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CapacityUpdate {
    pub capacity: i64,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub actor_id: String,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, axum::Json(payload)).into_response()
}

fn transition_error_response(error: TransitionError) -> Response {
    let status = match &error {
        TransitionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TransitionError::NotFound(_) => StatusCode::NOT_FOUND,
        TransitionError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TransitionError::Conflict { .. } => StatusCode::CONFLICT,
        TransitionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, error.to_string())
}

fn outcome_response(outcome: TransitionOutcome) -> Response {
    let events: Vec<_> = outcome.events.iter().map(|event| event.as_ref()).collect();
    let payload = json!({
        "service": outcome.record,
        "events": events,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn search_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Query(params): Query<SearchParams>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let origin = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => match Coordinate::new(lat, lon) {
            Ok(origin) => Some(origin),
            Err(err) => return error_body(StatusCode::BAD_REQUEST, err.to_string()),
        },
        (None, None) => None,
        _ => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "lat and lon must be supplied together",
            )
        }
    };

    let criteria = SearchCriteria {
        query: params.q,
        origin,
        max_distance_km: params.radius_km,
        category: params.category,
        emergency_only: params.emergency_only,
        include_full: params.include_full,
        include_unlisted: false,
        offset: params.offset,
        limit: params.limit,
    };

    let strategy = params
        .strategy
        .unwrap_or_else(|| state.search.registry().default_name().to_string());
    match state.search.search_with(&strategy, &criteria) {
        Ok(hits) => {
            let payload = json!({
                "strategy": strategy,
                "count": hits.len(),
                "results": hits,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err @ SearchError::UnknownStrategy { .. }) => {
            error_body(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(other) => error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

pub(crate) async fn service_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Path(service_id): Path<String>,
) -> Response
where
    S: ServiceStore + 'static,
{
    match state.engine.get(&ServiceId(service_id)) {
        Ok(record) => {
            let payload = json!({
                "service": record,
                "capacity_percentage": record.capacity_percentage(),
                "capacity_band": record.capacity_band(),
                "is_open_now": record.is_open_now(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => transition_error_response(err),
    }
}

pub(crate) async fn capacity_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Path(service_id): Path<String>,
    axum::Json(update): axum::Json<CapacityUpdate>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let result = state
        .engine
        .update_capacity(
            &ServiceId(service_id),
            update.capacity,
            &ActorId(update.actor_id),
        )
        .await;
    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => transition_error_response(err),
    }
}

pub(crate) async fn status_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Path(service_id): Path<String>,
    axum::Json(update): axum::Json<StatusUpdate>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let result = state
        .engine
        .update_status_named(
            &ServiceId(service_id),
            &update.status,
            &ActorId(update.actor_id),
        )
        .await;
    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => transition_error_response(err),
    }
}

pub(crate) async fn verify_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Path(service_id): Path<String>,
    axum::Json(request): axum::Json<VerifyRequest>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let result = state
        .engine
        .verify(&ServiceId(service_id), &ActorId(request.actor_id))
        .await;
    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => transition_error_response(err),
    }
}

pub(crate) async fn alerts_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
    Path(service_id): Path<String>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let id = ServiceId(service_id);
    if let Err(err) = state.engine.get(&id) {
        return transition_error_response(err);
    }
    match state.alerts.active_for(&id, Utc::now()) {
        Ok(alerts) => {
            let payload = json!({
                "service_id": id,
                "alerts": alerts,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn strategies_handler<S>(
    State(state): State<Arc<AvailabilityState<S>>>,
) -> Response
where
    S: ServiceStore + 'static,
{
    let strategies: Vec<_> = state
        .search
        .registry()
        .descriptions()
        .into_iter()
        .map(|(name, description)| json!({ "name": name, "description": description }))
        .collect();
    let payload = json!({
        "default": state.search.registry().default_name(),
        "strategies": strategies,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

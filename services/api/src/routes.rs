use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use commumap::availability::{availability_router, AvailabilityState, ServiceStore};
use commumap::config::FeatureFlagProvider;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct EmergencyModeRequest {
    pub(crate) enabled: bool,
}

pub(crate) fn with_operational_routes<S>(state: Arc<AvailabilityState<S>>) -> axum::Router
where
    S: ServiceStore + 'static,
{
    availability_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/admin/emergency-mode",
            axum::routing::get(emergency_mode_endpoint).post(set_emergency_mode_endpoint),
        )
        .route(
            "/api/v1/admin/deliveries",
            axum::routing::get(deliveries_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn emergency_mode_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({ "emergency_mode": state.flags.emergency_mode() }))
}

pub(crate) async fn set_emergency_mode_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<EmergencyModeRequest>,
) -> Json<serde_json::Value> {
    state.flags.set_emergency_mode(request.enabled);
    tracing::warn!(enabled = request.enabled, "emergency mode changed");
    Json(json!({ "emergency_mode": state.flags.emergency_mode() }))
}

pub(crate) async fn deliveries_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "delivered": state.ledger.delivered(),
        "failures": state.ledger.failures(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use commumap::availability::DeliveryLedger;
    use commumap::config::{FeatureConfig, ToggleFeatureFlags};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;

    fn app_state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            flags: Arc::new(ToggleFeatureFlags::new(FeatureConfig::default())),
            ledger: Arc::new(DeliveryLedger::default()),
        }
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let response = readiness_endpoint(Extension(app_state(false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(app_state(true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn emergency_mode_can_be_flipped() {
        let state = app_state(true);

        let Json(body) = set_emergency_mode_endpoint(
            Extension(state.clone()),
            Json(EmergencyModeRequest { enabled: true }),
        )
        .await;
        assert_eq!(body["emergency_mode"], true);

        let Json(body) = emergency_mode_endpoint(Extension(state.clone())).await;
        assert_eq!(body["emergency_mode"], true);
        assert!(state.flags.emergency_mode());
    }

    #[tokio::test]
    async fn deliveries_start_empty() {
        let Json(body) = deliveries_endpoint(Extension(app_state(true))).await;
        assert_eq!(body["delivered"], 0);
        assert_eq!(body["failures"].as_array().map(Vec::len), Some(0));
    }
}

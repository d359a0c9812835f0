use crate::cli::ServeArgs;
use crate::infra::{build_availability, load_catalog, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use commumap::config::AppConfig;
use commumap::error::AppError;
use commumap::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let records = load_catalog(args.catalog.as_deref())?;
    let availability = build_availability(&config, records, std::mem::take(&mut args.routes))?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        flags: availability.flags.clone(),
        ledger: availability.ledger.clone(),
    };

    let app = with_operational_routes(availability.state.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        services = availability.store.len(),
        emergency_mode = config.features.emergency_mode,
        "commumap availability service ready"
    );

    axum::serve(listener, app).await?;
    availability.worker.abort();
    Ok(())
}

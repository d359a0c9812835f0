use async_trait::async_trait;
use chrono::Utc;
use commumap::availability::{
    AlertObserver, AlertStore, AuditObserver, AvailabilityState, CatalogImporter, Channel,
    ChannelObserver, ChannelRoute, ChannelSendError, ChannelSender, ChannelWorker,
    DeliveryLedger, InMemoryAlertStore, InMemoryAuditRecorder, InMemoryServiceStore,
    NotificationDispatcher, RetryPolicy, SearchRankingEngine, ServiceRecord,
    StatusTransitionEngine, StrategyRegistry,
};
use commumap::config::{AppConfig, ToggleFeatureFlags};
use commumap::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;

const SEED_CATALOG: &str = include_str!("../data/seed_services.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) flags: Arc<ToggleFeatureFlags>,
    pub(crate) ledger: Arc<DeliveryLedger>,
}

/// Stand-in transport that writes each delivery to the log.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LoggingChannelSender;

#[async_trait]
impl ChannelSender for LoggingChannelSender {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &str,
    ) -> Result<(), ChannelSendError> {
        if recipient.trim().is_empty() {
            return Err(ChannelSendError::Rejected("empty recipient".to_string()));
        }
        tracing::info!(
            channel = channel.label(),
            recipient,
            bytes = payload.len(),
            "notification sent"
        );
        Ok(())
    }
}

/// Parse `channel:recipient`, e.g. `sms:+60123456789`.
pub(crate) fn parse_route(raw: &str) -> Result<ChannelRoute, String> {
    let (channel, recipient) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected CHANNEL:RECIPIENT, got '{raw}'"))?;
    let channel = match channel.trim().to_ascii_lowercase().as_str() {
        "email" => Channel::Email,
        "sms" => Channel::Sms,
        "push" => Channel::Push,
        other => return Err(format!("unknown channel '{other}' (email, sms, push)")),
    };
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err("recipient must not be empty".to_string());
    }
    Ok(ChannelRoute {
        channel,
        recipient: recipient.to_string(),
        change_types: Vec::new(),
    })
}

/// Catalog from `path`, or the bundled seed catalog.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<Vec<ServiceRecord>, AppError> {
    let importer = CatalogImporter::default();
    let records = match path {
        Some(path) => importer.from_path(path, Utc::now())?,
        None => importer.from_reader(SEED_CATALOG.as_bytes(), Utc::now())?,
    };
    Ok(records)
}

/// In-memory wiring of every availability collaborator.
pub(crate) struct Availability {
    pub(crate) state: Arc<AvailabilityState<InMemoryServiceStore>>,
    pub(crate) store: Arc<InMemoryServiceStore>,
    pub(crate) audit: Arc<InMemoryAuditRecorder>,
    pub(crate) alerts: Arc<InMemoryAlertStore>,
    pub(crate) flags: Arc<ToggleFeatureFlags>,
    pub(crate) ledger: Arc<DeliveryLedger>,
    pub(crate) worker: JoinHandle<()>,
}

/// Must run inside a tokio runtime; spawns the channel worker.
pub(crate) fn build_availability(
    config: &AppConfig,
    records: Vec<ServiceRecord>,
    routes: Vec<ChannelRoute>,
) -> Result<Availability, AppError> {
    let store = Arc::new(InMemoryServiceStore::with_records(records)?);
    let audit = Arc::new(InMemoryAuditRecorder::default());
    let alerts = Arc::new(InMemoryAlertStore::default());
    let flags = Arc::new(ToggleFeatureFlags::new(config.features));
    let ledger = Arc::new(DeliveryLedger::default());

    let dispatcher = Arc::new(NotificationDispatcher::new(
        config.dispatch.observer_timeout,
    ));
    dispatcher.subscribe(Arc::new(AuditObserver::new(audit.clone())));
    dispatcher.subscribe(Arc::new(AlertObserver::new(alerts.clone())));

    let route_count = routes.len();
    let (channels, queue) = ChannelObserver::new(
        routes,
        config.dispatch.channel_queue_depth,
        ledger.clone(),
    );
    dispatcher.subscribe(Arc::new(channels));
    let worker = ChannelWorker::new(
        queue,
        Arc::new(LoggingChannelSender),
        RetryPolicy::from(config.dispatch),
        ledger.clone(),
    )
    .spawn();

    let engine = Arc::new(StatusTransitionEngine::new(
        store.clone(),
        dispatcher.clone(),
        config.engine,
    ));
    let search = Arc::new(SearchRankingEngine::new(
        store.clone(),
        StrategyRegistry::with_defaults(),
        flags.clone(),
    ));
    let alert_store: Arc<dyn AlertStore> = alerts.clone();

    tracing::info!(
        services = store.len(),
        observers = dispatcher.observer_count(),
        channel_routes = route_count,
        "availability engine wired"
    );

    Ok(Availability {
        state: Arc::new(AvailabilityState {
            engine,
            search,
            alerts: alert_store,
        }),
        store,
        audit,
        alerts,
        flags,
        ledger,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_parse_channel_and_recipient() {
        let route = parse_route("SMS:+60123456789").expect("valid route");
        assert_eq!(route.channel, Channel::Sms);
        assert_eq!(route.recipient, "+60123456789");
        assert!(route.change_types.is_empty());

        assert!(parse_route("pager:123").is_err());
        assert!(parse_route("email:").is_err());
        assert!(parse_route("ops@example.org").is_err());
    }

    #[test]
    fn bundled_catalog_loads() {
        let records = load_catalog(None).expect("seed catalog parses");
        assert_eq!(records.len(), 8);
        assert!(records.iter().any(|record| record.is_emergency_service));
    }

    #[tokio::test]
    async fn logging_sender_rejects_blank_recipient() {
        let sender = LoggingChannelSender;
        assert!(sender.send(Channel::Email, "ops@example.org", "{}").await.is_ok());
        assert!(matches!(
            sender.send(Channel::Email, "  ", "{}").await,
            Err(ChannelSendError::Rejected(_))
        ));
    }
}

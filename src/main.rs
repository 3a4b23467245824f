//! Reservation engine HTTP server.

use std::sync::Arc;
use std::time::Duration;

use stayhub::availability::{AvailabilityResolver, BlockedDateAggregator};
use stayhub::booking::BookingLedger;
use stayhub::calendar::{ExternalCalendarCache, HttpCalendarFetcher};
use stayhub::clock::SystemClock;
use stayhub::config::Config;
use stayhub::notify::{LogNotifier, Notifier};
use stayhub::payments::{
    DeferredChargeScheduler, HttpPaymentGateway, PaymentGateway, PaymentOrchestrator,
};
use stayhub::repo::{BookingRepo, ListingRepo, PostgresStore};
use stayhub::server::{AppState, build_router};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting reservation engine");
    stayhub::metrics::register_business_metrics();

    info!(url = %config.postgres.url, "Connecting to database");
    let store = Arc::new(PostgresStore::connect(&config.postgres).await?);
    let listings: Arc<dyn ListingRepo> = store.clone();
    let bookings: Arc<dyn BookingRepo> = store.clone();

    let fetcher = Arc::new(HttpCalendarFetcher::new(Duration::from_secs(
        config.calendar.fetch_timeout,
    ))?);
    let calendar_cache = Arc::new(ExternalCalendarCache::new(
        fetcher,
        Duration::from_secs(config.calendar.cache_ttl),
    ));

    let aggregator = BlockedDateAggregator::new(
        bookings.clone(),
        listings.clone(),
        calendar_cache.clone(),
    );
    let resolver = Arc::new(AvailabilityResolver::new(listings.clone(), aggregator));

    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
        config.gateway.base_url.clone(),
        config.gateway.api_secret.clone(),
        Duration::from_secs(config.gateway.timeout),
    )?);
    let payments = Arc::new(PaymentOrchestrator::new(gateway));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let clock = Arc::new(SystemClock);

    let ledger = Arc::new(BookingLedger::new(
        listings.clone(),
        bookings.clone(),
        resolver.clone(),
        payments,
        notifier,
        clock,
    ));

    let scheduler = Arc::new(DeferredChargeScheduler::new(
        ledger.clone(),
        Duration::from_secs(config.scheduler.interval),
    ));
    let scheduler_task = scheduler.clone().spawn();
    info!(
        interval_secs = config.scheduler.interval,
        "Deferred charge scheduler started"
    );

    let state = AppState {
        listings,
        bookings,
        ledger,
        resolver,
        calendar_cache,
        scheduler,
        trigger_secret: config.scheduler.trigger_secret.clone(),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_task.abort();
    store.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

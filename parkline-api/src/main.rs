use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use parkline_api::{app, worker, AppState, AuthConfig};
use parkline_booking::{MockPaymentGateway, ReservationPolicy};
use parkline_core::payment::PaymentGateway;
use parkline_store::{Config, DbClient, HttpOccupancyFeed, HttpPaymentGateway, PgParkingStore, RedisClient, StoreNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkline_api=debug,parkline_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Parkline API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let store = Arc::new(PgParkingStore::new(db.pool.clone()));

    let gateway: Arc<dyn PaymentGateway> = if config.gateway.mock {
        tracing::warn!("Using the in-process mock payment gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(HttpPaymentGateway::new(config.gateway.clone()).context("Failed to build gateway client")?)
    };

    let rules = &config.business_rules;
    let policy = ReservationPolicy {
        payment_timeout_seconds: rules.payment_timeout_seconds,
        reservation_window_minutes: rules.reservation_window_minutes,
        ban_failed_payments_threshold: rules.ban_failed_payments_threshold,
        ban_duration_hours: rules.ban_duration_hours,
    };

    let mut app_state = AppState::new(
        store.clone(),
        gateway,
        Arc::new(StoreNotifier::new(store.clone())),
        policy,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            webhook_secret: config.gateway.webhook_secret.clone(),
        },
    );

    // Rate limiting is optional; the API runs without Redis
    match config.redis.url() {
        Some(url) => {
            let connected = match RedisClient::new(url).await {
                Ok(redis) => redis.ping().await.map(|_| redis),
                Err(e) => Err(e),
            };
            match connected {
                Ok(redis) => {
                    tracing::info!("Connected to Redis, rate limiting enabled");
                    app_state = app_state.with_rate_limit(Arc::new(redis), config.redis.rate_limit_per_minute);
                }
                Err(e) => tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled"),
            }
        }
        None => tracing::info!("Redis not configured, rate limiting disabled"),
    }

    let cancel = CancellationToken::new();
    let feed = Arc::new(HttpOccupancyFeed::new(&config.sensor).context("Failed to build sensor feed client")?);
    let reconciler = tokio::spawn(worker::run(
        app_state.engine.clone(),
        feed,
        Duration::from_secs(rules.poll_interval_seconds),
        cancel.clone(),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind")?;
    let shutdown = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    })
    .await
    .context("Server error")?;

    cancel.cancel();
    reconciler.await.context("Reconciliation worker panicked")?;
    Ok(())
}

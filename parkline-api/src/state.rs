use std::sync::Arc;

use tokio::sync::broadcast;
use parkline_booking::{AdmissionController, PaymentOrchestrator, ReconciliationEngine, ReservationPolicy};
use parkline_core::notify::Notifier;
use parkline_core::payment::PaymentGateway;
use parkline_core::{NotificationLog, ParkingStore, UserDirectory};
use parkline_shared::SlotStatusChanged;
use parkline_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    /// Key the gateway signs webhook bodies with. Empty rejects every webhook.
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ParkingStore>,
    pub users: Arc<dyn UserDirectory>,
    pub notifications: Arc<dyn NotificationLog>,
    pub admission: Arc<AdmissionController>,
    pub payments: Arc<PaymentOrchestrator>,
    pub engine: Arc<ReconciliationEngine>,
    pub sse_tx: broadcast::Sender<SlotStatusChanged>,
    pub rate_limit: Option<RateLimit>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire the reservation core over one backing store.
    pub fn new<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        policy: ReservationPolicy,
        auth: AuthConfig,
    ) -> Self
    where
        S: ParkingStore + UserDirectory + NotificationLog + 'static,
    {
        let (sse_tx, _) = broadcast::channel(100);

        let admission = AdmissionController::new(store.clone(), store.clone(), gateway.clone(), policy.clone())
            .with_events(sse_tx.clone());
        let payments = PaymentOrchestrator::new(store.clone(), store.clone(), gateway.clone(), notifier)
            .with_events(sse_tx.clone());
        let engine = ReconciliationEngine::new(store.clone(), gateway, policy.payment_timeout_seconds)
            .with_events(sse_tx.clone());

        Self {
            store: store.clone(),
            users: store.clone(),
            notifications: store,
            admission: Arc::new(admission),
            payments: Arc::new(payments),
            engine: Arc::new(engine),
            sse_tx,
            rate_limit: None,
            auth,
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit { redis, per_minute });
        self
    }
}

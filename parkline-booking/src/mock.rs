use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use parkline_core::payment::{CheckoutSession, GatewayError, PaymentGateway};

/// In-process gateway for local runs and tests. Sessions are never paid on
/// their own; drive confirmations through the webhook or the orchestrator.
#[derive(Default)]
pub struct MockPaymentGateway {
    counter: AtomicU64,
    failing: AtomicBool,
    opened: Mutex<Vec<CheckoutSession>>,
    expired: Mutex<Vec<String>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn opened_sessions(&self) -> Vec<CheckoutSession> {
        self.opened.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn expired_sessions(&self) -> Vec<String> {
        self.expired.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn was_expired(&self, session_id: &str) -> bool {
        self.expired_sessions().iter().any(|s| s == session_id)
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("Simulated payment gateway failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(&self, amount: i64, _description: &str) -> Result<CheckoutSession, GatewayError> {
        self.check_available()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session = CheckoutSession {
            session_id: format!("cs_mock_{n:06}"),
            checkout_url: format!("https://checkout.mock.local/cs_mock_{n:06}"),
            amount,
        };
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(session.clone());
        }
        Ok(session)
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        if let Ok(mut expired) = self.expired.lock() {
            if !expired.iter().any(|s| s == session_id) {
                expired.push(session_id.to_string());
            }
        }
        Ok(())
    }
}

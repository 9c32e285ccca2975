use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A checkout session opened at the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
    /// Minor currency units, as echoed back by the gateway.
    pub amount: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Transport(String),
    #[error("Gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session for `amount` minor units
    async fn create_checkout_session(
        &self,
        amount: i64,
        description: &str,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Expire a session so it can no longer be paid. Safe to repeat.
    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), GatewayError>;
}

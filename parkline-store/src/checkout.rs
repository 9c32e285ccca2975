//! Hosted-checkout gateway over HTTP (PayMongo-style checkout sessions).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use parkline_core::payment::{CheckoutSession, GatewayError, PaymentGateway};

use crate::app_config::GatewayConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Deserialize)]
struct SessionEnvelope {
    data: SessionData,
}

#[derive(Deserialize)]
struct SessionData {
    id: String,
    attributes: SessionAttributes,
}

#[derive(Deserialize)]
struct SessionAttributes {
    checkout_url: String,
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Deserialize)]
struct LineItem {
    amount: i64,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn rejected(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GatewayError::Rejected { status, body }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout_session(&self, amount: i64, description: &str) -> Result<CheckoutSession, GatewayError> {
        let payload = json!({
            "data": {
                "attributes": {
                    "send_email_receipt": true,
                    "show_description": true,
                    "show_line_items": true,
                    "cancel_url": self.config.cancel_url,
                    "success_url": self.config.success_url,
                    "description": description,
                    "payment_method_types": ["gcash", "paymaya", "card"],
                    "line_items": [{
                        "currency": self.config.currency,
                        "amount": amount,
                        "name": description,
                        "quantity": 1
                    }]
                }
            }
        });

        let response = self
            .client
            .post(self.url("checkout_sessions"))
            .basic_auth(&self.config.secret_key, Some(""))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let envelope = response
            .json::<SessionEnvelope>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        let echoed = envelope
            .data
            .attributes
            .line_items
            .first()
            .map(|item| item.amount)
            .unwrap_or(amount);

        tracing::debug!(session_id = %envelope.data.id, amount = echoed, "Checkout session opened");
        Ok(CheckoutSession {
            session_id: envelope.data.id,
            checkout_url: envelope.data.attributes.checkout_url,
            amount: echoed,
        })
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("checkout_sessions/{}/expire", session_id)))
            .basic_auth(&self.config.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_envelope_decodes() {
        let body = r#"{
            "data": {
                "id": "cs_abc",
                "attributes": {
                    "checkout_url": "https://checkout.example/cs_abc",
                    "line_items": [{ "amount": 3000, "currency": "PHP", "name": "Reservation Fee", "quantity": 1 }]
                }
            }
        }"#;
        let envelope: SessionEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.id, "cs_abc");
        assert_eq!(envelope.data.attributes.line_items[0].amount, 3000);
    }

    #[test]
    fn test_url_joins_base_without_double_slash() {
        let gateway = HttpPaymentGateway::new(GatewayConfig {
            base_url: "https://api.example.com/".to_string(),
            secret_key: "sk_test".to_string(),
            currency: "PHP".to_string(),
            success_url: "https://app/ok".to_string(),
            cancel_url: "https://app/cancel".to_string(),
            mock: false,
            webhook_secret: "whsk_test".to_string(),
        })
        .unwrap();
        assert_eq!(gateway.url("checkout_sessions"), "https://api.example.com/v1/checkout_sessions");
    }
}

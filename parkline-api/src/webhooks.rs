use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use parkline_booking::ConfirmationOutcome;

use crate::{error::AppError, state::AppState};

type HmacSha256 = Hmac<Sha256>;

/// `t=<unix seconds>,te=<test mode hex>,li=<live mode hex>`
pub const SIGNATURE_HEADER: &str = "paymongo-signature";

/// Gateway event envelope: `{ "data": { "attributes": { "type", "data": { "id" } } } }`.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub data: WebhookEvent,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub attributes: WebhookAttributes,
}

#[derive(Debug, Deserialize)]
pub struct WebhookAttributes {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
}

#[derive(Debug, PartialEq, Eq)]
enum EventKind {
    Paid,
    Failed,
    Other,
}

fn classify(event_type: &str) -> EventKind {
    match event_type {
        "checkout_session.payment.paid" | "payment.paid" => EventKind::Paid,
        "payment.failed" | "checkout_session.expired" => EventKind::Failed,
        _ => EventKind::Other,
    }
}

/// HMAC-SHA256 over `"{timestamp}.{body}"`, hex encoded.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, AppError> {
    let mac = signed_mac(secret, timestamp, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signed_mac(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::AuthenticationError(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Check the signature header against the raw body before anything reads it.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let rejected = |msg: &str| AppError::AuthenticationError(msg.to_string());

    if secret.is_empty() {
        return Err(rejected("Webhook signing is not configured"));
    }
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| rejected("Missing webhook signature"))?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("te" | "li", v)) if !v.is_empty() => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| rejected("Malformed webhook signature"))?;

    for candidate in signatures {
        let Some(expected) = hex::decode(candidate) else { continue };
        if signed_mac(secret, timestamp, body)?.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(rejected("Invalid webhook signature"))
}

/// POST /v1/webhooks/payments
/// Receive checkout session results from the payment gateway
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Option<ConfirmationOutcome>>, AppError> {
    if let Err(e) = verify_signature(&state.auth.webhook_secret, &headers, &body) {
        tracing::warn!(error = %e, "Rejected unsigned payment webhook");
        return Err(e);
    }
    let payload: PaymentWebhook =
        serde_json::from_slice(&body).map_err(|e| AppError::ValidationError(format!("Invalid webhook body: {}", e)))?;

    let event_type = payload.data.attributes.type_.as_str();
    let session_id = payload.data.attributes.data.id.as_str();
    tracing::info!(event_type, session_id, "Received payment webhook");

    let outcome = match classify(event_type) {
        EventKind::Paid => Some(state.payments.on_payment_confirmed(session_id, Utc::now()).await?),
        EventKind::Failed => Some(state.payments.on_payment_failed(session_id, Utc::now()).await?),
        EventKind::Other => {
            tracing::debug!(event_type, "Webhook event ignored");
            None
        }
    };

    if outcome == Some(ConfirmationOutcome::AlreadyProcessed) {
        tracing::warn!(session_id, "Duplicate payment webhook");
    }

    Ok(Json(outcome))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const BODY: &[u8] = br#"{"data":{"attributes":{"type":"payment.paid","data":{"id":"cs_1"}}}}"#;

    fn signed(header: String) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&header).unwrap());
        headers
    }

    #[test]
    fn test_signature_accepts_live_or_test_mode() {
        let sig = sign_payload("whsk", 1700000000, BODY).unwrap();
        assert!(verify_signature("whsk", &signed(format!("t=1700000000,te=,li={}", sig)), BODY).is_ok());
        assert!(verify_signature("whsk", &signed(format!("t=1700000000,te={},li=", sig)), BODY).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let sig = sign_payload("whsk", 1700000000, BODY).unwrap();
        let tampered = br#"{"data":{"attributes":{"type":"payment.paid","data":{"id":"cs_2"}}}}"#;

        assert!(verify_signature("whsk", &signed(format!("t=1700000000,li={}", sig)), tampered).is_err());
        assert!(verify_signature("other", &signed(format!("t=1700000000,li={}", sig)), BODY).is_err());
        assert!(verify_signature("whsk", &signed(format!("t=1700000001,li={}", sig)), BODY).is_err());
        assert!(verify_signature("whsk", &signed(format!("li={}", sig)), BODY).is_err());
        assert!(verify_signature("whsk", &signed("t=1700000000,li=zz".into()), BODY).is_err());
        assert!(verify_signature("whsk", &HeaderMap::new(), BODY).is_err());
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let sig = sign_payload("", 1700000000, BODY).unwrap();
        assert!(verify_signature("", &signed(format!("t=1700000000,li={}", sig)), BODY).is_err());
    }

    #[test]
    fn test_classify_event_types() {
        assert_eq!(classify("checkout_session.payment.paid"), EventKind::Paid);
        assert_eq!(classify("payment.failed"), EventKind::Failed);
        assert_eq!(classify("checkout_session.expired"), EventKind::Failed);
        assert_eq!(classify("source.chargeable"), EventKind::Other);
    }

    #[test]
    fn test_envelope_decodes() {
        let body = r#"{"data":{"id":"evt_1","attributes":{"type":"checkout_session.payment.paid","data":{"id":"cs_9","attributes":{}}}}}"#;
        let hook: PaymentWebhook = serde_json::from_str(body).unwrap();
        assert_eq!(hook.data.attributes.data.id, "cs_9");
    }
}

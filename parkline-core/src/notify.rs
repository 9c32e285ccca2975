use async_trait::async_trait;
use parkline_shared::{NotificationKind, User};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Best-effort, at-most-once side channel to the user.
///
/// Called only after the state change it reports has committed; an error is
/// logged by the caller and never undoes the transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user: &User,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Short human-readable line for a notification.
pub fn render_message(kind: NotificationKind, payload: &serde_json::Value) -> String {
    let slot = payload.get("slot_number").and_then(|v| v.as_i64()).unwrap_or_default();
    match kind {
        NotificationKind::ReservationCreated => {
            let start = payload.get("start_time").and_then(|v| v.as_str()).unwrap_or("-");
            format!("Reservation for Slot {} at {} has been made.", slot, start)
        }
        NotificationKind::ReservationExtended => {
            let until = payload.get("expiration_time").and_then(|v| v.as_str()).unwrap_or("-");
            format!("Your reservation for Slot {} has been extended to {}.", slot, until)
        }
    }
}

/// Notifier that only writes to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        user: &User,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(user_id = %user.id, kind = %kind, "{}", render_message(kind, &payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_message() {
        let msg = render_message(
            NotificationKind::ReservationExtended,
            &json!({ "slot_number": 4, "expiration_time": "2026-01-01T10:30:00Z" }),
        );
        assert_eq!(msg, "Your reservation for Slot 4 has been extended to 2026-01-01T10:30:00Z.");
    }
}

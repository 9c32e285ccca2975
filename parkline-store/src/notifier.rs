use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use parkline_core::notify::{render_message, Notifier, NotifyError};
use parkline_core::NotificationLog;
use parkline_shared::{Notification, NotificationKind, User};

/// Persists each notification so the user can read it back in-app.
pub struct StoreNotifier {
    log: Arc<dyn NotificationLog>,
}

impl StoreNotifier {
    pub fn new(log: Arc<dyn NotificationLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify(
        &self,
        user: &User,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: user.id,
            kind: kind.as_str().to_string(),
            message: render_message(kind, &payload),
            payload,
            is_read: false,
            created_at: Utc::now(),
        };

        self.log
            .record(&notification)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        tracing::info!(user_id = %user.id, kind = %kind, "Notification recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkline_core::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_notification_is_persisted_with_rendered_message() {
        let store = Arc::new(MemoryStore::new());
        let notifier = StoreNotifier::new(store.clone());
        let user = User {
            id: Uuid::new_v4(),
            username: "ana".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Reyes".to_string(),
            email: "ana@example.com".to_string().into(),
            contact_number: "09171234567".to_string().into(),
            is_banned: false,
            ban_end_time: None,
        };

        notifier
            .notify(&user, NotificationKind::ReservationCreated, json!({ "slot_number": 4, "start_time": "09:00" }))
            .await
            .unwrap();

        let saved = store.list_for_user(user.id).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].kind, "RESERVATION_CREATED");
        assert!(saved[0].message.contains("Slot 4"));
    }
}

//! Payment tracker operations on a locked slot.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use parkline_core::payment::CheckoutSession;
use parkline_core::{CoreResult, SlotTransaction};
use parkline_shared::{FeeType, Payment, PaymentStatus};

/// Record a pending payment backed by an already opened checkout session.
pub async fn create_pending(
    tx: &mut dyn SlotTransaction,
    booking_id: Uuid,
    fee_type: FeeType,
    amount: i64,
    session: &CheckoutSession,
    now: DateTime<Utc>,
) -> CoreResult<Payment> {
    let payment = Payment::pending(
        booking_id,
        fee_type,
        amount,
        session.session_id.clone(),
        Some(session.checkout_url.clone()),
        now,
    );
    tx.insert_payment(&payment).await?;
    Ok(payment)
}

pub async fn mark_paid(tx: &mut dyn SlotTransaction, payment: &mut Payment) -> CoreResult<()> {
    tx.update_payment_status(payment.id, PaymentStatus::Paid).await?;
    payment.status = PaymentStatus::Paid;
    Ok(())
}

pub async fn mark_failed(tx: &mut dyn SlotTransaction, payment: &mut Payment) -> CoreResult<()> {
    tx.update_payment_status(payment.id, PaymentStatus::Failed).await?;
    payment.status = PaymentStatus::Failed;
    Ok(())
}

pub async fn find_pending(
    tx: &mut dyn SlotTransaction,
    booking_id: Uuid,
    fee_type: FeeType,
) -> CoreResult<Option<Payment>> {
    Ok(tx
        .payments_for(booking_id)
        .await?
        .into_iter()
        .find(|p| p.fee_type == fee_type && p.status == PaymentStatus::Pending))
}

/// The booking's reservation payment, newest first if more than one exists.
pub fn reservation_of(payments: &[Payment]) -> Option<&Payment> {
    payments
        .iter()
        .filter(|p| p.fee_type == FeeType::Reservation)
        .max_by_key(|p| p.created_at)
}

pub fn pending_extension_of(payments: &[Payment]) -> Option<&Payment> {
    payments
        .iter()
        .find(|p| p.fee_type == FeeType::Extension && p.status == PaymentStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parkline_core::memory::MemoryStore;
    use parkline_core::ParkingStore;

    use crate::ledger;

    #[tokio::test]
    async fn test_pending_payment_lifecycle_on_locked_slot() {
        let store = MemoryStore::new();
        store.provision_slots(&[7]).await.unwrap();
        let now = Utc::now();
        let session = CheckoutSession {
            session_id: "cs_track".to_string(),
            checkout_url: "https://checkout.example/cs_track".to_string(),
            amount: 2000,
        };

        let mut tx = store.lock_slot(7).await.unwrap().unwrap();
        let booking = ledger::create_booking(
            tx.as_mut(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            now,
            now + Duration::minutes(15),
            now,
        )
        .await
        .unwrap();
        let mut payment = create_pending(tx.as_mut(), booking.id, FeeType::Reservation, 2000, &session, now)
            .await
            .unwrap();

        let found = find_pending(tx.as_mut(), booking.id, FeeType::Reservation).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(payment.id));
        assert!(find_pending(tx.as_mut(), booking.id, FeeType::Extension).await.unwrap().is_none());

        mark_paid(tx.as_mut(), &mut payment).await.unwrap();
        assert!(find_pending(tx.as_mut(), booking.id, FeeType::Reservation).await.unwrap().is_none());
        tx.commit().await.unwrap();

        let stored = store.find_payment_by_session("cs_track").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.checkout_url.as_deref(), Some("https://checkout.example/cs_track"));
    }
}

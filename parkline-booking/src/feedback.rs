//! Driver feedback on a paid reservation.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use parkline_core::repository::Constraint;
use parkline_core::{CoreError, CoreResult, ParkingStore, StoreError};
use parkline_shared::{Feedback, Payment, PaymentStatus, Rating};

use crate::tracker;

pub const MAX_COMMENT_CHARS: usize = 1000;

/// The paid reservation payment of the user's current booking, if any.
async fn paid_reservation(store: &dyn ParkingStore, user_id: Uuid) -> CoreResult<Option<Payment>> {
    let Some(booking) = store.valid_booking_for_user(user_id).await? else {
        return Ok(None);
    };
    let payments = store.payments_for_booking(booking.id).await?;
    Ok(tracker::reservation_of(&payments)
        .filter(|p| p.status == PaymentStatus::Paid)
        .cloned())
}

/// Feedback already left on the user's current reservation.
pub async fn current_feedback(store: &dyn ParkingStore, user_id: Uuid) -> CoreResult<Option<Feedback>> {
    match paid_reservation(store, user_id).await? {
        Some(payment) => Ok(store.feedback_for_payment(payment.id).await?),
        None => Ok(None),
    }
}

/// Rate the user's current, paid reservation. Accepted once per reservation.
pub async fn submit_feedback(
    store: &dyn ParkingStore,
    user_id: Uuid,
    rating: Rating,
    comments: &str,
    now: DateTime<Utc>,
) -> CoreResult<Feedback> {
    let comments = comments.trim();
    if comments.chars().count() > MAX_COMMENT_CHARS {
        return Err(CoreError::Validation(format!("comments exceed {} characters", MAX_COMMENT_CHARS)));
    }

    let payment = paid_reservation(store, user_id)
        .await?
        .ok_or_else(|| CoreError::FeedbackNotAllowed("no paid reservation to rate".to_string()))?;
    let already = || CoreError::FeedbackNotAllowed("feedback already submitted".to_string());

    if store.feedback_for_payment(payment.id).await?.is_some() {
        return Err(already());
    }

    let feedback = Feedback::new(payment.id, rating, comments.to_string(), now);
    store.insert_feedback(&feedback).await.map_err(|e| match e {
        StoreError::Conflict(Constraint::FeedbackPerPayment) => already(),
        other => other.into(),
    })?;

    tracing::info!(%user_id, payment_id = %payment.id, rating = %rating, "Feedback submitted");
    Ok(feedback)
}

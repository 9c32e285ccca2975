//! Booking ledger operations. Every write goes through a held slot lock.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use parkline_core::{CoreError, CoreResult, SlotTransaction, StoreError};
use parkline_core::repository::Constraint;
use parkline_shared::Booking;

/// Create a valid booking on the locked slot.
///
/// Fails with `SlotAlreadyValidBooking` if the slot already has one; the check
/// runs inside the same transaction that holds the slot lock.
pub async fn create_booking(
    tx: &mut dyn SlotTransaction,
    user_id: Uuid,
    vehicle_id: Uuid,
    start_time: DateTime<Utc>,
    expiration_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CoreResult<Booking> {
    let number = tx.slot().number;
    if find_valid(tx).await?.is_some() {
        return Err(CoreError::SlotAlreadyValidBooking(number));
    }

    let booking = Booking::new(number, user_id, vehicle_id, start_time, expiration_time, now);
    tx.insert_booking(&booking).await.map_err(|e| match e {
        StoreError::Conflict(Constraint::ValidBookingPerSlot) => CoreError::SlotAlreadyValidBooking(number),
        StoreError::Conflict(Constraint::ValidBookingPerUser) => CoreError::AlreadyBooked,
        other => other.into(),
    })?;
    Ok(booking)
}

pub async fn find_valid(tx: &mut dyn SlotTransaction) -> CoreResult<Option<Booking>> {
    Ok(tx.find_valid_booking().await?)
}

/// Close a booking as of `end_time`.
pub async fn invalidate(tx: &mut dyn SlotTransaction, booking: &mut Booking, end_time: DateTime<Utc>) -> CoreResult<()> {
    booking.invalidate(end_time);
    tx.update_booking(booking).await?;
    tracing::info!(booking_id = %booking.id, slot = booking.slot_number, "Booking invalidated");
    Ok(())
}

/// Add paid extension minutes; the `extended` flag never resets.
pub async fn extend(tx: &mut dyn SlotTransaction, booking: &mut Booking, minutes: i64) -> CoreResult<()> {
    booking.apply_extension(minutes);
    tx.update_booking(booking).await?;
    Ok(())
}

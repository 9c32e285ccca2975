use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use parkline_core::{CoreResult, ParkingStore, UserDirectory};
use parkline_shared::PaymentStatus;

use crate::tracker;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifiedBooking {
    pub booking_id: Uuid,
    pub user_name: String,
    pub slot_number: i32,
    pub start_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub license_plate: String,
    pub make: String,
    pub model: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Valid(VerifiedBooking),
    Invalid,
}

/// Staff check of a booking presented at the gate. Read-only.
///
/// A booking verifies only while it is valid and its reservation fee is paid.
pub async fn verify_booking(
    store: &dyn ParkingStore,
    users: &dyn UserDirectory,
    booking_id: Uuid,
) -> CoreResult<Verification> {
    let Some(booking) = store.get_booking(booking_id).await?.filter(|b| b.is_valid) else {
        return Ok(Verification::Invalid);
    };

    let payments = store.payments_for_booking(booking.id).await?;
    if !tracker::reservation_of(&payments).is_some_and(|p| p.status == PaymentStatus::Paid) {
        return Ok(Verification::Invalid);
    }

    let (Some(user), Some(vehicle)) = (
        users.get_user(booking.user_id).await?,
        users.get_vehicle(booking.vehicle_id).await?,
    ) else {
        tracing::warn!(booking_id = %booking.id, "Valid booking references a missing user or vehicle");
        return Ok(Verification::Invalid);
    };

    Ok(Verification::Valid(VerifiedBooking {
        booking_id: booking.id,
        user_name: user.full_name(),
        slot_number: booking.slot_number,
        start_time: booking.start_time,
        expiration_time: booking.expiration_time,
        license_plate: vehicle.license_plate,
        make: vehicle.make,
        model: vehicle.model,
        color: vehicle.color,
    }))
}

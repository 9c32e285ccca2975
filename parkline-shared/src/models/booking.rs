use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};

/// A user's claim on a slot for a time window.
///
/// Bookings are never deleted; an invalidated booking with an `end_time`
/// is the audit record of a finished or abandoned session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub slot_number: i32,
    pub user_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub extended: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        slot_number: i32,
        user_id: Uuid,
        vehicle_id: Uuid,
        start_time: DateTime<Utc>,
        expiration_time: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_number,
            user_id,
            vehicle_id,
            start_time,
            expiration_time,
            end_time: None,
            is_valid: true,
            extended: false,
            created_at,
        }
    }

    /// Close the booking. Validity is one-way.
    pub fn invalidate(&mut self, at: DateTime<Utc>) {
        self.is_valid = false;
        self.end_time = Some(at);
    }

    /// Push the expiration out and burn the one extension this booking gets.
    pub fn apply_extension(&mut self, minutes: i64) {
        self.expiration_time += Duration::minutes(minutes);
        self.extended = true;
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }
}

//! The slot reconciliation decision table.
//!
//! `decide` is pure: it reads a snapshot of one slot and returns the writes to
//! apply. The engine owns locking and persistence.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use parkline_shared::{Booking, Payment, PaymentStatus, SlotStatus};

/// Everything the table looks at for one slot.
#[derive(Debug, Clone)]
pub struct ReconcileInput {
    pub slot_status: SlotStatus,
    pub booking: Option<Booking>,
    pub reservation: Option<Payment>,
    pub pending_extension: Option<Payment>,
}

/// Which row of the table decided the slot.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    NoBooking,
    ReservationTimedOut,
    Expired,
    OccupiedWithinWindow,
    EarlyDeparture,
    HeldWithinWindow,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailPayment {
    pub payment_id: Uuid,
    pub checkout_session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub rule: Rule,
    pub slot_status: SlotStatus,
    /// Booking to invalidate with `end_time = now`.
    pub invalidate_booking: Option<Uuid>,
    /// Pending payments to fail; their checkout sessions get expired after commit.
    pub fail_payments: Vec<FailPayment>,
}

impl Decision {
    fn new(rule: Rule, slot_status: SlotStatus) -> Self {
        Self { rule, slot_status, invalidate_booking: None, fail_payments: Vec::new() }
    }

    /// True if applying the decision would write nothing.
    pub fn is_noop(&self, current: SlotStatus) -> bool {
        self.slot_status == current && self.invalidate_booking.is_none() && self.fail_payments.is_empty()
    }
}

fn fail(payment: &Payment) -> FailPayment {
    FailPayment {
        payment_id: payment.id,
        checkout_session_id: payment.checkout_session_id.clone(),
    }
}

/// Decide one slot's next state from its snapshot, the sensor and the clock.
///
/// A timed-out pending extension is failed on its own and never decides the
/// slot; the remaining rows are evaluated in order, first match wins.
pub fn decide(input: &ReconcileInput, sensor_occupied: bool, now: DateTime<Utc>, timeout_seconds: i64) -> Decision {
    let fallback = SlotStatus::from_sensor(sensor_occupied);

    let Some(booking) = input.booking.as_ref().filter(|b| b.is_valid) else {
        return Decision::new(Rule::NoBooking, fallback);
    };

    let mut fail_payments = Vec::new();
    if let Some(extension) = input.pending_extension.as_ref() {
        if extension.is_timed_out(now, timeout_seconds) {
            fail_payments.push(fail(extension));
        }
    }

    let mut decision = match input.reservation.as_ref() {
        Some(reservation) if reservation.is_timed_out(now, timeout_seconds) => {
            fail_payments.push(fail(reservation));
            // Released to whatever the sensor sees, so the next tick has nothing left to do
            Decision {
                invalidate_booking: Some(booking.id),
                ..Decision::new(Rule::ReservationTimedOut, fallback)
            }
        }
        Some(reservation) if reservation.status == PaymentStatus::Paid => {
            let within_window = booking.expiration_time >= now;
            match (within_window, sensor_occupied) {
                (false, false) => Decision {
                    invalidate_booking: Some(booking.id),
                    ..Decision::new(Rule::Expired, SlotStatus::Vacant)
                },
                (true, true) => Decision::new(Rule::OccupiedWithinWindow, SlotStatus::Occupied),
                (true, false) if input.slot_status == SlotStatus::Occupied => Decision {
                    invalidate_booking: Some(booking.id),
                    ..Decision::new(Rule::EarlyDeparture, SlotStatus::Vacant)
                },
                (true, false) => Decision::new(Rule::HeldWithinWindow, SlotStatus::Reserved),
                (false, true) => Decision::new(Rule::Fallback, fallback),
            }
        }
        _ => Decision::new(Rule::Fallback, fallback),
    };

    decision.fail_payments = fail_payments;
    decision
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;
use parkline_core::notify::Notifier;
use parkline_core::payment::PaymentGateway;
use parkline_core::pricing::extension_minutes;
use parkline_core::{CoreError, CoreResult, ParkingStore, UserDirectory};
use parkline_shared::{
    Booking, FeeType, NotificationKind, Payment, PaymentStatus, SlotStatus, SlotStatusChanged,
};

use crate::{expire_session_quietly, ledger, publish, tracker};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationOutcome {
    ReservationActivated { booking_id: Uuid },
    BookingExtended { booking_id: Uuid, expiration_time: DateTime<Utc> },
    PaymentFailed { booking_id: Uuid, booking_invalidated: bool },
    /// The webhook was a repeat of one already applied.
    AlreadyProcessed,
    /// The payment can no longer change anything (e.g. it timed out first).
    Ignored { reason: String },
}

/// Applies asynchronous payment-gateway results to bookings.
pub struct PaymentOrchestrator {
    store: Arc<dyn ParkingStore>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    events: Option<broadcast::Sender<SlotStatusChanged>>,
}

struct Applied {
    outcome: ConfirmationOutcome,
    booking: Booking,
    status_change: Option<(SlotStatus, SlotStatus)>,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn ParkingStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, users, gateway, notifier, events: None }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SlotStatusChanged>) -> Self {
        self.events = Some(events);
        self
    }

    async fn lookup(&self, session_id: &str) -> CoreResult<(Payment, Booking)> {
        let payment = self
            .store
            .find_payment_by_session(session_id)
            .await?
            .ok_or_else(|| CoreError::PaymentNotFound(session_id.to_string()))?;
        let booking = self
            .store
            .get_booking(payment.booking_id)
            .await?
            .ok_or(CoreError::BookingNotFound(payment.booking_id))?;
        Ok((payment, booking))
    }

    /// Gateway reported the session paid.
    pub async fn on_payment_confirmed(&self, session_id: &str, now: DateTime<Utc>) -> CoreResult<ConfirmationOutcome> {
        let (payment, booking) = self.lookup(session_id).await?;

        let applied = self.apply_confirmation(payment.id, &booking).await?;
        let Some(applied) = applied else {
            return Ok(ConfirmationOutcome::AlreadyProcessed);
        };

        if let ConfirmationOutcome::Ignored { reason } = &applied.outcome {
            tracing::warn!(session_id, reason = %reason, "Late payment confirmation ignored");
            return Ok(applied.outcome);
        }

        tracing::info!(session_id, booking_id = %booking.id, outcome = ?applied.outcome, "Payment confirmed");
        expire_session_quietly(&self.gateway, session_id).await;
        self.publish_change(&applied, now);

        let kind = match payment.fee_type {
            FeeType::Reservation => NotificationKind::ReservationCreated,
            FeeType::Extension => NotificationKind::ReservationExtended,
        };
        self.notify_quietly(&applied.booking, kind).await;

        Ok(applied.outcome)
    }

    /// Returns `None` when the payment was already paid.
    async fn apply_confirmation(&self, payment_id: Uuid, booking: &Booking) -> CoreResult<Option<Applied>> {
        let mut tx = self
            .store
            .lock_slot(booking.slot_number)
            .await?
            .ok_or(CoreError::SlotNotFound(booking.slot_number))?;

        let mut payment = tx
            .payments_for(booking.id)
            .await?
            .into_iter()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| CoreError::PaymentNotFound(payment_id.to_string()))?;

        let ignored = |reason: &str| Applied {
            outcome: ConfirmationOutcome::Ignored { reason: reason.to_string() },
            booking: booking.clone(),
            status_change: None,
        };

        match payment.status {
            PaymentStatus::Paid => return Ok(None),
            PaymentStatus::Failed => return Ok(Some(ignored("payment already failed"))),
            PaymentStatus::Pending => {}
        }

        let Some(mut current) = ledger::find_valid(tx.as_mut()).await?.filter(|b| b.id == booking.id) else {
            return Ok(Some(ignored("booking is no longer valid")));
        };

        tracker::mark_paid(tx.as_mut(), &mut payment).await?;

        let previous = tx.slot().status;
        let outcome = match payment.fee_type {
            FeeType::Reservation => {
                // An occupied slot stays occupied; the next sweep settles it.
                if previous == SlotStatus::Vacant {
                    tx.set_status(SlotStatus::Reserved).await?;
                }
                ConfirmationOutcome::ReservationActivated { booking_id: current.id }
            }
            FeeType::Extension => {
                ledger::extend(tx.as_mut(), &mut current, extension_minutes(payment.amount)).await?;
                ConfirmationOutcome::BookingExtended {
                    booking_id: current.id,
                    expiration_time: current.expiration_time,
                }
            }
        };
        let status_now = tx.slot().status;

        tx.commit().await?;

        Ok(Some(Applied {
            outcome,
            booking: current,
            status_change: (previous != status_now).then_some((previous, status_now)),
        }))
    }

    /// Gateway reported the session failed or expired.
    pub async fn on_payment_failed(&self, session_id: &str, now: DateTime<Utc>) -> CoreResult<ConfirmationOutcome> {
        let (payment, booking) = self.lookup(session_id).await?;

        let mut tx = self
            .store
            .lock_slot(booking.slot_number)
            .await?
            .ok_or(CoreError::SlotNotFound(booking.slot_number))?;

        let mut payment = tx
            .payments_for(booking.id)
            .await?
            .into_iter()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| CoreError::PaymentNotFound(session_id.to_string()))?;

        if payment.status != PaymentStatus::Pending {
            return Ok(ConfirmationOutcome::AlreadyProcessed);
        }

        tracker::mark_failed(tx.as_mut(), &mut payment).await?;

        let previous = tx.slot().status;
        let mut invalidated = false;
        if payment.fee_type == FeeType::Reservation {
            if let Some(mut current) = ledger::find_valid(tx.as_mut()).await?.filter(|b| b.id == booking.id) {
                ledger::invalidate(tx.as_mut(), &mut current, now).await?;
                invalidated = true;
                if previous == SlotStatus::Reserved {
                    tx.set_status(SlotStatus::Vacant).await?;
                }
            }
        }
        let status_now = tx.slot().status;
        tx.commit().await?;

        tracing::info!(session_id, booking_id = %booking.id, invalidated, "Payment failed");
        expire_session_quietly(&self.gateway, session_id).await;

        let applied = Applied {
            outcome: ConfirmationOutcome::PaymentFailed { booking_id: booking.id, booking_invalidated: invalidated },
            booking,
            status_change: (previous != status_now).then_some((previous, status_now)),
        };
        self.publish_change(&applied, now);
        Ok(applied.outcome)
    }

    fn publish_change(&self, applied: &Applied, now: DateTime<Utc>) {
        if let Some((previous, current)) = applied.status_change {
            publish(
                &self.events,
                SlotStatusChanged {
                    slot_number: applied.booking.slot_number,
                    previous,
                    current,
                    changed_at: now,
                },
            );
        }
    }

    async fn notify_quietly(&self, booking: &Booking, kind: NotificationKind) {
        let user = match self.users.get_user(booking.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %booking.user_id, "Notification skipped: user not found");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notification skipped: user lookup failed");
                return;
            }
        };

        let payload = json!({
            "booking_id": booking.id,
            "slot_number": booking.slot_number,
            "start_time": booking.start_time.to_rfc3339(),
            "expiration_time": booking.expiration_time.to_rfc3339(),
        });

        if let Err(e) = self.notifier.notify(&user, kind, payload).await {
            tracing::warn!(user_id = %user.id, kind = %kind, error = %e, "Notification dispatch failed");
        }
    }
}

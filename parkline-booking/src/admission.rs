//! Client-facing reservation and extension requests.
//!
//! A claim is all-or-nothing. The checkout session is a network call, so it is
//! opened before the slot lock is taken; if the locked re-check or any write
//! fails afterwards the transaction rolls back and the session is expired.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;
use parkline_core::payment::{CheckoutSession, PaymentGateway};
use parkline_core::pricing::{extension_minutes, reservation_fee};
use parkline_core::repository::Constraint;
use parkline_core::{CoreError, CoreResult, ParkingStore, StoreError, UserDirectory};
use parkline_shared::{Booking, FeeType, Payment, PaymentStatus, SlotStatus, SlotStatusChanged};

use crate::{expire_session_quietly, ledger, publish, tracker, BanPolicy, ReservationPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub slot_number: i32,
    pub user_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_time: DateTime<Utc>,
}

/// What the caller needs to send the user to the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentHandle {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub checkout_session_id: String,
    pub checkout_url: String,
    pub amount: i64,
}

impl PaymentHandle {
    fn new(payment: &Payment, session: &CheckoutSession) -> Self {
        Self {
            payment_id: payment.id,
            booking_id: payment.booking_id,
            checkout_session_id: session.session_id.clone(),
            checkout_url: session.checkout_url.clone(),
            amount: payment.amount,
        }
    }
}

pub struct AdmissionController {
    store: Arc<dyn ParkingStore>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    bans: BanPolicy,
    policy: ReservationPolicy,
    events: Option<broadcast::Sender<SlotStatusChanged>>,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn ParkingStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            bans: BanPolicy::new(store.clone(), users.clone(), policy.clone()),
            store,
            users,
            gateway,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SlotStatusChanged>) -> Self {
        self.events = Some(events);
        self
    }

    /// Claim a vacant slot for `req.user_id` and open its reservation payment.
    pub async fn reserve(&self, req: ReserveRequest, now: DateTime<Utc>) -> CoreResult<PaymentHandle> {
        let user = self
            .users
            .get_user(req.user_id)
            .await?
            .ok_or(CoreError::UserNotFound(req.user_id))?;

        self.bans.check(&user, now).await?;

        if self.store.valid_booking_for_user(user.id).await?.is_some() {
            return Err(CoreError::AlreadyBooked);
        }

        self.users
            .get_vehicle(req.vehicle_id)
            .await?
            .filter(|v| v.owner_id == user.id)
            .ok_or(CoreError::VehicleNotFound(req.vehicle_id))?;

        let slot = self
            .store
            .get_slot(req.slot_number)
            .await?
            .ok_or(CoreError::SlotNotFound(req.slot_number))?;

        // Cheap pre-check so a lost race rarely costs a checkout session.
        if !slot.is_vacant() {
            return Err(CoreError::SlotNotAvailable(slot.number));
        }

        let amount = reservation_fee(req.start_time - now);
        let expiration_time = req.start_time + self.policy.reservation_window();

        let session = self
            .gateway
            .create_checkout_session(amount, &format!("{} Fee", FeeType::Reservation))
            .await?;

        match self.claim(&req, expiration_time, amount, &session, now).await {
            Ok((booking, payment)) => {
                tracing::info!(
                    booking_id = %booking.id,
                    slot = booking.slot_number,
                    amount,
                    "Reservation admitted, awaiting payment"
                );
                publish(
                    &self.events,
                    SlotStatusChanged {
                        slot_number: booking.slot_number,
                        previous: SlotStatus::Vacant,
                        current: SlotStatus::Reserved,
                        changed_at: now,
                    },
                );
                Ok(PaymentHandle::new(&payment, &session))
            }
            Err(e) => {
                expire_session_quietly(&self.gateway, &session.session_id).await;
                Err(e)
            }
        }
    }

    async fn claim(
        &self,
        req: &ReserveRequest,
        expiration_time: DateTime<Utc>,
        amount: i64,
        session: &CheckoutSession,
        now: DateTime<Utc>,
    ) -> CoreResult<(Booking, Payment)> {
        let mut tx = self
            .store
            .lock_slot(req.slot_number)
            .await?
            .ok_or(CoreError::SlotNotFound(req.slot_number))?;

        // Re-check under the lock: the read above may be stale.
        if !tx.slot().is_vacant() {
            return Err(CoreError::SlotNotAvailable(req.slot_number));
        }
        if tx.user_has_valid_booking(req.user_id).await? {
            return Err(CoreError::AlreadyBooked);
        }

        let booking = ledger::create_booking(
            tx.as_mut(),
            req.user_id,
            req.vehicle_id,
            req.start_time,
            expiration_time,
            now,
        )
        .await
        .map_err(|e| match e {
            CoreError::SlotAlreadyValidBooking(n) => CoreError::SlotNotAvailable(n),
            other => other,
        })?;

        tx.set_status(SlotStatus::Reserved).await?;
        let payment =
            tracker::create_pending(tx.as_mut(), booking.id, FeeType::Reservation, amount, session, now).await?;

        tx.commit().await.map_err(|e| claim_conflict(e, req.slot_number))?;
        Ok((booking, payment))
    }

    /// Open a paid extension on an active booking. One per booking, ever.
    pub async fn extend(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentHandle> {
        if extension_minutes(amount) == 0 {
            return Err(CoreError::Validation(format!("{} is not a payable extension amount", amount)));
        }

        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(CoreError::BookingNotFound(booking_id))?;
        if booking.user_id != user_id {
            return Err(CoreError::Forbidden("booking belongs to another user".to_string()));
        }
        let payments = self.store.payments_for_booking(booking_id).await?;
        check_extension_allowed(&booking, &payments, now)?;

        let session = self
            .gateway
            .create_checkout_session(amount, &format!("{} Fee", FeeType::Extension))
            .await?;

        match self.claim_extension(&booking, amount, &session, now).await {
            Ok(payment) => {
                tracing::info!(booking_id = %booking.id, amount, "Extension opened, awaiting payment");
                Ok(PaymentHandle::new(&payment, &session))
            }
            Err(e) => {
                expire_session_quietly(&self.gateway, &session.session_id).await;
                Err(e)
            }
        }
    }

    async fn claim_extension(
        &self,
        booking: &Booking,
        amount: i64,
        session: &CheckoutSession,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        let mut tx = self
            .store
            .lock_slot(booking.slot_number)
            .await?
            .ok_or(CoreError::SlotNotFound(booking.slot_number))?;

        let current = ledger::find_valid(tx.as_mut())
            .await?
            .filter(|b| b.id == booking.id)
            .ok_or_else(|| CoreError::ExtensionNotAllowed("booking is no longer valid".to_string()))?;
        let payments = tx.payments_for(current.id).await?;
        check_extension_allowed(&current, &payments, now)?;

        let payment =
            tracker::create_pending(tx.as_mut(), current.id, FeeType::Extension, amount, session, now).await?;
        tx.commit().await.map_err(|e| claim_conflict(e, booking.slot_number))?;
        Ok(payment)
    }
}

/// An extension needs a valid, paid, started and not yet extended booking with
/// no other extension in flight.
pub fn check_extension_allowed(booking: &Booking, payments: &[Payment], now: DateTime<Utc>) -> CoreResult<()> {
    let deny = |reason: &str| Err(CoreError::ExtensionNotAllowed(reason.to_string()));

    if !booking.is_valid {
        return deny("booking is no longer valid");
    }
    match tracker::reservation_of(payments) {
        Some(p) if p.status == PaymentStatus::Paid => {}
        _ => return deny("reservation is not paid"),
    }
    if !booking.has_started(now) {
        return deny("reservation has not started yet");
    }
    if booking.extended {
        return deny("booking was already extended");
    }
    if tracker::pending_extension_of(payments).is_some() {
        return deny("an extension payment is already pending");
    }
    Ok(())
}

fn claim_conflict(err: StoreError, slot_number: i32) -> CoreError {
    match err {
        StoreError::Conflict(Constraint::ValidBookingPerSlot) => CoreError::SlotNotAvailable(slot_number),
        StoreError::Conflict(Constraint::ValidBookingPerUser) => CoreError::AlreadyBooked,
        other => other.into(),
    }
}

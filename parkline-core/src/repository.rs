use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use parkline_shared::{Booking, Feedback, Notification, Payment, PaymentStatus, Slot, SlotStatus, User, Vehicle};

/// Uniqueness rules the storage layer enforces on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// At most one `is_valid` booking per slot.
    ValidBookingPerSlot,
    /// At most one `is_valid` booking per user.
    ValidBookingPerUser,
    /// Checkout session ids are unique across payments.
    CheckoutSession,
    /// One feedback entry per reservation payment.
    FeedbackPerPayment,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Constraint violated: {0:?}")]
    Conflict(Constraint),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Stored data is inconsistent: {0}")]
    Inconsistent(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Exclusive, slot-scoped unit of work.
///
/// Holding one means holding the slot's lock: admission and reconciliation
/// on the same slot serialize on it, other slots are untouched. Writes become
/// visible on [`SlotTransaction::commit`]; dropping the transaction discards them.
#[async_trait]
pub trait SlotTransaction: Send {
    /// The locked slot as of the last write in this transaction.
    fn slot(&self) -> &Slot;

    async fn set_status(&mut self, status: SlotStatus) -> StoreResult<()>;

    /// The slot's valid booking. More than one is reported as `Inconsistent`.
    async fn find_valid_booking(&mut self) -> StoreResult<Option<Booking>>;

    async fn user_has_valid_booking(&mut self, user_id: Uuid) -> StoreResult<bool>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Oldest first.
    async fn payments_for(&mut self, booking_id: Uuid) -> StoreResult<Vec<Payment>>;

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    async fn update_payment_status(&mut self, payment_id: Uuid, status: PaymentStatus) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Repository trait for slot, booking and payment data
#[async_trait]
pub trait ParkingStore: Send + Sync {
    async fn get_slot(&self, number: i32) -> StoreResult<Option<Slot>>;

    /// All slots ordered by number.
    async fn list_slots(&self) -> StoreResult<Vec<Slot>>;

    /// Create the given slots as `Vacant`. Existing numbers are left alone;
    /// returns only the slots that were created.
    async fn provision_slots(&self, numbers: &[i32]) -> StoreResult<Vec<Slot>>;

    /// Take the slot's exclusive lock, or `None` if no such slot exists.
    async fn lock_slot(&self, number: i32) -> StoreResult<Option<Box<dyn SlotTransaction>>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn valid_booking_for_user(&self, user_id: Uuid) -> StoreResult<Option<Booking>>;

    /// Every booking the user ever made, newest first.
    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Every payment against the booking, oldest first.
    async fn payments_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<Payment>>;

    async fn find_payment_by_session(&self, checkout_session_id: &str) -> StoreResult<Option<Payment>>;

    /// Failed reservation payments created at or after `since` on the user's invalidated bookings.
    async fn count_failed_reservations_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64>;

    /// Paid payments created in `[from, to)`, oldest first.
    async fn paid_payments_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Payment>>;

    async fn feedback_for_payment(&self, payment_id: Uuid) -> StoreResult<Option<Feedback>>;

    /// Fails with [`Constraint::FeedbackPerPayment`] if the payment already has feedback.
    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()>;
}

/// Read access to accounts plus the one account field the core writes (ban state).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn set_ban(&self, user_id: Uuid, ban_end_time: Option<DateTime<Utc>>) -> StoreResult<()>;

    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>>;
}

#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn record(&self, notification: &Notification) -> StoreResult<()>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
}

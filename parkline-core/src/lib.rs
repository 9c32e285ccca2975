pub mod repository;
pub mod payment;
pub mod sensor;
pub mod notify;
pub mod pricing;
pub mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use repository::{NotificationLog, ParkingStore, SlotTransaction, StoreError, StoreResult, UserDirectory};

/// Failures of the reservation core.
///
/// The first group is user-visible and maps to a 4xx; everything else is
/// operator-visible only.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Slot {0} is not available")]
    SlotNotAvailable(i32),
    #[error("User already holds a valid booking")]
    AlreadyBooked,
    #[error("User is banned until {until}")]
    UserBanned { until: DateTime<Utc> },
    #[error("Extension not allowed: {0}")]
    ExtensionNotAllowed(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Feedback not accepted: {0}")]
    FeedbackNotAllowed(String),

    #[error("Slot {0} not found")]
    SlotNotFound(i32),
    #[error("Booking {0} not found")]
    BookingNotFound(Uuid),
    #[error("User {0} not found")]
    UserNotFound(Uuid),
    #[error("Vehicle {0} not found")]
    VehicleNotFound(Uuid),
    #[error("Payment for checkout session {0} not found")]
    PaymentNotFound(String),

    #[error("Slot {0} already has a valid booking")]
    SlotAlreadyValidBooking(i32),
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),
    #[error("Sensor feed unavailable: {0}")]
    SensorFeedUnavailable(String),
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Inconsistent(msg) => CoreError::InconsistentState(msg),
            other => CoreError::Store(other),
        }
    }
}

impl From<payment::GatewayError> for CoreError {
    fn from(err: payment::GatewayError) -> Self {
        CoreError::PaymentGateway(err.to_string())
    }
}

impl From<sensor::FeedError> for CoreError {
    fn from(err: sensor::FeedError) -> Self {
        CoreError::SensorFeedUnavailable(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

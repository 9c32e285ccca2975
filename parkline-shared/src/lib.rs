pub mod models;
pub mod pii;

pub use models::{
    Booking, FeeType, Feedback, Notification, NotificationKind, Payment, PaymentStatus, Slot, SlotStatus,
    Rating, SlotStatusChanged, User, Vehicle,
};

pub mod slot;
pub mod booking;
pub mod payment;
pub mod user;
pub mod notification;
pub mod events;
pub mod feedback;

pub use slot::{Slot, SlotStatus};
pub use booking::Booking;
pub use payment::{FeeType, Payment, PaymentStatus};
pub use user::{User, Vehicle};
pub use notification::{Notification, NotificationKind};
pub use events::SlotStatusChanged;
pub use feedback::{Feedback, Rating};

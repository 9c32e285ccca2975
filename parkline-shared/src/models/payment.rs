use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FeeType {
    Reservation,
    Extension,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::Reservation => "Reservation",
            FeeType::Extension => "Extension",
        }
    }
}

impl fmt::Display for FeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reservation" => Ok(FeeType::Reservation),
            "Extension" => Ok(FeeType::Extension),
            other => Err(format!("unknown fee type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Paid" => Ok(PaymentStatus::Paid),
            "Failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A payment attempt tied to a booking, mirrored by a gateway checkout session.
///
/// `amount` is in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub fee_type: FeeType,
    pub amount: i64,
    pub status: PaymentStatus,
    pub checkout_session_id: String,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        booking_id: Uuid,
        fee_type: FeeType,
        amount: i64,
        checkout_session_id: String,
        checkout_url: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            fee_type,
            amount,
            status: PaymentStatus::Pending,
            checkout_session_id,
            checkout_url,
            created_at,
        }
    }

    /// Milliseconds elapsed since the payment was opened.
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    /// A pending payment older than `timeout_seconds` may be failed by the sweep.
    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout_seconds: i64) -> bool {
        self.status == PaymentStatus::Pending && self.age_millis(now) > timeout_seconds * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_timeout_counts_from_creation() {
        let created = Utc::now();
        let payment = Payment::pending(Uuid::new_v4(), FeeType::Reservation, 2000, "cs_1".into(), None, created);

        assert!(!payment.is_timed_out(created + Duration::seconds(300), 300));
        assert!(payment.is_timed_out(created + Duration::seconds(301), 300));
    }

    #[test]
    fn test_timeout_boundary_counts_sub_second_age() {
        let created = Utc::now();
        let payment = Payment::pending(Uuid::new_v4(), FeeType::Reservation, 2000, "cs_3".into(), None, created);

        assert!(payment.is_timed_out(created + Duration::seconds(300) + Duration::milliseconds(1), 300));
        assert!(payment.is_timed_out(created + Duration::milliseconds(300_500), 300));
    }

    #[test]
    fn test_resolved_payment_never_times_out() {
        let created = Utc::now();
        let mut payment = Payment::pending(Uuid::new_v4(), FeeType::Extension, 30, "cs_2".into(), None, created);
        payment.status = PaymentStatus::Paid;

        assert!(!payment.is_timed_out(created + Duration::hours(1), 300));
    }
}

use chrono::Duration;

/// Tunables of the reservation lifecycle.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// A pending payment older than this may be failed by the sweep.
    pub payment_timeout_seconds: i64,
    /// Length of a reservation from its start time.
    pub reservation_window_minutes: i64,
    /// Failed reservation payments in one day that trigger a ban.
    pub ban_failed_payments_threshold: i64,
    pub ban_duration_hours: i64,
}

impl ReservationPolicy {
    pub fn reservation_window(&self) -> Duration {
        Duration::minutes(self.reservation_window_minutes)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::hours(self.ban_duration_hours)
    }
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            payment_timeout_seconds: 300,
            reservation_window_minutes: 15,
            ban_failed_payments_threshold: 3,
            ban_duration_hours: 24,
        }
    }
}

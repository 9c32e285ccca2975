use chrono::Duration;

/// Reservation fee steps: (max lead time in hours, fee in minor units).
/// Booking closer to the start time costs less.
const FEE_STEPS: [(i64, i64); 6] = [(1, 2000), (2, 3000), (3, 4000), (4, 5000), (5, 6000), (6, 7000)];

/// Fee for any lead time beyond the last step.
const FEE_CEILING: i64 = 8000;

/// Payable extension amounts and the minutes each one buys.
pub const EXTENSION_OPTIONS: [(i64, i64); 3] = [(20, 15), (30, 30), (40, 45)];

/// Reservation fee for a booking starting `lead_time` from now.
///
/// Total over all durations: a start time in the past prices as zero lead time.
pub fn reservation_fee(lead_time: Duration) -> i64 {
    let millis = lead_time.num_milliseconds().max(0);
    FEE_STEPS
        .iter()
        .find(|(hours, _)| millis <= hours * 3_600_000)
        .map(|(_, fee)| *fee)
        .unwrap_or(FEE_CEILING)
}

/// Minutes an extension payment of `amount` buys; zero for anything off the table.
pub fn extension_minutes(amount: i64) -> i64 {
    EXTENSION_OPTIONS
        .iter()
        .find(|(payable, _)| *payable == amount)
        .map(|(_, minutes)| *minutes)
        .unwrap_or(0)
}

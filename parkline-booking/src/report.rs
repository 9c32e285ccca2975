//! Paid revenue over a calendar period, for the admin console.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use parkline_core::{CoreError, CoreResult, ParkingStore};
use parkline_shared::{FeeType, Payment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    /// `YYYY-MM-DD`, one day.
    Daily,
    /// `YYYY-MM-DD`, seven days starting that day.
    Weekly,
    /// `YYYY-MM`, the calendar month.
    Monthly,
    /// `YYYY`, the calendar year.
    Yearly,
}

fn invalid(anchor: &str, expected: &str) -> CoreError {
    CoreError::Validation(format!("date '{}' must be {}", anchor, expected))
}

fn midnight(date: NaiveDate) -> CoreResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| CoreError::Validation(format!("date {} out of range", date)))
}

impl ReportPeriod {
    /// The UTC range `[from, to)` the period covers, anchored at `anchor`.
    pub fn range(self, anchor: &str) -> CoreResult<(DateTime<Utc>, DateTime<Utc>)> {
        let anchor = anchor.trim();
        let (start, end) = match self {
            ReportPeriod::Daily | ReportPeriod::Weekly => {
                let day = NaiveDate::parse_from_str(anchor, "%Y-%m-%d").map_err(|_| invalid(anchor, "YYYY-MM-DD"))?;
                let days = if self == ReportPeriod::Daily { 1 } else { 7 };
                (day, day + Duration::days(days))
            }
            ReportPeriod::Monthly => {
                let first = NaiveDate::parse_from_str(&format!("{}-01", anchor), "%Y-%m-%d")
                    .map_err(|_| invalid(anchor, "YYYY-MM"))?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                };
                (first, next.ok_or_else(|| invalid(anchor, "YYYY-MM"))?)
            }
            ReportPeriod::Yearly => {
                let year: i32 = anchor.parse().map_err(|_| invalid(anchor, "YYYY"))?;
                let bounds = NaiveDate::from_ymd_opt(year, 1, 1).zip(NaiveDate::from_ymd_opt(year + 1, 1, 1));
                bounds.ok_or_else(|| invalid(anchor, "YYYY"))?
            }
        };
        Ok((midnight(start)?, midnight(end)?))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RevenueLine {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub fee_type: FeeType,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RevenueReport {
    pub period: ReportPeriod,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub lines: Vec<RevenueLine>,
    pub reservation_total: i64,
    pub extension_total: i64,
    pub total: i64,
}

fn summarize(period: ReportPeriod, from: DateTime<Utc>, to: DateTime<Utc>, paid: Vec<Payment>) -> RevenueReport {
    let sum = |fee_type| paid.iter().filter(|p| p.fee_type == fee_type).map(|p| p.amount).sum::<i64>();
    let reservation_total = sum(FeeType::Reservation);
    let extension_total = sum(FeeType::Extension);

    let lines = paid
        .iter()
        .map(|p| RevenueLine {
            payment_id: p.id,
            booking_id: p.booking_id,
            fee_type: p.fee_type,
            amount: p.amount,
            paid_at: p.created_at,
        })
        .collect();

    RevenueReport {
        period,
        from,
        to,
        lines,
        reservation_total,
        extension_total,
        total: reservation_total + extension_total,
    }
}

/// Paid payments created within the period, itemized and totalled.
pub async fn revenue_report(store: &dyn ParkingStore, period: ReportPeriod, anchor: &str) -> CoreResult<RevenueReport> {
    let (from, to) = period.range(anchor)?;
    let paid = store.paid_payments_between(from, to).await?;
    let report = summarize(period, from, to, paid);
    tracing::info!(?period, %from, %to, payments = report.lines.len(), total = report.total, "Revenue report generated");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkline_core::memory::MemoryStore;
    use parkline_shared::{Booking, PaymentStatus};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let (from, to) = ReportPeriod::Monthly.range("2025-12").unwrap();
        assert_eq!(from, at(2025, 12, 1, 0));
        assert_eq!(to, at(2026, 1, 1, 0));
    }

    #[test]
    fn test_week_spans_seven_days() {
        let (from, to) = ReportPeriod::Weekly.range("2024-02-26").unwrap();
        assert_eq!(from, at(2024, 2, 26, 0));
        assert_eq!(to, at(2024, 3, 4, 0));
    }

    #[test]
    fn test_day_and_year_bounds() {
        assert_eq!(ReportPeriod::Daily.range("2026-03-09").unwrap(), (at(2026, 3, 9, 0), at(2026, 3, 10, 0)));
        assert_eq!(ReportPeriod::Yearly.range("2026").unwrap(), (at(2026, 1, 1, 0), at(2027, 1, 1, 0)));
    }

    #[test]
    fn test_malformed_anchor_is_validation_error() {
        assert!(matches!(ReportPeriod::Monthly.range("2026-13"), Err(CoreError::Validation(_))));
        assert!(matches!(ReportPeriod::Daily.range("09/03/2026"), Err(CoreError::Validation(_))));
        assert!(matches!(ReportPeriod::Yearly.range("twenty"), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_period_names_are_lowercase() {
        let period: ReportPeriod = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(period, ReportPeriod::Weekly);
    }

    #[tokio::test]
    async fn test_report_counts_only_paid_inside_period() {
        let store = MemoryStore::new();
        let booking = Booking::new(1, Uuid::new_v4(), Uuid::new_v4(), at(2026, 3, 9, 8), at(2026, 3, 9, 9), at(2026, 3, 9, 7));
        store.put_booking(booking.clone()).unwrap();

        let payment = |fee_type, amount, status, created| {
            let mut p = Payment::pending(booking.id, fee_type, amount, format!("cs_{}", Uuid::new_v4().simple()), None, created);
            p.status = status;
            store.put_payment(p.clone()).unwrap();
            p
        };
        let reservation = payment(FeeType::Reservation, 2000, PaymentStatus::Paid, at(2026, 3, 9, 7));
        let extension = payment(FeeType::Extension, 30, PaymentStatus::Paid, at(2026, 3, 9, 23));
        payment(FeeType::Extension, 30, PaymentStatus::Failed, at(2026, 3, 9, 10));
        payment(FeeType::Reservation, 3000, PaymentStatus::Pending, at(2026, 3, 9, 11));
        payment(FeeType::Reservation, 8000, PaymentStatus::Paid, at(2026, 3, 10, 0));

        let report = revenue_report(&store, ReportPeriod::Daily, "2026-03-09").await.unwrap();
        assert_eq!(report.lines.iter().map(|l| l.payment_id).collect::<Vec<_>>(), vec![reservation.id, extension.id]);
        assert_eq!(report.reservation_total, 2000);
        assert_eq!(report.extension_total, 30);
        assert_eq!(report.total, 2030);

        let month = revenue_report(&store, ReportPeriod::Monthly, "2026-03").await.unwrap();
        assert_eq!(month.total, 10030);
    }
}

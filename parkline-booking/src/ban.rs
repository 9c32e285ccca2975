use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parkline_core::{CoreError, CoreResult, ParkingStore, UserDirectory};
use parkline_shared::User;

use crate::ReservationPolicy;

/// Temporary bans for users who keep abandoning reservation payments.
pub struct BanPolicy {
    store: Arc<dyn ParkingStore>,
    users: Arc<dyn UserDirectory>,
    policy: ReservationPolicy,
}

impl BanPolicy {
    pub fn new(store: Arc<dyn ParkingStore>, users: Arc<dyn UserDirectory>, policy: ReservationPolicy) -> Self {
        Self { store, users, policy }
    }

    /// Admit or reject `user` at `now`, lifting expired bans and imposing new ones.
    pub async fn check(&self, user: &User, now: DateTime<Utc>) -> CoreResult<()> {
        if user.is_banned {
            match user.ban_end_time {
                Some(until) if now < until => return Err(CoreError::UserBanned { until }),
                _ => {
                    self.users.set_ban(user.id, None).await?;
                    tracing::info!(user_id = %user.id, "Ban lifted");
                    return Ok(());
                }
            }
        }

        let failed = self
            .store
            .count_failed_reservations_since(user.id, start_of_day(now))
            .await?;

        if failed >= self.policy.ban_failed_payments_threshold {
            let until = now + self.policy.ban_duration();
            self.users.set_ban(user.id, Some(until)).await?;
            tracing::warn!(user_id = %user.id, failed, until = %until, "User banned for abandoned payments");
            return Err(CoreError::UserBanned { until });
        }

        Ok(())
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 17, 45, 12).unwrap();
        assert_eq!(start_of_day(now), Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());
        assert_eq!(start_of_day(now) + Duration::days(1), Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use parkline_core::repository::{
    Constraint, NotificationLog, ParkingStore, SlotTransaction, StoreError, StoreResult, UserDirectory,
};
use parkline_shared::{
    Booking, FeeType, Feedback, Notification, Payment, PaymentStatus, Rating, Slot, SlotStatus, User, Vehicle,
};

/// PostgreSQL-backed store. The slot lock is a `FOR UPDATE` row lock held
/// by an open transaction.
#[derive(Clone)]
pub struct PgParkingStore {
    pool: PgPool,
}

impl PgParkingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Classify a sqlx error, surfacing unique violations on the named indexes.
fn store_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // PostgreSQL unique constraint violation: error code 23505
        if db_err.code().as_deref() == Some("23505") {
            match db_err.constraint() {
                Some("uq_bookings_valid_slot") => return StoreError::Conflict(Constraint::ValidBookingPerSlot),
                Some("uq_bookings_valid_user") => return StoreError::Conflict(Constraint::ValidBookingPerUser),
                Some("uq_payments_checkout_session") => return StoreError::Conflict(Constraint::CheckoutSession),
                Some("uq_feedback_payment") => return StoreError::Conflict(Constraint::FeedbackPerPayment),
                _ => {}
            }
        }
    }
    StoreError::Backend(err.to_string())
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct SlotRow {
    number: i32,
    status: String,
}

impl TryFrom<SlotRow> for Slot {
    type Error = StoreError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<SlotStatus>().map_err(StoreError::Inconsistent)?;
        Ok(Slot { number: row.number, status })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    slot_number: i32,
    user_id: Uuid,
    vehicle_id: Uuid,
    start_time: DateTime<Utc>,
    expiration_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    is_valid: bool,
    extended: bool,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            slot_number: row.slot_number,
            user_id: row.user_id,
            vehicle_id: row.vehicle_id,
            start_time: row.start_time,
            expiration_time: row.expiration_time,
            end_time: row.end_time,
            is_valid: row.is_valid,
            extended: row.extended,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    fee_type: String,
    amount: i64,
    status: String,
    checkout_session_id: String,
    checkout_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            fee_type: row.fee_type.parse::<FeeType>().map_err(StoreError::Inconsistent)?,
            amount: row.amount,
            status: row.status.parse::<PaymentStatus>().map_err(StoreError::Inconsistent)?,
            checkout_session_id: row.checkout_session_id,
            checkout_url: row.checkout_url,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    contact_number: String,
    is_banned: bool,
    ban_end_time: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email.into(),
            contact_number: row.contact_number.into(),
            is_banned: row.is_banned,
            ban_end_time: row.ban_end_time,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    owner_id: Uuid,
    license_plate: String,
    make: String,
    model: String,
    color: String,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            owner_id: row.owner_id,
            license_plate: row.license_plate,
            make: row.make,
            model: row.model,
            color: row.color,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    message: String,
    payload: serde_json::Value,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            message: row.message,
            payload: row.payload,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: Uuid,
    payment_id: Uuid,
    rating: String,
    comments: String,
    submitted_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = StoreError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        Ok(Feedback {
            id: row.id,
            payment_id: row.payment_id,
            rating: row.rating.parse::<Rating>().map_err(StoreError::Inconsistent)?,
            comments: row.comments,
            submitted_at: row.submitted_at,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, slot_number, user_id, vehicle_id, start_time, expiration_time, end_time, is_valid, extended, created_at";
const PAYMENT_COLUMNS: &str =
    "id, booking_id, fee_type, amount, status, checkout_session_id, checkout_url, created_at";

/// Oldest first, same as the in-memory store.
fn payments_by_booking_sql() -> String {
    format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY created_at ASC, id ASC")
}

fn payments_from(rows: Vec<PaymentRow>) -> StoreResult<Vec<Payment>> {
    rows.into_iter().map(Payment::try_from).collect()
}

/// A slot row locked `FOR UPDATE`. Dropping it rolls the transaction back.
pub struct PgSlotTransaction {
    tx: Transaction<'static, Postgres>,
    slot: Slot,
}

#[async_trait]
impl SlotTransaction for PgSlotTransaction {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    async fn set_status(&mut self, status: SlotStatus) -> StoreResult<()> {
        sqlx::query("UPDATE slots SET status = $2 WHERE number = $1")
            .bind(self.slot.number)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;
        self.slot.status = status;
        Ok(())
    }

    async fn find_valid_booking(&mut self) -> StoreResult<Option<Booking>> {
        let mut rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE slot_number = $1 AND is_valid"
        ))
        .bind(self.slot.number)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_err)?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(Booking::from)),
            n => Err(StoreError::Inconsistent(format!(
                "slot {} has {} valid bookings",
                self.slot.number, n
            ))),
        }
    }

    async fn user_has_valid_booking(&mut self, user_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM bookings WHERE user_id = $1 AND is_valid)")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_err)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, slot_number, user_id, vehicle_id, start_time, expiration_time, end_time, is_valid, extended, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(booking.id)
        .bind(booking.slot_number)
        .bind(booking.user_id)
        .bind(booking.vehicle_id)
        .bind(booking.start_time)
        .bind(booking.expiration_time)
        .bind(booking.end_time)
        .bind(booking.is_valid)
        .bind(booking.extended)
        .bind(booking.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET expiration_time = $2, end_time = $3, is_valid = $4, extended = $5 WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.expiration_time)
        .bind(booking.end_time)
        .bind(booking.is_valid)
        .bind(booking.extended)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("booking {}", booking.id)));
        }
        Ok(())
    }

    async fn payments_for(&mut self, booking_id: Uuid) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&payments_by_booking_sql())
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_err)?;
        payments_from(rows)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, fee_type, amount, status, checkout_session_id, checkout_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.fee_type.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.checkout_session_id)
        .bind(&payment.checkout_url)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_payment_status(&mut self, payment_id: Uuid, status: PaymentStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE payments SET status = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("payment {}", payment_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(store_err)
    }
}

#[async_trait]
impl ParkingStore for PgParkingStore {
    async fn get_slot(&self, number: i32) -> StoreResult<Option<Slot>> {
        sqlx::query_as::<_, SlotRow>("SELECT number, status FROM slots WHERE number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Slot::try_from)
            .transpose()
    }

    async fn list_slots(&self) -> StoreResult<Vec<Slot>> {
        sqlx::query_as::<_, SlotRow>("SELECT number, status FROM slots ORDER BY number")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Slot::try_from)
            .collect()
    }

    async fn provision_slots(&self, numbers: &[i32]) -> StoreResult<Vec<Slot>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut created = Vec::new();

        for number in numbers {
            let row = sqlx::query_as::<_, SlotRow>(
                "INSERT INTO slots (number, status) VALUES ($1, 'Vacant') ON CONFLICT (number) DO NOTHING RETURNING number, status",
            )
            .bind(number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

            if let Some(row) = row {
                created.push(Slot::try_from(row)?);
            }
        }

        tx.commit().await.map_err(store_err)?;
        Ok(created)
    }

    async fn lock_slot(&self, number: i32) -> StoreResult<Option<Box<dyn SlotTransaction>>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query_as::<_, SlotRow>("SELECT number, status FROM slots WHERE number = $1 FOR UPDATE")
            .bind(number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => Ok(Some(Box::new(PgSlotTransaction { tx, slot: Slot::try_from(row)? }))),
            None => Ok(None),
        }
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Booking::from))
    }

    async fn valid_booking_for_user(&self, user_id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 AND is_valid"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Booking::from))
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn payments_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&payments_by_booking_sql())
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        payments_from(rows)
    }

    async fn find_payment_by_session(&self, checkout_session_id: &str) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE checkout_session_id = $1"
        ))
        .bind(checkout_session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn count_failed_reservations_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM payments p
            JOIN bookings b ON b.id = p.booking_id
            WHERE b.user_id = $1
              AND NOT b.is_valid
              AND p.fee_type = 'Reservation'
              AND p.status = 'Failed'
              AND p.created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn paid_payments_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status = 'Paid' AND created_at >= $1 AND created_at < $2 ORDER BY created_at ASC, id ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        payments_from(rows)
    }

    async fn feedback_for_payment(&self, payment_id: Uuid) -> StoreResult<Option<Feedback>> {
        sqlx::query_as::<_, FeedbackRow>(
            "SELECT id, payment_id, rating, comments, submitted_at FROM feedback WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .map(Feedback::try_from)
        .transpose()
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, payment_id, rating, comments, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.payment_id)
        .bind(feedback.rating.as_str())
        .bind(&feedback.comments)
        .bind(feedback.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgParkingStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, first_name, last_name, email, contact_number, is_banned, ban_end_time FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(User::from))
    }

    async fn set_ban(&self, user_id: Uuid, ban_end_time: Option<DateTime<Utc>>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET is_banned = $2, ban_end_time = $3 WHERE id = $1")
            .bind(user_id)
            .bind(ban_end_time.is_some())
            .bind(ban_end_time)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            "SELECT id, owner_id, license_plate, make, model, color FROM vehicles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Vehicle::from))
    }
}

#[async_trait]
impl NotificationLog for PgParkingStore {
    async fn record(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, message, payload, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.message)
        .bind(&notification.payload)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, kind, message, payload, is_read, created_at FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_backend() {
        assert!(matches!(store_err(sqlx::Error::RowNotFound), StoreError::Backend(_)));
        assert!(matches!(store_err(sqlx::Error::PoolTimedOut), StoreError::Backend(_)));
    }

    #[test]
    fn test_unknown_slot_status_is_inconsistent() {
        let row = SlotRow { number: 3, status: "Flooded".to_string() };
        assert!(matches!(Slot::try_from(row), Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn test_feedback_row_keeps_spaced_rating() {
        let row = FeedbackRow {
            id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            rating: "Very Bad".to_string(),
            comments: "Gate was closed".to_string(),
            submitted_at: Utc::now(),
        };
        assert_eq!(Feedback::try_from(row).unwrap().rating, Rating::VeryBad);
    }

    #[test]
    fn test_payment_history_reads_oldest_first() {
        assert!(payments_by_booking_sql().ends_with("ORDER BY created_at ASC, id ASC"));
    }

    #[test]
    fn test_payment_row_maps_enums() {
        let row = PaymentRow {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            fee_type: "Extension".to_string(),
            amount: 30,
            status: "Paid".to_string(),
            checkout_session_id: "cs_1".to_string(),
            checkout_url: None,
            created_at: Utc::now(),
        };
        let payment = Payment::try_from(row).unwrap();
        assert_eq!(payment.fee_type, FeeType::Extension);
        assert_eq!(payment.status, PaymentStatus::Paid);
    }
}

//! In-process store with the same locking and uniqueness rules as the
//! PostgreSQL one. Backs the test suites and database-less local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;
use parkline_shared::{
    Booking, FeeType, Feedback, Notification, Payment, PaymentStatus, Slot, SlotStatus, User, Vehicle,
};

use crate::repository::{
    Constraint, NotificationLog, ParkingStore, SlotTransaction, StoreError, StoreResult, UserDirectory,
};

#[derive(Default)]
struct Tables {
    slots: BTreeMap<i32, SlotStatus>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    users: HashMap<Uuid, User>,
    vehicles: HashMap<Uuid, Vehicle>,
    notifications: Vec<Notification>,
    feedback: HashMap<Uuid, Feedback>,
}

impl Tables {
    fn valid_bookings_for_slot(&self, number: i32) -> impl Iterator<Item = &Booking> {
        self.bookings
            .values()
            .filter(move |b| b.slot_number == number && b.is_valid)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    slot_locks: Mutex<HashMap<i32, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock_tables(tables: &Mutex<Tables>) -> StoreResult<MutexGuard<'_, Tables>> {
    tables
        .lock()
        .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        lock_tables(&self.tables)
    }

    fn slot_lock(&self, number: i32) -> StoreResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .slot_locks
            .lock()
            .map_err(|_| StoreError::Backend("slot lock table poisoned".to_string()))?;
        Ok(locks.entry(number).or_default().clone())
    }

    pub fn insert_user(&self, user: User) -> StoreResult<()> {
        self.tables()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) -> StoreResult<()> {
        self.tables()?.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    /// Write a booking row directly, bypassing the slot lock and uniqueness checks.
    pub fn put_booking(&self, booking: Booking) -> StoreResult<()> {
        self.tables()?.bookings.insert(booking.id, booking);
        Ok(())
    }

    /// Write a payment row directly, bypassing the slot lock.
    pub fn put_payment(&self, payment: Payment) -> StoreResult<()> {
        self.tables()?.payments.insert(payment.id, payment);
        Ok(())
    }

    pub fn put_slot_status(&self, number: i32, status: SlotStatus) -> StoreResult<()> {
        self.tables()?.slots.insert(number, status);
        Ok(())
    }

    pub fn valid_bookings_for_slot(&self, number: i32) -> StoreResult<Vec<Booking>> {
        Ok(self.tables()?.valid_bookings_for_slot(number).cloned().collect())
    }

    pub fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables()?.payments.get(&id).cloned())
    }
}

#[async_trait]
impl ParkingStore for MemoryStore {
    async fn get_slot(&self, number: i32) -> StoreResult<Option<Slot>> {
        Ok(self
            .tables()?
            .slots
            .get(&number)
            .map(|status| Slot { number, status: *status }))
    }

    async fn list_slots(&self) -> StoreResult<Vec<Slot>> {
        Ok(self
            .tables()?
            .slots
            .iter()
            .map(|(number, status)| Slot { number: *number, status: *status })
            .collect())
    }

    async fn provision_slots(&self, numbers: &[i32]) -> StoreResult<Vec<Slot>> {
        let mut tables = self.tables()?;
        let mut created = Vec::new();
        for &number in numbers {
            if !tables.slots.contains_key(&number) {
                tables.slots.insert(number, SlotStatus::Vacant);
                created.push(Slot::new(number));
            }
        }
        Ok(created)
    }

    async fn lock_slot(&self, number: i32) -> StoreResult<Option<Box<dyn SlotTransaction>>> {
        let exists = self.tables()?.slots.contains_key(&number);
        if !exists {
            return Ok(None);
        }

        let guard = self.slot_lock(number)?.lock_owned().await;

        // Read after acquiring the lock so the snapshot reflects the previous holder's commit.
        let status = self.tables()?.slots.get(&number).copied();
        let Some(status) = status else {
            return Ok(None);
        };

        Ok(Some(Box::new(MemorySlotTransaction {
            tables: self.tables.clone(),
            _guard: guard,
            slot: Slot { number, status },
            status_dirty: false,
            bookings: HashMap::new(),
            payments: HashMap::new(),
        })))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables()?.bookings.get(&id).cloned())
    }

    async fn valid_booking_for_user(&self, user_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables()?
            .bookings
            .values()
            .find(|b| b.user_id == user_id && b.is_valid)
            .cloned())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .tables()?
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn payments_for_booking(&self, booking_id: Uuid) -> StoreResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .tables()?
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn find_payment_by_session(&self, checkout_session_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|p| p.checkout_session_id == checkout_session_id)
            .cloned())
    }

    async fn count_failed_reservations_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64> {
        let tables = self.tables()?;
        let count = tables
            .payments
            .values()
            .filter(|p| {
                p.fee_type == FeeType::Reservation
                    && p.status == PaymentStatus::Failed
                    && p.created_at >= since
            })
            .filter(|p| {
                tables
                    .bookings
                    .get(&p.booking_id)
                    .map(|b| b.user_id == user_id && !b.is_valid)
                    .unwrap_or(false)
            })
            .count();
        Ok(count as i64)
    }

    async fn paid_payments_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Payment>> {
        let mut paid: Vec<Payment> = self
            .tables()?
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Paid && p.created_at >= from && p.created_at < to)
            .cloned()
            .collect();
        paid.sort_by_key(|p| (p.created_at, p.id));
        Ok(paid)
    }

    async fn feedback_for_payment(&self, payment_id: Uuid) -> StoreResult<Option<Feedback>> {
        Ok(self.tables()?.feedback.values().find(|f| f.payment_id == payment_id).cloned())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        let mut tables = self.tables()?;
        if tables.feedback.values().any(|f| f.payment_id == feedback.payment_id) {
            return Err(StoreError::Conflict(Constraint::FeedbackPerPayment));
        }
        tables.feedback.insert(feedback.id, feedback.clone());
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn set_ban(&self, user_id: Uuid, ban_end_time: Option<DateTime<Utc>>) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.is_banned = ban_end_time.is_some();
        user.ban_end_time = ban_end_time;
        Ok(())
    }

    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        Ok(self.tables()?.vehicles.get(&id).cloned())
    }
}

#[async_trait]
impl NotificationLog for MemoryStore {
    async fn record(&self, notification: &Notification) -> StoreResult<()> {
        self.tables()?.notifications.push(notification.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .tables()?
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }
}

/// Staged writes against one locked slot.
struct MemorySlotTransaction {
    tables: Arc<Mutex<Tables>>,
    _guard: OwnedMutexGuard<()>,
    slot: Slot,
    status_dirty: bool,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
}

impl MemorySlotTransaction {
    /// Committed rows for this slot overlaid with the staged ones.
    fn merged_bookings(&self) -> StoreResult<Vec<Booking>> {
        let tables = lock_tables(&self.tables)?;
        let mut merged: HashMap<Uuid, Booking> = tables
            .bookings
            .values()
            .filter(|b| b.slot_number == self.slot.number)
            .map(|b| (b.id, b.clone()))
            .collect();
        for (id, booking) in &self.bookings {
            merged.insert(*id, booking.clone());
        }
        Ok(merged.into_values().collect())
    }

    fn current_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        if let Some(staged) = self.payments.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(lock_tables(&self.tables)?.payments.get(&id).cloned())
    }
}

#[async_trait]
impl SlotTransaction for MemorySlotTransaction {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    async fn set_status(&mut self, status: SlotStatus) -> StoreResult<()> {
        self.slot.status = status;
        self.status_dirty = true;
        Ok(())
    }

    async fn find_valid_booking(&mut self) -> StoreResult<Option<Booking>> {
        let mut valid: Vec<Booking> = self
            .merged_bookings()?
            .into_iter()
            .filter(|b| b.is_valid)
            .collect();
        match valid.len() {
            0 => Ok(None),
            1 => Ok(valid.pop()),
            n => Err(StoreError::Inconsistent(format!(
                "slot {} has {} valid bookings",
                self.slot.number, n
            ))),
        }
    }

    async fn user_has_valid_booking(&mut self, user_id: Uuid) -> StoreResult<bool> {
        if self.bookings.values().any(|b| b.user_id == user_id && b.is_valid) {
            return Ok(true);
        }
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .bookings
            .values()
            .filter(|b| !self.bookings.contains_key(&b.id))
            .any(|b| b.user_id == user_id && b.is_valid))
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if booking.is_valid && self.merged_bookings()?.iter().any(|b| b.is_valid) {
            return Err(StoreError::Conflict(Constraint::ValidBookingPerSlot));
        }
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let known = self.bookings.contains_key(&booking.id)
            || lock_tables(&self.tables)?.bookings.contains_key(&booking.id);
        if !known {
            return Err(StoreError::NotFound(format!("booking {}", booking.id)));
        }
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn payments_for(&mut self, booking_id: Uuid) -> StoreResult<Vec<Payment>> {
        let tables = lock_tables(&self.tables)?;
        let mut merged: HashMap<Uuid, Payment> = tables
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .map(|p| (p.id, p.clone()))
            .collect();
        for (id, payment) in self.payments.iter().filter(|(_, p)| p.booking_id == booking_id) {
            merged.insert(*id, payment.clone());
        }
        let mut payments: Vec<Payment> = merged.into_values().collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment_status(&mut self, payment_id: Uuid, status: PaymentStatus) -> StoreResult<()> {
        let mut payment = self
            .current_payment(payment_id)?
            .ok_or_else(|| StoreError::NotFound(format!("payment {}", payment_id)))?;
        payment.status = status;
        self.payments.insert(payment_id, payment);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tables = lock_tables(&self.tables)?;

        // Same uniqueness rules the partial indexes enforce in PostgreSQL.
        for booking in self.bookings.values().filter(|b| b.is_valid) {
            let clash = |other: &&Booking| other.id != booking.id && other.is_valid;
            if tables
                .bookings
                .values()
                .filter(|b| !self.bookings.contains_key(&b.id))
                .filter(clash)
                .any(|b| b.slot_number == booking.slot_number)
            {
                return Err(StoreError::Conflict(Constraint::ValidBookingPerSlot));
            }
            if tables
                .bookings
                .values()
                .filter(|b| !self.bookings.contains_key(&b.id))
                .filter(clash)
                .any(|b| b.user_id == booking.user_id)
            {
                return Err(StoreError::Conflict(Constraint::ValidBookingPerUser));
            }
        }
        for payment in self.payments.values() {
            if tables
                .payments
                .values()
                .any(|p| p.id != payment.id && p.checkout_session_id == payment.checkout_session_id)
            {
                return Err(StoreError::Conflict(Constraint::CheckoutSession));
            }
        }

        if self.status_dirty {
            tables.slots.insert(self.slot.number, self.slot.status);
        }
        for (id, booking) in &self.bookings {
            tables.bookings.insert(*id, booking.clone());
        }
        for (id, payment) in &self.payments {
            tables.payments.insert(*id, payment.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking(slot: i32, user: Uuid) -> Booking {
        let now = Utc::now();
        Booking::new(slot, user, Uuid::new_v4(), now, now + Duration::minutes(15), now)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        store.provision_slots(&[1]).await.unwrap();

        {
            let mut tx = store.lock_slot(1).await.unwrap().unwrap();
            tx.set_status(SlotStatus::Reserved).await.unwrap();
            tx.insert_booking(&booking(1, Uuid::new_v4())).await.unwrap();
        }

        assert_eq!(store.get_slot(1).await.unwrap().unwrap().status, SlotStatus::Vacant);
        assert!(store.valid_bookings_for_slot(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        store.provision_slots(&[1]).await.unwrap();

        let mut tx = store.lock_slot(1).await.unwrap().unwrap();
        tx.set_status(SlotStatus::Reserved).await.unwrap();
        tx.insert_booking(&booking(1, Uuid::new_v4())).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_slot(1).await.unwrap().unwrap().status, SlotStatus::Reserved);
        assert_eq!(store.valid_bookings_for_slot(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_valid_booking_on_slot_is_rejected() {
        let store = MemoryStore::new();
        store.provision_slots(&[2]).await.unwrap();
        store.put_booking(booking(2, Uuid::new_v4())).unwrap();

        let mut tx = store.lock_slot(2).await.unwrap().unwrap();
        let err = tx.insert_booking(&booking(2, Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Constraint::ValidBookingPerSlot)));
    }

    #[tokio::test]
    async fn test_one_valid_booking_per_user_enforced_on_commit() {
        let store = MemoryStore::new();
        store.provision_slots(&[1, 2]).await.unwrap();
        let user = Uuid::new_v4();
        store.put_booking(booking(1, user)).unwrap();

        let mut tx = store.lock_slot(2).await.unwrap().unwrap();
        tx.insert_booking(&booking(2, user)).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Constraint::ValidBookingPerUser)));
    }

    #[tokio::test]
    async fn test_duplicate_valid_bookings_reported_inconsistent() {
        let store = MemoryStore::new();
        store.provision_slots(&[3]).await.unwrap();
        store.put_booking(booking(3, Uuid::new_v4())).unwrap();
        store.put_booking(booking(3, Uuid::new_v4())).unwrap();

        let mut tx = store.lock_slot(3).await.unwrap().unwrap();
        assert!(matches!(tx.find_valid_booking().await, Err(StoreError::Inconsistent(_))));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.provision_slots(&[1, 2]).await.unwrap().len(), 2);
        store.put_slot_status(1, SlotStatus::Occupied).unwrap();

        let created = store.provision_slots(&[1, 2, 3]).await.unwrap();
        assert_eq!(created, vec![Slot::new(3)]);
        assert_eq!(store.get_slot(1).await.unwrap().unwrap().status, SlotStatus::Occupied);
        assert!(store.lock_slot(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payment_history_is_oldest_first() {
        let store = MemoryStore::new();
        store.provision_slots(&[4]).await.unwrap();
        let b = booking(4, Uuid::new_v4());
        store.put_booking(b.clone()).unwrap();

        let now = Utc::now();
        let extension = Payment::pending(b.id, FeeType::Extension, 30, "cs_ext".into(), None, now);
        let reservation = Payment::pending(b.id, FeeType::Reservation, 2000, "cs_res".into(), None, now - Duration::minutes(20));
        store.put_payment(extension.clone()).unwrap();
        store.put_payment(reservation.clone()).unwrap();

        let history: Vec<Uuid> = store.payments_for_booking(b.id).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(history, vec![reservation.id, extension.id]);

        let mut tx = store.lock_slot(4).await.unwrap().unwrap();
        let locked: Vec<Uuid> = tx.payments_for(b.id).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(locked, history);
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use parkline_booking::{AdmissionController, MockPaymentGateway, PaymentOrchestrator, ReconciliationEngine, ReservationPolicy};
use parkline_core::memory::MemoryStore;
use parkline_core::notify::TracingNotifier;
use parkline_core::ParkingStore;
use parkline_shared::{Booking, FeeType, Payment, PaymentStatus, SlotStatus, User, Vehicle};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub admission: AdmissionController,
    pub orchestrator: PaymentOrchestrator,
    pub engine: ReconciliationEngine,
}

impl Harness {
    pub async fn new(slots: &[i32]) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.provision_slots(slots).await.unwrap();
        let gateway = Arc::new(MockPaymentGateway::new());
        let policy = ReservationPolicy::default();

        Self {
            admission: AdmissionController::new(store.clone(), store.clone(), gateway.clone(), policy.clone()),
            orchestrator: PaymentOrchestrator::new(store.clone(), store.clone(), gateway.clone(), Arc::new(TracingNotifier)),
            engine: ReconciliationEngine::new(store.clone(), gateway.clone(), policy.payment_timeout_seconds),
            store,
            gateway,
        }
    }

    /// A user with one registered vehicle.
    pub fn driver(&self, first_name: &str) -> (User, Vehicle) {
        let user = User {
            id: Uuid::new_v4(),
            username: first_name.to_lowercase(),
            first_name: first_name.to_string(),
            last_name: "Reyes".to_string(),
            email: format!("{}@example.com", first_name.to_lowercase()).into(),
            contact_number: "09171234567".to_string().into(),
            is_banned: false,
            ban_end_time: None,
        };
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            owner_id: user.id,
            license_plate: "ABC 1234".to_string(),
            make: "Toyota".to_string(),
            model: "Vios".to_string(),
            color: "Silver".to_string(),
        };
        self.store.insert_user(user.clone()).unwrap();
        self.store.insert_vehicle(vehicle.clone()).unwrap();
        (user, vehicle)
    }

    /// Seed a valid booking whose reservation payment has the given status and age.
    pub fn seed_booking(
        &self,
        slot: i32,
        user: &User,
        vehicle: &Vehicle,
        now: DateTime<Utc>,
        expires_in: Duration,
        status: PaymentStatus,
        payment_age: Duration,
    ) -> (Booking, Payment) {
        let booking = Booking::new(
            slot,
            user.id,
            vehicle.id,
            now - Duration::minutes(5),
            now + expires_in,
            now - payment_age,
        );
        let mut payment = Payment::pending(
            booking.id,
            FeeType::Reservation,
            2000,
            format!("cs_seed_{}", booking.id.simple()),
            None,
            now - payment_age,
        );
        payment.status = status;
        self.store.put_booking(booking.clone()).unwrap();
        self.store.put_payment(payment.clone()).unwrap();
        self.store.put_slot_status(slot, SlotStatus::Reserved).unwrap();
        (booking, payment)
    }

    pub async fn slot_status(&self, number: i32) -> SlotStatus {
        self.store.get_slot(number).await.unwrap().unwrap().status
    }
}

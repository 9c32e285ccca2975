mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use parkline_booking::{ConfirmationOutcome, ReserveRequest};
use parkline_core::{CoreError, ParkingStore};
use parkline_shared::{PaymentStatus, SlotStatus};

use common::Harness;

#[tokio::test]
async fn test_reserve_claims_slot_and_opens_payment() {
    let h = Harness::new(&[1, 2]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();

    let handle = h
        .admission
        .reserve(
            ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now + Duration::minutes(90) },
            now,
        )
        .await
        .unwrap();

    // Lead time of 1h30m falls in the "within 2 hours" band.
    assert_eq!(handle.amount, 3000);
    assert_eq!(h.slot_status(1).await, SlotStatus::Reserved);

    let booking = h.store.get_booking(handle.booking_id).await.unwrap().unwrap();
    assert!(booking.is_valid);
    assert_eq!(booking.expiration_time, booking.start_time + Duration::minutes(15));

    let payment = h.store.get_payment(handle.payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(h.gateway.opened_sessions().len(), 1);
}

#[tokio::test]
async fn test_concurrent_reserve_on_same_slot_admits_one() {
    let h = Arc::new(Harness::new(&[7]).await);
    let (ana, ana_car) = h.driver("Ana");
    let (ben, ben_car) = h.driver("Ben");
    let now = Utc::now();

    let first = {
        let h = h.clone();
        tokio::spawn(async move {
            h.admission
                .reserve(ReserveRequest { slot_number: 7, user_id: ana.id, vehicle_id: ana_car.id, start_time: now }, now)
                .await
        })
    };
    let second = {
        let h = h.clone();
        tokio::spawn(async move {
            h.admission
                .reserve(ReserveRequest { slot_number: 7, user_id: ben.id, vehicle_id: ben_car.id, start_time: now }, now)
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::SlotNotAvailable(7))))
        .count();

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 1);
    assert_eq!(h.store.valid_bookings_for_slot(7).unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_with_valid_booking_cannot_reserve_again() {
    let h = Harness::new(&[1, 2]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();

    h.admission
        .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap();

    let err = h
        .admission
        .reserve(ReserveRequest { slot_number: 2, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyBooked));
    assert_eq!(h.slot_status(2).await, SlotStatus::Vacant);
}

#[tokio::test]
async fn test_gateway_failure_leaves_no_trace() {
    let h = Harness::new(&[3]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();
    h.gateway.set_failing(true);

    let err = h
        .admission
        .reserve(ReserveRequest { slot_number: 3, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::PaymentGateway(_)));
    assert_eq!(h.slot_status(3).await, SlotStatus::Vacant);
    assert!(h.store.valid_bookings_for_slot(3).unwrap().is_empty());
}

#[tokio::test]
async fn test_lost_claim_expires_opened_session() {
    let h = Harness::new(&[4]).await;
    let (ana, ana_car) = h.driver("Ana");
    let (ben, ben_car) = h.driver("Ben");
    let now = Utc::now();

    // Ben's booking exists but the slot still reads Vacant, so the
    // pre-check passes and the claim fails under the lock.
    h.seed_booking(4, &ben, &ben_car, now, Duration::minutes(10), PaymentStatus::Paid, Duration::minutes(1));
    h.store.put_slot_status(4, SlotStatus::Vacant).unwrap();

    let err = h
        .admission
        .reserve(ReserveRequest { slot_number: 4, user_id: ana.id, vehicle_id: ana_car.id, start_time: now }, now)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::SlotNotAvailable(4)));
    let opened = h.gateway.opened_sessions();
    assert_eq!(opened.len(), 1);
    assert!(h.gateway.was_expired(&opened[0].session_id));
}

#[tokio::test]
async fn test_vehicle_of_another_user_is_rejected() {
    let h = Harness::new(&[1]).await;
    let (ana, _) = h.driver("Ana");
    let (_, ben_car) = h.driver("Ben");
    let now = Utc::now();

    let err = h
        .admission
        .reserve(ReserveRequest { slot_number: 1, user_id: ana.id, vehicle_id: ben_car.id, start_time: now }, now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::VehicleNotFound(_)));
}

#[tokio::test]
async fn test_confirmation_is_idempotent() {
    let h = Harness::new(&[1]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();

    let handle = h
        .admission
        .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap();

    let first = h.orchestrator.on_payment_confirmed(&handle.checkout_session_id, now).await.unwrap();
    assert_eq!(first, ConfirmationOutcome::ReservationActivated { booking_id: handle.booking_id });

    let second = h.orchestrator.on_payment_confirmed(&handle.checkout_session_id, now).await.unwrap();
    assert_eq!(second, ConfirmationOutcome::AlreadyProcessed);

    let payment = h.store.get_payment(handle.payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert!(h.gateway.was_expired(&handle.checkout_session_id));
}

#[tokio::test]
async fn test_failed_payment_releases_slot() {
    let h = Harness::new(&[1]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();

    let handle = h
        .admission
        .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap();

    let outcome = h.orchestrator.on_payment_failed(&handle.checkout_session_id, now).await.unwrap();
    assert_eq!(
        outcome,
        ConfirmationOutcome::PaymentFailed { booking_id: handle.booking_id, booking_invalidated: true }
    );
    assert_eq!(h.slot_status(1).await, SlotStatus::Vacant);

    let booking = h.store.get_booking(handle.booking_id).await.unwrap().unwrap();
    assert!(!booking.is_valid);
    assert_eq!(booking.end_time, Some(now));
}

#[tokio::test]
async fn test_extension_of_thirty_adds_thirty_minutes_once() {
    let h = Harness::new(&[2]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();
    let (booking, _) = h.seed_booking(2, &user, &vehicle, now, Duration::minutes(10), PaymentStatus::Paid, Duration::minutes(5));

    let handle = h.admission.extend(booking.id, user.id, 30, now).await.unwrap();
    let outcome = h.orchestrator.on_payment_confirmed(&handle.checkout_session_id, now).await.unwrap();
    assert_eq!(
        outcome,
        ConfirmationOutcome::BookingExtended {
            booking_id: booking.id,
            expiration_time: booking.expiration_time + Duration::minutes(30),
        }
    );

    let extended = h.store.get_booking(booking.id).await.unwrap().unwrap();
    assert!(extended.extended);
    assert_eq!(extended.expiration_time, booking.expiration_time + Duration::minutes(30));

    let err = h.admission.extend(booking.id, user.id, 20, now).await.unwrap_err();
    assert!(matches!(err, CoreError::ExtensionNotAllowed(_)));
}

#[tokio::test]
async fn test_extension_with_unknown_amount_is_rejected() {
    let h = Harness::new(&[2]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();
    let (booking, _) = h.seed_booking(2, &user, &vehicle, now, Duration::minutes(10), PaymentStatus::Paid, Duration::minutes(5));

    let err = h.admission.extend(booking.id, user.id, 25, now).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(h.gateway.opened_sessions().is_empty());
}

#[tokio::test]
async fn test_extension_by_other_user_is_forbidden() {
    let h = Harness::new(&[2]).await;
    let (user, vehicle) = h.driver("Ana");
    let (ben, _) = h.driver("Ben");
    let now = Utc::now();
    let (booking, _) = h.seed_booking(2, &user, &vehicle, now, Duration::minutes(10), PaymentStatus::Paid, Duration::minutes(5));

    let err = h.admission.extend(booking.id, ben.id, 30, now).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn test_three_failed_reservations_ban_user() {
    let h = Harness::new(&[1]).await;
    let (user, vehicle) = h.driver("Ana");
    let now = Utc::now();

    for _ in 0..3 {
        let handle = h
            .admission
            .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
            .await
            .unwrap();
        h.orchestrator.on_payment_failed(&handle.checkout_session_id, now).await.unwrap();
    }

    let err = h
        .admission
        .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: now }, now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UserBanned { .. }));

    // A day later the ban is lifted on the next attempt.
    let later = now + Duration::hours(25);
    h.admission
        .reserve(ReserveRequest { slot_number: 1, user_id: user.id, vehicle_id: vehicle.id, start_time: later }, later)
        .await
        .unwrap();
}

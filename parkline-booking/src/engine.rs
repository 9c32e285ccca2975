use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;
use parkline_core::payment::PaymentGateway;
use parkline_core::sensor::{OccupancyFeed, SensorReading};
use parkline_core::{CoreError, CoreResult, ParkingStore};
use parkline_shared::{PaymentStatus, SlotStatus, SlotStatusChanged};
use tokio::sync::broadcast;

use crate::reconcile::{decide, ReconcileInput, Rule};
use crate::{expire_session_quietly, ledger, publish, tracker};

/// What one slot's reconciliation did.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotOutcome {
    pub slot_number: i32,
    pub rule: Rule,
    pub previous: SlotStatus,
    pub current: SlotStatus,
    pub invalidated_booking: Option<Uuid>,
    pub failed_payments: usize,
}

impl SlotOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.current || self.invalidated_booking.is_some() || self.failed_payments > 0
    }
}

/// Summary of one pass over a sensor snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub reconciled: usize,
    /// Outcomes that wrote something.
    pub changes: Vec<SlotOutcome>,
    /// Readings for slots that are not provisioned.
    pub skipped: Vec<i32>,
    /// Slots whose reconciliation errored; they are retried next tick.
    pub failed: Vec<i32>,
}

/// Periodically drives every slot toward the state implied by bookings,
/// payments, the clock and the sensor.
pub struct ReconciliationEngine {
    store: Arc<dyn ParkingStore>,
    gateway: Arc<dyn PaymentGateway>,
    payment_timeout_seconds: i64,
    events: Option<broadcast::Sender<SlotStatusChanged>>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ParkingStore>, gateway: Arc<dyn PaymentGateway>, payment_timeout_seconds: i64) -> Self {
        Self { store, gateway, payment_timeout_seconds, events: None }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SlotStatusChanged>) -> Self {
        self.events = Some(events);
        self
    }

    /// Reconcile one slot under its lock.
    ///
    /// Nothing is written when the decision matches the stored state, so
    /// repeating a call with the same inputs is a no-op.
    pub async fn reconcile_slot(&self, number: i32, sensor_occupied: bool, now: DateTime<Utc>) -> CoreResult<SlotOutcome> {
        let mut tx = self
            .store
            .lock_slot(number)
            .await?
            .ok_or(CoreError::SlotNotFound(number))?;

        let previous = tx.slot().status;
        let booking = ledger::find_valid(tx.as_mut()).await?;
        let payments = match booking.as_ref() {
            Some(b) => tx.payments_for(b.id).await?,
            None => Vec::new(),
        };
        let input = ReconcileInput {
            slot_status: previous,
            reservation: tracker::reservation_of(&payments).cloned(),
            pending_extension: tracker::pending_extension_of(&payments).cloned(),
            booking,
        };

        let decision = decide(&input, sensor_occupied, now, self.payment_timeout_seconds);
        let outcome = SlotOutcome {
            slot_number: number,
            rule: decision.rule,
            previous,
            current: decision.slot_status,
            invalidated_booking: decision.invalidate_booking,
            failed_payments: decision.fail_payments.len(),
        };

        if decision.is_noop(previous) {
            return Ok(outcome);
        }

        for fail in &decision.fail_payments {
            tx.update_payment_status(fail.payment_id, PaymentStatus::Failed).await?;
        }
        if let Some(mut booking) = input.booking.filter(|b| decision.invalidate_booking == Some(b.id)) {
            ledger::invalidate(tx.as_mut(), &mut booking, now).await?;
        }
        if decision.slot_status != previous {
            tx.set_status(decision.slot_status).await?;
        }
        tx.commit().await?;

        tracing::info!(
            slot = number,
            rule = ?decision.rule,
            previous = %previous,
            current = %decision.slot_status,
            failed_payments = decision.fail_payments.len(),
            "Slot reconciled"
        );

        for fail in &decision.fail_payments {
            expire_session_quietly(&self.gateway, &fail.checkout_session_id).await;
        }
        if decision.slot_status != previous {
            publish(
                &self.events,
                SlotStatusChanged {
                    slot_number: number,
                    previous,
                    current: decision.slot_status,
                    changed_at: now,
                },
            );
        }

        Ok(outcome)
    }

    /// Poll the feed and reconcile every reported slot.
    ///
    /// A feed failure skips the whole tick; stored state is left untouched.
    pub async fn run_tick(&self, feed: &dyn OccupancyFeed, now: DateTime<Utc>) -> CoreResult<TickReport> {
        let readings = feed.poll_occupancy().await.map_err(|e| {
            tracing::warn!(error = %e, "Sensor feed unavailable, skipping tick");
            CoreError::from(e)
        })?;
        Ok(self.apply_readings(&readings, now).await)
    }

    /// Reconcile a snapshot. Slots run concurrently and a failure on one
    /// slot never affects another.
    pub async fn apply_readings(&self, readings: &[SensorReading], now: DateTime<Utc>) -> TickReport {
        let results = join_all(
            readings
                .iter()
                .map(|r| async move { (r.number, self.reconcile_slot(r.number, r.occupied, now).await) }),
        )
        .await;

        let mut report = TickReport::default();
        for (number, result) in results {
            match result {
                Ok(outcome) => {
                    report.reconciled += 1;
                    if outcome.changed() {
                        report.changes.push(outcome);
                    }
                }
                Err(CoreError::SlotNotFound(_)) => {
                    tracing::warn!(slot = number, "Reading for unknown slot ignored");
                    report.skipped.push(number);
                }
                Err(e @ CoreError::InconsistentState(_)) => {
                    tracing::error!(slot = number, error = %e, "Slot needs operator attention");
                    report.failed.push(number);
                }
                Err(e) => {
                    tracing::error!(slot = number, error = %e, "Slot reconciliation failed");
                    report.failed.push(number);
                }
            }
        }

        tracing::debug!(
            reconciled = report.reconciled,
            changed = report.changes.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Reconciliation tick finished"
        );
        report
    }
}

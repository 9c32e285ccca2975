pub mod policy;
pub mod ledger;
pub mod tracker;
pub mod ban;
pub mod admission;
pub mod confirmation;
pub mod reconcile;
pub mod engine;
pub mod verification;
pub mod feedback;
pub mod report;
pub mod mock;

pub use policy::ReservationPolicy;
pub use admission::{AdmissionController, PaymentHandle, ReserveRequest};
pub use ban::BanPolicy;
pub use confirmation::{ConfirmationOutcome, PaymentOrchestrator};
pub use reconcile::{decide, Decision, ReconcileInput, Rule};
pub use engine::{ReconciliationEngine, SlotOutcome, TickReport};
pub use verification::{verify_booking, Verification, VerifiedBooking};
pub use feedback::{current_feedback, submit_feedback};
pub use report::{revenue_report, ReportPeriod, RevenueLine, RevenueReport};
pub use mock::MockPaymentGateway;

use std::sync::Arc;

use parkline_core::payment::PaymentGateway;
use parkline_shared::SlotStatusChanged;
use tokio::sync::broadcast;

/// Expire a checkout session outside any lock. Failures are logged, never raised.
pub(crate) async fn expire_session_quietly(gateway: &Arc<dyn PaymentGateway>, session_id: &str) {
    if let Err(e) = gateway.expire_checkout_session(session_id).await {
        tracing::warn!(session_id, error = %e, "Failed to expire checkout session");
    }
}

/// Publish a committed status change to live subscribers, if anyone listens.
pub(crate) fn publish(events: &Option<broadcast::Sender<SlotStatusChanged>>, event: SlotStatusChanged) {
    if let Some(tx) = events {
        // No receivers is not an error
        let _ = tx.send(event);
    }
}

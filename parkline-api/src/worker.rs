//! Periodic reconciliation against the occupancy feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use parkline_booking::ReconciliationEngine;
use parkline_core::sensor::OccupancyFeed;

/// Run one tick per `poll_interval` until `cancel` fires.
///
/// A failed tick is logged and retried on the next one.
pub async fn run(
    engine: Arc<ReconciliationEngine>,
    feed: Arc<dyn OccupancyFeed>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = poll_interval.as_secs(), "Reconciliation worker started");

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation worker stopping");
                break;
            }
            _ = interval.tick() => {
                match engine.run_tick(feed.as_ref(), Utc::now()).await {
                    Ok(report) if !report.changes.is_empty() || !report.failed.is_empty() => {
                        tracing::info!(
                            changed = report.changes.len(),
                            failed = report.failed.len(),
                            skipped = report.skipped.len(),
                            "Reconciliation tick applied"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Reconciliation tick skipped");
                    }
                }
            }
        }
    }
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use parkline_booking::{revenue_report, verify_booking, ReportPeriod, RevenueReport, TickReport, Verification};
use parkline_core::sensor::SensorReading;
use parkline_core::CoreError;
use parkline_shared::Slot;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProvisionSlotsRequest {
    pub numbers: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionSlotsResponse {
    pub created: Vec<Slot>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub readings: Vec<SensorReading>,
}

/// Payload of a scanned booking QR code.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub period: ReportPeriod,
    /// `YYYY-MM-DD` for daily and weekly, `YYYY-MM` monthly, `YYYY` yearly.
    pub date: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/admin/slots
pub async fn provision_slots(
    State(state): State<AppState>,
    Json(req): Json<ProvisionSlotsRequest>,
) -> Result<(StatusCode, Json<ProvisionSlotsResponse>), AppError> {
    if req.numbers.is_empty() {
        return Err(AppError::ValidationError("numbers must not be empty".to_string()));
    }
    if let Some(bad) = req.numbers.iter().find(|n| **n <= 0) {
        return Err(AppError::ValidationError(format!("slot number {} must be positive", bad)));
    }

    let created = state.store.provision_slots(&req.numbers).await.map_err(CoreError::from)?;
    tracing::info!(requested = req.numbers.len(), created = created.len(), "Slots provisioned");

    Ok((StatusCode::CREATED, Json(ProvisionSlotsResponse { created })))
}

/// POST /v1/admin/reconcile
/// Apply one reconciliation pass from a pushed sensor snapshot
pub async fn reconcile(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Json<TickReport> {
    Json(state.engine.apply_readings(&req.readings, Utc::now()).await)
}

/// POST /v1/admin/verify
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Verification>, AppError> {
    let booking_id = Uuid::parse_str(req.data.trim())
        .map_err(|_| AppError::ValidationError("Invalid QR code".to_string()))?;

    let verification = verify_booking(state.store.as_ref(), state.users.as_ref(), booking_id).await?;
    Ok(Json(verification))
}

/// GET /v1/admin/reports/revenue?period=monthly&date=2026-03
pub async fn revenue(
    State(state): State<AppState>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueReport>, AppError> {
    Ok(Json(revenue_report(state.store.as_ref(), query.period, &query.date).await?))
}

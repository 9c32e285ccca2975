use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use parkline_booking::tracker::reservation_of;
use parkline_booking::{current_feedback, submit_feedback, PaymentHandle, ReserveRequest};
use parkline_core::CoreError;
use parkline_shared::{Booking, Feedback, Notification, Payment, PaymentStatus, Rating};

use crate::{error::AppError, middleware::CustomerClaims, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub slot_number: i32,
    pub vehicle_id: Uuid,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendReservationRequest {
    /// One of the payable extension amounts, in minor units.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: Rating,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize)]
pub struct ReservationsResponse {
    pub current: Option<BookingView>,
    pub successful: Vec<BookingView>,
    pub failed: Vec<BookingView>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<PaymentHandle>), AppError> {
    let handle = state
        .admission
        .reserve(
            ReserveRequest {
                slot_number: req.slot_number,
                user_id: claims.sub,
                vehicle_id: req.vehicle_id,
                start_time: req.start_time,
            },
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(handle)))
}

/// POST /v1/reservations/{booking_id}/extension
pub async fn extend_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ExtendReservationRequest>,
) -> Result<(StatusCode, Json<PaymentHandle>), AppError> {
    let handle = state
        .admission
        .extend(booking_id, claims.sub, req.amount, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(handle)))
}

/// GET /v1/reservations
pub async fn my_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<ReservationsResponse>, AppError> {
    let bookings = state.store.bookings_for_user(claims.sub).await.map_err(CoreError::from)?;

    let mut response = ReservationsResponse { current: None, successful: Vec::new(), failed: Vec::new() };
    for booking in bookings {
        let payments = state.store.payments_for_booking(booking.id).await.map_err(CoreError::from)?;
        let reservation_status = reservation_of(&payments).map(|p| p.status);
        let view = BookingView { booking, payments };

        if view.booking.is_valid {
            response.current = Some(view);
            continue;
        }
        match reservation_status {
            Some(PaymentStatus::Paid) => response.successful.push(view),
            Some(PaymentStatus::Failed) => response.failed.push(view),
            _ => {}
        }
    }

    Ok(Json(response))
}

/// GET /v1/notifications
pub async fn my_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = state.notifications.list_for_user(claims.sub).await.map_err(CoreError::from)?;
    Ok(Json(notifications))
}

/// POST /v1/feedback
/// Rate the current paid reservation, once
pub async fn create_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), AppError> {
    let feedback = submit_feedback(state.store.as_ref(), claims.sub, req.rating, &req.comments, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// GET /v1/feedback
pub async fn my_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Option<Feedback>>, AppError> {
    Ok(Json(current_feedback(state.store.as_ref(), claims.sub).await?))
}

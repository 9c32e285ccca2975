use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures_util::Stream;
use serde::Serialize;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use parkline_booking::tracker::reservation_of;
use parkline_core::CoreError;
use parkline_shared::{PaymentStatus, Slot, SlotStatus};

use crate::{error::AppError, middleware::CustomerClaims, state::AppState};

#[derive(Debug, Serialize)]
pub struct SlotListResponse {
    pub slots: Vec<Slot>,
    /// The caller already holds a paid, valid reservation.
    pub already_booked: bool,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub already_reserved: bool,
}

/// GET /v1/slots
pub async fn list_slots(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<SlotListResponse>, AppError> {
    let slots = state.store.list_slots().await.map_err(CoreError::from)?;

    let already_booked = match state.store.valid_booking_for_user(claims.sub).await.map_err(CoreError::from)? {
        Some(booking) => {
            let payments = state
                .store
                .payments_for_booking(booking.id)
                .await
                .map_err(CoreError::from)?;
            reservation_of(&payments).is_some_and(|p| p.status == PaymentStatus::Paid)
        }
        None => false,
    };

    Ok(Json(SlotListResponse { slots, already_booked }))
}

/// GET /v1/slots/{number}/availability
pub async fn slot_availability(
    State(state): State<AppState>,
    Path(number): Path<i32>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let slot = state
        .store
        .get_slot(number)
        .await
        .map_err(CoreError::from)?
        .ok_or_else(|| AppError::NotFoundError(format!("Slot {} not found", number)))?;

    Ok(Json(AvailabilityResponse { already_reserved: slot.status != SlotStatus::Vacant }))
}

/// GET /v1/slots/stream
///
/// Server-sent `slot_status` events, one per committed status change.
pub async fn slot_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    // Lagged receivers drop the missed events; clients re-read /v1/slots
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let change = msg.ok()?;
        Event::default().event("slot_status").json_data(&change).ok().map(Ok::<_, Infallible>)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

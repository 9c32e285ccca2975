use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod error;
pub mod middleware;
pub mod reservations;
pub mod slots;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer = Router::new()
        .route("/v1/slots", get(slots::list_slots))
        .route("/v1/reservations", get(reservations::my_reservations).post(reservations::create_reservation))
        .route("/v1/reservations/{booking_id}/extension", post(reservations::extend_reservation))
        .route("/v1/notifications", get(reservations::my_notifications))
        .route("/v1/feedback", get(reservations::my_feedback).post(reservations::create_feedback))
        .route_layer(from_fn_with_state(state.clone(), middleware::customer_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/slots", post(admin::provision_slots))
        .route("/v1/admin/reconcile", post(admin::reconcile))
        .route("/v1/admin/verify", post(admin::verify))
        .route("/v1/admin/reports/revenue", get(admin::revenue))
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_auth_middleware));

    let public = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v1/slots/{number}/availability", get(slots::slot_availability))
        .route("/v1/slots/stream", get(slots::slot_stream))
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook));

    Router::new()
        .merge(customer)
        .merge(admin)
        .merge(public)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

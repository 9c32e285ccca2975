use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use parkline_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    AuthenticationError(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFoundError(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Core(err) => match err {
                CoreError::SlotNotAvailable(_) => (StatusCode::CONFLICT, "SLOT_NOT_AVAILABLE"),
                CoreError::AlreadyBooked => (StatusCode::CONFLICT, "ALREADY_BOOKED"),
                CoreError::UserBanned { .. } => (StatusCode::FORBIDDEN, "USER_BANNED"),
                CoreError::ExtensionNotAllowed(_) => (StatusCode::CONFLICT, "EXTENSION_NOT_ALLOWED"),
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                CoreError::FeedbackNotAllowed(_) => (StatusCode::CONFLICT, "FEEDBACK_NOT_ALLOWED"),
                CoreError::SlotNotFound(_)
                | CoreError::BookingNotFound(_)
                | CoreError::UserNotFound(_)
                | CoreError::VehicleNotFound(_)
                | CoreError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                CoreError::PaymentGateway(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_GATEWAY_ERROR"),
                CoreError::SensorFeedUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SENSOR_FEED_UNAVAILABLE"),
                CoreError::SlotAlreadyValidBooking(_) | CoreError::InconsistentState(_) | CoreError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        let message = match &self {
            AppError::Core(err) if status.is_server_error() => {
                tracing::error!(error = %err, "Request failed");
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    "An internal error occurred".to_string()
                } else {
                    err.to_string()
                }
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkline_core::StoreError;

    #[test]
    fn test_user_visible_errors_map_to_4xx() {
        assert_eq!(AppError::from(CoreError::SlotNotAvailable(3)).classify().0, StatusCode::CONFLICT);
        assert_eq!(AppError::from(CoreError::AlreadyBooked).classify().0, StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(CoreError::UserBanned { until: chrono::Utc::now() }).classify().0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_store_failures_are_sanitized() {
        let response = AppError::from(CoreError::Store(StoreError::Backend("connection reset".into()))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

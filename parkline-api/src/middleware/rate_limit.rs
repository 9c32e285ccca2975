use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use parkline_store::redis_repo::rate_limit_key;

use crate::state::AppState;

/// Per-address request budget per minute. Fails open when Redis errors.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limit) = state.rate_limit.as_ref() else {
        return next.run(req).await;
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = rate_limit_key(&ip, Utc::now().timestamp() / 60);

    match limit.redis.check_rate_limit(&key, limit.per_minute, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, allowing request");
            next.run(req).await
        }
    }
}

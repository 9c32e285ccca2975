use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    http::StatusCode,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// A driver. `sub` is the user id the reservation core acts for.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
}

/// Parking staff or an operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

fn expiry(seconds: u64) -> usize {
    (Utc::now() + Duration::seconds(seconds as i64)).timestamp() as usize
}

pub fn issue_customer_token(secret: &str, user_id: Uuid, expiration: u64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = CustomerClaims { sub: user_id, role: "CUSTOMER".to_owned(), exp: expiry(expiration) };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

pub fn issue_admin_token(secret: &str, subject: &str, role: &str, expiration: u64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AdminClaims { sub: subject.to_owned(), role: role.to_owned(), exp: expiry(expiration) };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(StatusCode::UNAUTHORIZED)?;
    let token_data = decode::<CustomerClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    ).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if token_data.claims.role != "CUSTOMER" {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(StatusCode::UNAUTHORIZED)?;
    let token_data = decode::<AdminClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    ).map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Staff can scan bookings; operators share the same surface
    if token_data.claims.role != "ADMIN" && token_data.claims.role != "STAFF" {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

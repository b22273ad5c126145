//! Principal extraction at the HTTP boundary.
//!
//! The auth collaborator (login, registration, session issue) lives outside
//! this service; requests arrive with a bearer token it minted. The token is
//! decoded exactly once here and turned into a typed principal — handlers
//! take a [`CustomerPrincipal`] or [`StaffPrincipal`] argument instead of
//! re-checking a role flag inline.

use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_STAFF: &str = "staff";

/// Header carrying the session-identity key the session collaborator assigns
/// to every browser session. Used only for cart scoping.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the customer id as a string
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints a token for the given subject. The external auth collaborator does
/// this in production; tests and tooling use it directly.
pub fn issue_token(
    secret: &str,
    subject: i64,
    role: &str,
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

fn decode_claims(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ServiceError::Unauthorized("invalid or expired token".to_string()))
}

fn bearer_claims(parts: &Parts, secret: &str) -> Result<Claims, ServiceError> {
    let header_value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".to_string()))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".to_string()))?
        .trim();

    decode_claims(secret, token)
}

fn subject_id(claims: &Claims) -> Result<i64, ServiceError> {
    claims
        .sub
        .parse()
        .map_err(|_| ServiceError::Unauthorized("malformed token subject".to_string()))
}

/// An authenticated storefront customer. Staff tokens are rejected: staff
/// accounts cannot shop.
#[derive(Debug, Clone)]
pub struct CustomerPrincipal {
    pub customer_id: i64,
}

impl<S> FromRequestParts<S> for CustomerPrincipal
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let claims = bearer_claims(parts, &app.config.jwt_secret)?;
        if claims.role == ROLE_STAFF {
            return Err(ServiceError::Forbidden(
                "staff accounts cannot access customer pages".to_string(),
            ));
        }
        Ok(Self {
            customer_id: subject_id(&claims)?,
        })
    }
}

/// An authenticated staff member, for the admin surface.
#[derive(Debug, Clone)]
pub struct StaffPrincipal {
    pub staff_id: i64,
}

impl<S> FromRequestParts<S> for StaffPrincipal
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let claims = bearer_claims(parts, &app.config.jwt_secret)?;
        if claims.role != ROLE_STAFF {
            return Err(ServiceError::Forbidden(
                "you must be staff to access this page".to_string(),
            ));
        }
        Ok(Self {
            staff_id: subject_id(&claims)?,
        })
    }
}

/// The session-identity key scoping the cart.
#[derive(Debug, Clone)]
pub struct SessionKey(pub String);

impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("missing {} header", SESSION_HEADER))
            })?;
        Ok(Self(key.to_string()))
    }
}

/// Best-effort session key lookup for handlers where the header may be absent
/// (e.g., the gateway redirect).
pub fn session_key_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "a_sufficiently_long_test_secret_key_1234";

    #[test]
    fn token_round_trip_preserves_subject_and_role() {
        let token = issue_token(SECRET, 42, ROLE_CUSTOMER, Duration::from_secs(60)).expect("sign");
        let claims = decode_claims(SECRET, &token).expect("decode");
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, ROLE_CUSTOMER);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = issue_token(SECRET, 42, ROLE_CUSTOMER, Duration::from_secs(60)).expect("sign");
        assert!(decode_claims("another_secret_that_is_also_long_enough!", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "1".into(),
            role: ROLE_CUSTOMER.into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("sign");
        assert!(decode_claims(SECRET, &token).is_err());
    }
}

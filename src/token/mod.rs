//! Bearer token issuance and verification.
//!
//! Two token flavors share the same HS256 mechanism with different claim
//! shapes: user tokens embed identity and role, service tokens embed a
//! service name and a permission list for machine-to-machine calls. Service
//! tokens are signed with their own secret, which defaults to the user-token
//! secret when not configured.
//!
//! Tokens are self-contained and are not revocable: a password change or
//! account deactivation does not invalidate tokens already issued. The access
//! gate catches deactivation through its live user lookup only.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Role, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidSignature,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Malformed,
    #[error("Not a service token")]
    NotAServiceToken,
}

/// Claims embedded in a user bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Claims embedded in a service-to-service token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub service: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a bearer token for `user`, valid for `ttl_days`.
pub fn issue_user_token(user: &User, secret: &str, ttl_days: i64) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = UserClaims {
        id: user.id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        is_verified: user.is_verified,
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Malformed)
}

/// Verify and decode a user bearer token.
pub fn decode_user_token(token: &str, secret: &str) -> Result<UserClaims, TokenError> {
    decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    })
}

/// Sign a service token for `service_name`, valid for `ttl_secs`.
pub fn issue_service_token(
    service_name: &str,
    permissions: Vec<String>,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = ServiceClaims {
        service: service_name.to_string(),
        permissions,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Malformed)
}

/// Verify and decode a service token.
///
/// A structurally valid token without a `service` claim (e.g. a user bearer
/// token presented to the machine-to-machine gate) fails with
/// `NotAServiceToken`, distinct from signature and expiry failures.
pub fn decode_service_token(token: &str, secret: &str) -> Result<ServiceClaims, TokenError> {
    decode::<ServiceClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => TokenError::NotAServiceToken,
        _ => TokenError::Malformed,
    })
}

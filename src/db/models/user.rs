//! User model and its API projections.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Closed set of account roles. The role embedded in a bearer token drives
/// the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    /// Hash of the pending one-time code, present only during an open
    /// verification window. Cleared on successful verification.
    pub otp_hash: Option<String>,
    /// RFC 3339 expiry of the pending one-time code.
    pub otp_expiry: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Check a candidate one-time code against the pending OTP.
    ///
    /// Fails closed: returns false when no OTP is pending, when the window
    /// has expired, or when the hash does not match. Never mutates
    /// verification state; the caller decides what a valid code means for
    /// the account.
    pub fn verify_otp(&self, candidate: &str) -> bool {
        let hash = match &self.otp_hash {
            Some(h) => h,
            None => return false,
        };

        let expiry = match self
            .otp_expiry
            .as_deref()
            .and_then(|e| chrono::DateTime::parse_from_rfc3339(e).ok())
        {
            Some(e) => e.with_timezone(&chrono::Utc),
            None => return false,
        };

        if chrono::Utc::now() > expiry {
            return false;
        }

        crate::crypto::verify_otp(candidate, hash)
    }
}

/// Public projection of a user. Password and OTP material never leave the
/// database layer through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            is_verified: user.is_verified,
        }
    }
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_verified: user.is_verified,
        }
    }
}

//! Session record log entries.
//!
//! A row is appended for every successful login or email verification.
//! Records are informational: the bearer token is the authorization
//! credential, and listing queries skip rows past their expiry instead of
//! deleting them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// Denormalized for listing without a join.
    pub user_name: String,
    /// Opaque identifier handed to clients; distinct from the bearer token.
    pub session_id: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub session_id: String,
    pub created_at: String,
    pub expires_at: String,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            user_name: s.user_name,
            session_id: s.session_id,
            created_at: s.created_at,
            expires_at: s.expires_at,
        }
    }
}

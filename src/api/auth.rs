//! Authentication endpoints: registration, email verification, login, token
//! refresh and re-validation, session listing, and service-token minting.
//!
//! The verification flow is: register stores the account unverified and a
//! hashed one-time code, the plaintext code goes out by email, and
//! `verify_email` compares a candidate against the stored hash inside the
//! expiry window. Successful verification and every login also append a row
//! to the session record log; those rows are informational and never gate
//! authorization.
//!
//! Issued bearer tokens are not revocable. A password change does not
//! invalidate existing tokens; they ride out their natural expiry.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::guard::{AuthContext, JWT_COOKIE};
use super::metrics;
use super::validation::{validate_email, validate_name, validate_otp, validate_password};
use crate::crypto;
use crate::db::{Role, Session, SessionResponse, User, UserResponse};
use crate::notifications::OtpPurpose;
use crate::token;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for login and email verification: the bearer token plus the
/// opaque session identifier kept for client tracking.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub session_id: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct TokenAuthRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTokenRequest {
    pub service_name: String,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct ServiceTokenResponse {
    pub token: String,
    pub service: ServiceInfo,
}

/// Sign a bearer token for `user` with the configured secret and TTL.
fn sign_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    token::issue_user_token(
        user,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )
    .map_err(|_| ApiError::internal("Failed to sign token"))
}

/// Cookie mirroring the bearer token for browser clients.
fn auth_cookie(token: &str, retention_days: i64) -> Cookie<'static> {
    Cookie::build((JWT_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(retention_days))
        .build()
}

/// Generate a fresh one-time code for `user_id` and persist its hash and
/// expiry, overwriting any pending code. Returns the plaintext for
/// out-of-band delivery; it is never stored or logged.
async fn issue_otp(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    let otp = crypto::generate_otp(state.config.otp.length, &state.config.otp.alphabet);
    let otp_hash =
        crypto::hash_otp(&otp).map_err(|_| ApiError::internal("Failed to generate OTP"))?;
    let expiry = Utc::now() + Duration::seconds(state.config.otp.ttl_secs);

    sqlx::query("UPDATE users SET otp_hash = ?, otp_expiry = ?, updated_at = ? WHERE id = ?")
        .bind(&otp_hash)
        .bind(expiry.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&state.db)
        .await?;

    Ok(otp)
}

/// Append a session record for `user` and return its opaque identifier.
async fn record_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let session_id = crypto::generate_session_id();
    let now = Utc::now();
    let expires_at = now + Duration::days(state.config.session.retention_days);

    sqlx::query(
        "INSERT INTO sessions (id, user_id, user_name, session_id, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&user.name)
    .bind(&session_id)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(session_id)
}

async fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&state.db)
        .await?;
    Ok(user)
}

/// Register a new customer account
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    errors.finish()?;

    if find_user_by_email(&state, &req.email).await?.is_some() {
        return Err(ApiError::duplicate("User already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = crypto::hash_password(&req.password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.email)
    .bind(&password_hash)
    .bind(Role::Customer)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let otp = issue_otp(&state, &user.id).await?;
    state
        .mailer
        .send_otp_email(&user.email, &user.name, &otp, OtpPurpose::Registration)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to send verification email");
            ApiError::upstream("Failed to send verification email")
        })?;

    metrics::record_registration();
    info!(email = %user.email, "User registered, verification email sent");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully. Please verify your email with the OTP sent to your email address.".to_string(),
            user: user.into(),
        }),
    ))
}

/// Verify email with a one-time code
///
/// POST /api/auth/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_otp(&req.otp, state.config.otp.length) {
        errors.add("otp", e);
    }
    errors.finish()?;

    let mut user = find_user_by_email(&state, &req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !user.verify_otp(&req.otp) {
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }

    // A verified account keeps no OTP material around
    sqlx::query(
        "UPDATE users SET is_verified = 1, otp_hash = NULL, otp_expiry = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    user.is_verified = true;
    user.otp_hash = None;
    user.otp_expiry = None;

    let token = sign_token(&state, &user)?;
    let session_id = record_session(&state, &user).await?;

    metrics::record_email_verification();
    info!(email = %user.email, "Email verified");

    let jar = jar.add(auth_cookie(&token, state.config.session.retention_days));
    Ok((
        jar,
        Json(AuthResponse {
            token,
            session_id,
            user: user.into(),
        }),
    ))
}

/// Login with email and password
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if req.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let user = match find_user_by_email(&state, &req.email).await? {
        Some(user) => user,
        None => {
            metrics::record_login_failure();
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if !crypto::verify_password(&req.password, &user.password_hash) {
        metrics::record_login_failure();
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = sign_token(&state, &user)?;
    let session_id = record_session(&state, &user).await?;

    metrics::record_login();
    info!(email = %user.email, "User logged in");

    let jar = jar.add(auth_cookie(&token, state.config.session.retention_days));
    Ok((
        jar,
        Json(AuthResponse {
            token,
            session_id,
            user: user.into(),
        }),
    ))
}

/// Get the current authenticated user
///
/// GET /api/auth/me
pub async fn me(ctx: AuthContext) -> Json<MeResponse> {
    Json(MeResponse {
        user: ctx.user.into(),
    })
}

/// Resend the verification code
///
/// POST /api/auth/resend-otp
pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    errors.finish()?;

    let user = find_user_by_email(&state, &req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_verified {
        return Err(ApiError::bad_request("Email already verified"));
    }

    // Overwrites any code still pending: one active OTP per user
    let otp = issue_otp(&state, &user.id).await?;
    state
        .mailer
        .send_otp_email(&user.email, &user.name, &otp, OtpPurpose::Registration)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to send verification email");
            ApiError::upstream("Failed to send verification email")
        })?;

    Ok(Json(MessageResponse {
        message: "OTP sent successfully. Please check your email.".to_string(),
    }))
}

/// Issue a fresh token to an already-authenticated user
///
/// POST /api/auth/refresh-token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ctx: AuthContext,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    let token = sign_token(&state, &ctx.user)?;

    let jar = jar.add(auth_cookie(&token, state.config.session.retention_days));
    Ok((
        jar,
        Json(TokenResponse {
            token,
            user: ctx.user.into(),
        }),
    ))
}

/// List the caller's session records
///
/// GET /api/auth/sessions
pub async fn sessions(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<SessionsResponse>, ApiError> {
    // Rows past their expiry are treated as pruned
    let sessions: Vec<Session> = sqlx::query_as(
        "SELECT * FROM sessions
         WHERE user_id = ? AND datetime(expires_at) > datetime('now')
         ORDER BY datetime(created_at) DESC",
    )
    .bind(&ctx.user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(SessionsResponse {
        count: sessions.len(),
        sessions: sessions.into_iter().map(SessionResponse::from).collect(),
    }))
}

/// Re-validate an existing token and reissue a fresh one
///
/// POST /api/auth/token
pub async fn authenticate_with_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<TokenAuthRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    if req.token.is_empty() {
        return Err(ApiError::bad_request("Please provide a token"));
    }

    let claims = token::decode_user_token(&req.token, &state.config.auth.jwt_secret)?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let token = sign_token(&state, &user)?;

    let jar = jar.add(auth_cookie(&token, state.config.session.retention_days));
    Ok((
        jar,
        Json(TokenResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Mint a service-to-service token
///
/// POST /api/auth/service-token (admin only)
pub async fn service_token(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<ServiceTokenRequest>,
) -> Result<Json<ServiceTokenResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let name = req.service_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Please provide a service name"));
    }

    let expires_in = req
        .expires_in
        .unwrap_or(state.config.auth.service_token_ttl_secs);
    if expires_in <= 0 {
        return Err(ApiError::bad_request("expiresIn must be a positive number of seconds"));
    }

    let permissions = req.permissions.unwrap_or_default();
    let token = token::issue_service_token(
        name,
        permissions.clone(),
        state.config.auth.service_secret(),
        expires_in,
    )
    .map_err(|_| ApiError::internal("Failed to sign token"))?;

    info!(service = %name, "Service token issued");

    Ok(Json(ServiceTokenResponse {
        token,
        service: ServiceInfo {
            name: name.to_string(),
            permissions,
            expires_in,
        },
    }))
}

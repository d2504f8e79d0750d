//! User management endpoints. Listing, lookup, vendor creation, and
//! role/profile updates are admin operations; profile and password updates
//! are available to any authenticated user.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::auth::MessageResponse;
use super::error::{ApiError, ValidationErrorBuilder};
use super::guard::AuthContext;
use super::validation::{validate_email, validate_name, validate_password};
use crate::crypto;
use crate::db::{Role, User, UserResponse};
use crate::notifications::OtpPurpose;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub count: usize,
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Serialize)]
pub struct UserBodyResponse {
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct CreateVendorRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateVendorResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

async fn find_user(state: &AppState, id: &str) -> Result<User, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    user.ok_or_else(|| ApiError::not_found(format!("User not found with id of {id}")))
}

/// List all users
///
/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<UserListResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY datetime(created_at) DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(UserListResponse {
        count: users.len(),
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// Get a single user
///
/// GET /api/users/:id (admin)
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<UserBodyResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let user = find_user(&state, &id).await?;
    Ok(Json(UserBodyResponse { user: user.into() }))
}

/// Create a vendor account with a temporary password and send its
/// verification code
///
/// POST /api/users/vendors (admin)
pub async fn create_vendor(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateVendorRequest>,
) -> Result<(StatusCode, Json<CreateVendorResponse>), ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    errors.finish()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::duplicate("User already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let temp_password = crypto::generate_temp_password();
    let password_hash = crypto::hash_password(&temp_password)
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
    .bind(Role::Vendor)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let otp = crypto::generate_otp(state.config.otp.length, &state.config.otp.alphabet);
    let otp_hash =
        crypto::hash_otp(&otp).map_err(|_| ApiError::internal("Failed to generate OTP"))?;
    let expiry = Utc::now() + chrono::Duration::seconds(state.config.otp.ttl_secs);
    sqlx::query("UPDATE users SET otp_hash = ?, otp_expiry = ? WHERE id = ?")
        .bind(&otp_hash)
        .bind(expiry.to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    state
        .mailer
        .send_otp_email(&user.email, &user.name, &otp, OtpPurpose::Vendor)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to send verification email");
            ApiError::upstream("Failed to send verification email")
        })?;

    info!(email = %user.email, "Vendor created");

    Ok((
        StatusCode::CREATED,
        Json(CreateVendorResponse {
            message: "Vendor created successfully. Verification email sent.".to_string(),
            user: user.into(),
        }),
    ))
}

/// Update a user's name, email or role
///
/// PUT /api/users/:id (admin)
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserBodyResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let user = find_user(&state, &id).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(email) = &req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    errors.finish()?;

    let name = req.name.as_deref().map(str::trim).unwrap_or(&user.name);
    let email = req.email.as_deref().unwrap_or(&user.email);
    let role = req.role.unwrap_or(user.role);

    sqlx::query("UPDATE users SET name = ?, email = ?, role = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(role)
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let user = find_user(&state, &id).await?;
    Ok(Json(UserBodyResponse { user: user.into() }))
}

/// Delete a user
///
/// DELETE /api/users/:id (admin)
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    find_user(&state, &id).await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    info!(user_id = %id, "User deleted");

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

/// Update the caller's profile
///
/// PUT /api/users/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserBodyResponse>, ApiError> {
    if let Some(name) = &req.name {
        validate_name(name).map_err(|e| ApiError::bad_request(e))?;

        sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name.trim())
            .bind(Utc::now().to_rfc3339())
            .bind(&ctx.user.id)
            .execute(&state.db)
            .await?;
    }

    let user = find_user(&state, &ctx.user.id).await?;
    Ok(Json(UserBodyResponse { user: user.into() }))
}

/// Change the caller's password
///
/// PUT /api/users/password
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !crypto::verify_password(&req.current_password, &ctx.user.password_hash) {
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    validate_password(&req.new_password).map_err(|e| ApiError::bad_request(e))?;

    // Existing bearer tokens stay valid until natural expiry; there is no
    // revocation list.
    let password_hash = crypto::hash_password(&req.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(&ctx.user.id)
        .execute(&state.db)
        .await?;

    info!(user_id = %ctx.user.id, "Password updated");

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

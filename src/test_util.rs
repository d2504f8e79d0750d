//! Shared fixtures for unit and handler tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::crypto;
use crate::db::{self, DbPool, Role, User};
use crate::AppState;

/// App state backed by an in-memory database, with a fixed signing secret so
/// tests can mint their own tokens.
pub async fn test_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.auth.jwt_secret = "test-secret".to_string();
    let pool = db::init_in_memory().await.expect("in-memory db");
    Arc::new(AppState::new(config, pool))
}

pub async fn insert_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    verified: bool,
) -> User {
    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = crypto::hash_password(password).expect("hash password");
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, is_verified, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(email)
    .bind(&password_hash)
    .bind(role)
    .bind(verified)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert user");

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
        .expect("fetch user")
}

/// Store a known OTP for a user, as the issue flow would.
pub async fn set_user_otp(pool: &DbPool, user_id: &str, code: &str, expiry: DateTime<Utc>) {
    let otp_hash = crypto::hash_otp(code).expect("hash otp");
    sqlx::query("UPDATE users SET otp_hash = ?, otp_expiry = ? WHERE id = ?")
        .bind(&otp_hash)
        .bind(expiry.to_rfc3339())
        .bind(user_id)
        .execute(pool)
        .await
        .expect("store otp");
}

pub async fn insert_product(
    pool: &DbPool,
    name: &str,
    price: f64,
    category: &str,
    stock: i64,
    vendor_id: &str,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO products (id, name, description, price, category, count_in_stock, vendor_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(format!("Description of {name}"))
    .bind(price)
    .bind(category)
    .bind(stock)
    .bind(vendor_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert product");
    id
}

//! Hashing and random-value primitives for the auth subsystem.
//!
//! Passwords and one-time codes are stored only as salted Argon2 hashes.
//! The OTP helpers are pure functions: generation, hashing, and comparison
//! know nothing about storage, so they can be tested in isolation.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a one-time code of `length` characters drawn from `alphabet`.
pub fn generate_otp(length: usize, alphabet: &str) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    let mut rng = rand::rng();
    (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}

/// Hash a one-time code for storage. The plaintext code is never persisted.
pub fn hash_otp(code: &str) -> Result<String, argon2::password_hash::Error> {
    hash_password(code)
}

/// Compare a candidate code against a stored hash.
///
/// The candidate is trimmed before comparison, matching what clients
/// paste from an email. Returns false on any mismatch or parse failure.
pub fn verify_otp(candidate: &str, hash: &str) -> bool {
    verify_password(candidate.trim(), hash)
}

/// Generate an opaque session identifier (32 random bytes, hex-encoded).
///
/// This is the audit-log identifier handed back to clients alongside the
/// bearer token; it grants no access by itself.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Generate a temporary password for admin-created vendor accounts.
pub fn generate_temp_password() -> String {
    generate_otp(8, "abcdefghijklmnopqrstuvwxyz0123456789")
}

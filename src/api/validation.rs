//! Input validation for API requests.
//!
//! Validation functions return `Result<(), String>` so handlers can collect
//! per-field failures with the `ValidationErrorBuilder` from the `error`
//! module and report them all at once.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)+$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Please provide a valid email".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }

    if trimmed.len() > 50 {
        return Err("Name cannot be more than 50 characters".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }

    Ok(())
}

/// Validate a submitted one-time code against the configured length
pub fn validate_otp(otp: &str, expected_length: usize) -> Result<(), String> {
    let trimmed = otp.trim();
    if trimmed.is_empty() {
        return Err("OTP is required".to_string());
    }

    if trimmed.chars().count() != expected_length {
        return Err(format!("OTP must be {} characters", expected_length));
    }

    Ok(())
}

/// Validate a product name
pub fn validate_product_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Product name is required".to_string());
    }

    if trimmed.len() < 2 || trimmed.len() > 100 {
        return Err("Name must be between 2 and 100 characters".to_string());
    }

    Ok(())
}

/// Validate a product description
pub fn validate_product_description(description: &str) -> Result<(), String> {
    if description.is_empty() {
        return Err("Description is required".to_string());
    }

    if description.len() < 10 || description.len() > 1000 {
        return Err("Description must be between 10 and 1000 characters".to_string());
    }

    Ok(())
}

/// Validate a price-like amount (price, tax, shipping, total)
pub fn validate_amount(amount: f64, field_name: &str) -> Result<(), String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("{} must be a non-negative number", field_name));
    }

    Ok(())
}

/// Validate a stock count
pub fn validate_stock(count: i64) -> Result<(), String> {
    if count < 0 {
        return Err("Count in stock must be a non-negative number".to_string());
    }

    Ok(())
}

/// Validate an ordered quantity
pub fn validate_qty(qty: i64) -> Result<(), String> {
    if qty < 1 {
        return Err("Quantity must be at least 1".to_string());
    }

    Ok(())
}

/// Clamp pagination parameters: page >= 1, 1 <= limit <= 100.
pub fn validate_pagination(page: u32, limit: u32) -> Result<(), String> {
    if page < 1 {
        return Err("Page must be a positive integer".to_string());
    }

    if limit < 1 || limit > 100 {
        return Err("Limit must be between 1 and 100".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("user.name+tag@sub.example.co").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
        assert!(validate_email("two words@example.com").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("A B").is_ok());
        assert!(validate_name("A").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret1").is_ok());

        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_otp() {
        assert!(validate_otp("482913", 6).is_ok());
        assert!(validate_otp(" 482913 ", 6).is_ok());

        assert!(validate_otp("", 6).is_err());
        assert!(validate_otp("12345", 6).is_err());
        assert!(validate_otp("1234567", 6).is_err());
    }

    #[test]
    fn test_validate_product_fields() {
        assert!(validate_product_name("Mechanical Keyboard").is_ok());
        assert!(validate_product_name("x").is_err());

        assert!(validate_product_description("A decent keyboard.").is_ok());
        assert!(validate_product_description("too short").is_err());

        assert!(validate_amount(19.99, "Price").is_ok());
        assert!(validate_amount(0.0, "Price").is_ok());
        assert!(validate_amount(-1.0, "Price").is_err());
        assert!(validate_amount(f64::NAN, "Price").is_err());

        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-1).is_err());

        assert!(validate_qty(1).is_ok());
        assert!(validate_qty(0).is_err());
    }

    #[test]
    fn test_validate_pagination() {
        assert!(validate_pagination(1, 10).is_ok());
        assert!(validate_pagination(1, 100).is_ok());

        assert!(validate_pagination(0, 10).is_err());
        assert!(validate_pagination(1, 0).is_err());
        assert!(validate_pagination(1, 101).is_err());
    }
}

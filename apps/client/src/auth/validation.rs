//! Local form checks. Everything here runs before a request is built, so a
//! failure costs no network round-trip.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ClientError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const RESET_CODE_LEN: usize = 6;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"));

pub fn validate_email(email: &str) -> Result<(), ClientError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ClientError::Validation(
            "Please enter your email address".to_string(),
        ));
    }
    if !EMAIL_SHAPE.is_match(email) {
        return Err(ClientError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ClientError> {
    if password.is_empty() {
        return Err(ClientError::Validation("Password is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Rules for a password being set (registration, reset): length plus mixed
/// case and a digit.
pub fn validate_new_password(password: &str) -> Result<(), ClientError> {
    validate_password(password)?;
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(ClientError::Validation(
            "Password must contain uppercase, lowercase, and number".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), ClientError> {
    if confirmation.is_empty() {
        return Err(ClientError::Validation(
            "Please confirm your password".to_string(),
        ));
    }
    if password != confirmation {
        return Err(ClientError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

pub fn validate_reset_code(code: &str) -> Result<(), ClientError> {
    let code = code.trim();
    if code.len() != RESET_CODE_LEN {
        return Err(ClientError::Validation(format!(
            "Please enter the complete {RESET_CODE_LEN}-digit code"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClientError::Validation(format!(
            "Please enter a valid {RESET_CODE_LEN}-digit code"
        )));
    }
    Ok(())
}

/// Fails with "`<label>` is required" for blank values.
pub fn require(label: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        Err(ClientError::Validation(format!("{label} is required")))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl PasswordStrength {
    pub fn label(&self) -> &'static str {
        match self {
            PasswordStrength::Weak => "Weak",
            PasswordStrength::Fair => "Fair",
            PasswordStrength::Good => "Good",
            PasswordStrength::Strong => "Strong",
        }
    }
}

/// Scores five checks: length, lowercase, uppercase, digit, symbol.
pub fn password_strength(password: &str) -> PasswordStrength {
    let checks = [
        password.chars().count() >= MIN_PASSWORD_LEN,
        password.chars().any(|c| c.is_lowercase()),
        password.chars().any(|c| c.is_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    match checks.iter().filter(|c| **c).count() {
        0..=2 => PasswordStrength::Weak,
        3 => PasswordStrength::Fair,
        4 => PasswordStrength::Good,
        _ => PasswordStrength::Strong,
    }
}

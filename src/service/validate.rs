//! Input checks that run before anything touches storage.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)+$")
        .unwrap()
});

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), AppError> {
    required("Email", value)?;
    if !EMAIL_RE.is_match(value) {
        return Err(AppError::Validation("Email is not valid".to_string()));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), AppError> {
    required("Password", value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Lower-case DNS name with at least two labels.
pub fn domain(value: &str) -> Result<(), AppError> {
    required("Domain", value)?;
    if value.len() > 253 || !DOMAIN_RE.is_match(value) {
        return Err(AppError::Validation("Domain is not valid".to_string()));
    }
    Ok(())
}

pub fn role_name(value: &str) -> Result<(), AppError> {
    required("Role name", value)?;
    if value.len() > 64 {
        return Err(AppError::Validation(
            "Role name must be at most 64 characters".to_string(),
        ));
    }
    Ok(())
}

/// Emails compare case-insensitively; store them folded.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

//! Input validation for public submissions.
//!
//! This module provides validation functions for the fields accepted from
//! untrusted callers: application and contact form submissions, and the
//! public license verification code.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref LICENSE_CODE_REGEX: Regex = Regex::new(r"^[A-Z0-9]+(-[A-Z0-9]+){0,7}$").unwrap();
    static ref CATEGORY_REGEX: Regex = Regex::new(r"^[1-9][0-9]?$").unwrap();
    static ref TXID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]{6,128}$").unwrap();
}

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for crate::errors::SyncError {
    fn from(e: ValidationError) -> Self {
        crate::errors::SyncError::ValidationError(e.to_string())
    }
}

/// Validate an email address.
///
/// Intentionally permissive: one `@`, a non-empty local part, and a domain
/// with at least one dot.
///
/// # Example
/// ```
/// use certsync::validation::validate_email;
///
/// assert!(validate_email("trader@example.com", "email").is_ok());
/// assert!(validate_email("not-an-email", "email").is_err());
/// ```
pub fn validate_email(value: &str, field_name: &str) -> ValidationResult<()> {
    if EMAIL_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid email address".to_string(),
        })
    }
}

/// Validate a public license verification code.
///
/// Codes are uppercase alphanumeric segments joined by hyphens, 4-64
/// characters total, e.g. `CTL-2025-8F3A`.
///
/// # Example
/// ```
/// use certsync::validation::validate_license_code;
///
/// assert!(validate_license_code("CTL-2025-8F3A", "license_code").is_ok());
/// assert!(validate_license_code("x", "license_code").is_err());
/// ```
pub fn validate_license_code(value: &str, field_name: &str) -> ValidationResult<()> {
    if (4..=64).contains(&value.len()) && LICENSE_CODE_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid license code format (expected: uppercase segments, e.g. CTL-2025-8F3A)"
                .to_string(),
        })
    }
}

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use certsync::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "cannot be empty".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.len();
    if len < min {
        Err(ValidationError {
            field: field_name.to_string(),
            message: format!("must be at least {} characters", min),
        })
    } else if len > max {
        Err(ValidationError {
            field: field_name.to_string(),
            message: format!("must be at most {} characters", max),
        })
    } else {
        Ok(())
    }
}

/// Validate a license category number.
///
/// Category numbers are short digit strings ("1" through "99").
pub fn validate_category_number(value: &str, field_name: &str) -> ValidationResult<()> {
    if CATEGORY_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid category number".to_string(),
        })
    }
}

/// Validate a crypto payment transaction reference: alphanumeric, 6-128 chars.
pub fn validate_transaction_id(value: &str, field_name: &str) -> ValidationResult<()> {
    if TXID_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid transaction id (alphanumeric, 6-128 chars)".to_string(),
        })
    }
}

//! Error types shared by every simple-authentication crate.
//!
//! [`AuthError`] covers user-factory failures, persistence failures, form
//! validation, configuration problems and the HTTP-level errors raised while
//! serving admin views. Each variant maps to a status code through
//! [`AuthError::status_code`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// A validation failure, either a single message or a set of per-field messages.
///
/// Field errors are kept in a `BTreeMap` so that rendering is stable.
///
/// # Examples
///
/// ```
/// use simple_auth_core::error::ValidationError;
///
/// let err = ValidationError::new("This field is required.", "required");
/// assert_eq!(err.to_string(), "This field is required.");
///
/// let err = ValidationError::default()
///     .with_field_error("email", "A user with that email already exists.");
/// assert!(err.has_field_error("email"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// The error message for non-field errors.
    pub message: String,
    /// A short machine-readable code ("required", "invalid", "password_mismatch", ...).
    pub code: String,
    /// Per-field messages, keyed by field name.
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates a non-field validation error.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a validation error from a map of field errors.
    pub fn with_field_errors(field_errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            field_errors,
        }
    }

    /// Appends a message to the errors of `field`.
    #[must_use]
    pub fn with_field_error(
        mut self,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.add_field_error(field, message);
        self
    }

    /// Appends a message to the errors of `field` in place.
    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if `field` has at least one error.
    pub fn has_field_error(&self, field: &str) -> bool {
        self.field_errors.get(field).is_some_and(|e| !e.is_empty())
    }

    /// Returns `true` when there is neither a message nor any field error.
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.field_errors.values().all(Vec::is_empty)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            return write!(f, "{}", self.message);
        }
        let mut first = true;
        for (field, errors) in &self.field_errors {
            for error in errors {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {error}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The error type for simple-authentication.
#[derive(Error, Debug)]
pub enum AuthError {
    // ── User factory ─────────────────────────────────────────────────

    /// A required value was missing or malformed (e.g. an empty email).
    #[error("{0}")]
    InvalidValue(String),

    /// An attribute that the user record does not declare was supplied.
    #[error("'{0}' is an invalid keyword argument for User")]
    UnexpectedField(String),

    // ── Persistence ──────────────────────────────────────────────────

    /// A uniqueness or other constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// A lookup expected a record and found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A storage failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// Submitted form data failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── HTTP ─────────────────────────────────────────────────────────

    /// HTTP 400.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 403.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// HTTP 404, including URL resolution failures.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 405.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// A URL name could not be reversed.
    #[error("Reverse for '{0}' not found")]
    NoReverseMatch(String),

    /// HTTP 500.
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization of a payload failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AuthError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `BadRequest`, `ValidationError`, `InvalidValue`, `UnexpectedField` -> 400
    /// - `PermissionDenied` -> 403
    /// - `NotFound`, `DoesNotExist` -> 404
    /// - `MethodNotAllowed` -> 405
    /// - `IntegrityError` -> 409
    /// - everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_)
            | Self::ValidationError(_)
            | Self::InvalidValue(_)
            | Self::UnexpectedField(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) | Self::DoesNotExist(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::IntegrityError(_) => 409,
            Self::DatabaseError(_)
            | Self::NoReverseMatch(_)
            | Self::InternalServerError(_)
            | Self::ConfigurationError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 500,
        }
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience alias for `Result<T, AuthError>`.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This field is required.", "required");
        assert_eq!(err.to_string(), "This field is required.");
    }

    #[test]
    fn test_validation_error_display_field_errors() {
        let err = ValidationError::default()
            .with_field_error("email", "Enter a valid email address.")
            .with_field_error("password2", "The two password fields didn't match.");
        assert_eq!(
            err.to_string(),
            "email: Enter a valid email address.; password2: The two password fields didn't match."
        );
    }

    #[test]
    fn test_validation_error_is_empty() {
        assert!(ValidationError::default().is_empty());
        assert!(!ValidationError::default()
            .with_field_error("email", "x")
            .is_empty());
    }

    #[test]
    fn test_invalid_value_message_is_verbatim() {
        let err = AuthError::InvalidValue("The given email must be set.".into());
        assert_eq!(err.to_string(), "The given email must be set.");
    }

    #[test]
    fn test_unexpected_field_message() {
        let err = AuthError::UnexpectedField("nickname".into());
        assert_eq!(
            err.to_string(),
            "'nickname' is an invalid keyword argument for User"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AuthError::InvalidValue("x".into()).status_code(), 400);
        assert_eq!(AuthError::UnexpectedField("x".into()).status_code(), 400);
        assert_eq!(
            AuthError::ValidationError(ValidationError::new("x", "y")).status_code(),
            400
        );
        assert_eq!(AuthError::PermissionDenied("x".into()).status_code(), 403);
        assert_eq!(AuthError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AuthError::DoesNotExist("x".into()).status_code(), 404);
        assert_eq!(AuthError::MethodNotAllowed("x".into()).status_code(), 405);
        assert_eq!(AuthError::IntegrityError("x".into()).status_code(), 409);
        assert_eq!(AuthError::DatabaseError("x".into()).status_code(), 500);
        assert_eq!(AuthError::NoReverseMatch("x".into()).status_code(), 500);
        assert_eq!(AuthError::ConfigurationError("x".into()).status_code(), 500);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: AuthError = io_err.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("file missing"));
    }
}

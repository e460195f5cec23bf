//! Error types for Redress.

use serde::Serialize;
use thiserror::Error;

/// A single rejected field in a request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Write-time validation failure, carrying every offending field
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("Validation failed")]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Merge another failure into this one
    pub fn absorb(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// First message, used as the headline of single-field failures
    pub fn summary(&self) -> &str {
        self.errors
            .first()
            .map(|e| e.message.as_str())
            .unwrap_or("Validation failed")
    }

    /// `Ok(value)` when no field was rejected
    pub fn or_ok<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authorized, no token")]
    MissingToken,

    #[error("Not authorized, token malformed")]
    MalformedToken,

    #[error("Not authorized, token signature invalid")]
    InvalidSignature,

    #[error("Not authorized, token expired")]
    Expired,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account has been deactivated")]
    AccountDisabled,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("Not authorized, user no longer exists")]
    UnknownUser,

    #[error("Credential hash error: {0}")]
    Hash(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Concurrent update: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

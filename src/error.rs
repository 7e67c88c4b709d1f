//! Structured error types for adapter and controller responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors
    MalformedRequest,
    InvalidCommand,
    MissingRequiredField,
    InvalidFieldValue,

    // Version errors
    VersionUnsupported,
    VersionNegotiationFailed,

    // Source errors
    SourceNotFound,
    NodeNotFound,
    PathConflict,
    ParseFailure,

    // Business rule violations reported by an adapter
    UserFacing,

    // Internal errors
    SyncFailed,
    RemoteFailure,
    IoError,
    InternalError,
}

impl ErrorCode {
    /// Whether the error is caused by the caller rather than the backing store.
    pub fn is_request_error(self) -> bool {
        matches!(
            self,
            ErrorCode::MalformedRequest
                | ErrorCode::InvalidCommand
                | ErrorCode::MissingRequiredField
                | ErrorCode::InvalidFieldValue
        )
    }
}

/// Structured error carried in failed responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Versions the responder understands; set on version mismatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<String>>,
}

impl BoardError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
            supported_versions: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, reason)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_command(name: &str) -> Self {
        Self::new(
            ErrorCode::InvalidCommand,
            format!("Invalid command: `{}`", name),
        )
    }

    pub fn unsupported_command(name: &str, adapter: &str) -> Self {
        Self::new(
            ErrorCode::InvalidCommand,
            format!("Command `{}` is not supported by the {} adapter", name, adapter),
        )
    }

    pub fn version_unsupported(version: &str, supported: Vec<String>) -> Self {
        let mut err = Self::new(
            ErrorCode::VersionUnsupported,
            format!("Unsupported protocol version: `{}`", version),
        );
        err.supported_versions = Some(supported);
        err
    }

    pub fn negotiation_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::VersionNegotiationFailed, reason)
    }

    pub fn source_not_found(source: &str) -> Self {
        Self::new(
            ErrorCode::SourceNotFound,
            format!("Source does not exist: `{}`", source),
        )
    }

    pub fn node_not_found(id: &str) -> Self {
        Self::new(ErrorCode::NodeNotFound, format!("Node not found: {}", id))
    }

    pub fn path_conflict(path: &str) -> Self {
        Self::new(
            ErrorCode::PathConflict,
            format!("Path already exists: {}", path),
        )
    }

    pub fn parse_failure(source: &str, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ParseFailure,
            format!("Could not parse {}", source),
        )
        .with_details(err.to_string())
    }

    pub fn user_facing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UserFacing, message)
    }

    pub fn column_not_found(id: &str) -> Self {
        Self::user_facing(format!("Column with the ID {} not found", id))
    }

    pub fn sync_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::SyncFailed, reason)
    }

    pub fn remote(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RemoteFailure, err.to_string())
    }

    pub fn io(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::IoError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details {
            Some(ref details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<std::io::Error> for BoardError {
    fn from(err: std::io::Error) -> Self {
        BoardError::io(err)
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for BoardError {
    fn from(err: anyhow::Error) -> Self {
        // Try to downcast to BoardError first
        match err.downcast::<BoardError>() {
            Ok(board_err) => board_err,
            Err(err) => BoardError::internal(err),
        }
    }
}

/// Result type for adapter and controller operations.
pub type BoardResult<T> = std::result::Result<T, BoardError>;

//! Error types for quill operations.
//!
//! Every fallible operation in the crate returns [`QuillResult`]. Variants carry a
//! structured [`ErrorCode`] so callers (the HTTP layer in particular) can map
//! failures without matching on message text.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for quill operations.
pub type QuillResult<T> = Result<T, QuillError>;

/// Main error type for all quill operations.
#[derive(Error, Debug)]
pub enum QuillError {
    /// An entity type was registered for revision tracking twice.
    #[error("Entity type already registered for revisions: {entity_type}")]
    AlreadyRegistered { entity_type: String },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
    },

    /// Record not found.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_type: Option<String>,
        entity_id: Option<String>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound mail could not be built or delivered.
    #[error("Mail error: {message}")]
    Mail { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValInvalidFormat,
    ValCommentsClosed,

    // Records (REC_xxx)
    RecNotFound,
    RecDuplicate,

    // Revisions (REV_xxx)
    RevAlreadyRegistered,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Mail (MAIL_xxx)
    MailInvalidAddress,
    MailBuildFailed,
    MailDeliveryFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidTimestamp,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValInvalidFormat => "VAL_003",
            ErrorCode::ValCommentsClosed => "VAL_004",
            ErrorCode::RecNotFound => "REC_001",
            ErrorCode::RecDuplicate => "REC_002",
            ErrorCode::RevAlreadyRegistered => "REV_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::MailInvalidAddress => "MAIL_001",
            ErrorCode::MailBuildFailed => "MAIL_002",
            ErrorCode::MailDeliveryFailed => "MAIL_003",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidTimestamp => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl QuillError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
        }
    }

    /// Create a validation error pointing at a single field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut details = HashMap::new();
        details.insert(field.to_string(), message.clone());
        Self::Validation {
            message,
            code: ErrorCode::ValInvalidFormat,
            details,
        }
    }

    /// Create a missing-field validation error.
    pub fn missing_field(field: &str) -> Self {
        let mut details = HashMap::new();
        details.insert(field.to_string(), "required".to_string());
        Self::Validation {
            message: format!("'{}' is required", field),
            code: ErrorCode::ValMissingField,
            details,
        }
    }

    /// Create a not found error for a typed record.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl ToString) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.to_string();
        Self::NotFound {
            message: format!("{} with id '{}' not found", entity_type, entity_id),
            code: ErrorCode::RecNotFound,
            entity_type: Some(entity_type),
            entity_id: Some(entity_id),
        }
    }

    /// Create a not found error from a free-form lookup description.
    pub fn not_found_message(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: ErrorCode::RecNotFound,
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a duplicate registration error.
    pub fn already_registered(entity_type: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            entity_type: entity_type.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a timestamp parse error.
    pub fn timestamp(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidTimestamp,
        }
    }

    /// Create a mail error with a specific code.
    pub fn mail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Mail {
            message: message.into(),
            code,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyRegistered { .. } => ErrorCode::RevAlreadyRegistered,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Mail { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error is a "no such row" lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for QuillError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ErrorCode::RecDuplicate
            }
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::CannotOpen =>
            {
                ErrorCode::DbConnectionFailed
            }
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Database {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_registered_error() {
        let err = QuillError::already_registered("blog.post");
        assert_eq!(err.code(), ErrorCode::RevAlreadyRegistered);
        assert!(err.to_string().contains("blog.post"));
    }

    #[test]
    fn test_not_found_error() {
        let err = QuillError::not_found("blog.post", 42);
        assert_eq!(err.code(), ErrorCode::RecNotFound);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("'42'"));
    }

    #[test]
    fn test_missing_field_details() {
        match QuillError::missing_field("title") {
            QuillError::Validation { code, details, .. } => {
                assert_eq!(code, ErrorCode::ValMissingField);
                assert_eq!(details.get("title").map(String::as_str), Some("required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::RevAlreadyRegistered.as_str(), "REV_001");
        assert_eq!(ErrorCode::RecNotFound.as_str(), "REC_001");
    }
}

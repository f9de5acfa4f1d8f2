//! Error types module
//!
//! This module provides the core error types used throughout Heirloom.
//! Storage, record store, merge, and extraction failures are all unified under the
//! `AppError` enum; each infrastructure crate converts its own error into it.

use std::io;

use crate::keys::KeyError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for conflicts and caller mistakes worth noticing
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Coarse failure classes surfaced to callers of the pipeline and the publish coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No eligible parts, or no draft/letter at the requested address
    NotFound,
    /// Publish target already has a current letter and no edit was requested
    Conflict,
    /// Caller supplied something unusable
    InvalidInput,
    /// Object store, record store, or extraction service failure
    UpstreamFailure,
    Internal,
}

/// Metadata for error reporting - defines how an error should be presented
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "STORAGE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the operator
    fn suggested_action(&self) -> Option<&'static str>;

    /// Operator-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (&'static str, bool, Option<&'static str>, bool, LogLevel) {
    match err {
        AppError::NotFound(_) => (
            "NOT_FOUND",
            false,
            Some("Verify the upload ID or letter date exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Conflict(_) => (
            "CONFLICT",
            false,
            Some("Pick another date or publish again as an edit"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            "INVALID_INPUT",
            false,
            Some("Check parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Storage(_) => (
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Store(_) => (
            "RECORD_STORE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Merge(_) => (
            "MERGE_ERROR",
            false,
            Some("Check the uploaded files and upload them again"),
            false,
            LogLevel::Warn,
        ),
        AppError::Extraction(_) => (
            "EXTRACTION_ERROR",
            true,
            Some("Retry the upload once the extraction service is reachable"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error output
    pub fn error_type(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Storage(_) => "Storage",
            AppError::Store(_) => "Store",
            AppError::Merge(_) => "Merge",
            AppError::Extraction(_) => "Extraction",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::Conflict(_) => ErrorCategory::Conflict,
            AppError::InvalidInput(_) => ErrorCategory::InvalidInput,
            AppError::Storage(_) | AppError::Store(_) | AppError::Extraction(_) => {
                ErrorCategory::UpstreamFailure
            }
            AppError::Merge(_) | AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).2
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Conflict(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Storage(_) => "Failed to access object storage".to_string(),
            AppError::Store(_) => "Failed to access record store".to_string(),
            AppError::Merge(ref msg) => msg.clone(),
            AppError::Extraction(_) => "Extraction service failed".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
            AppError::InternalWithSource { .. } => "Internal error".to_string(),
        }
    }
}

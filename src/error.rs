//! Error types for sitedb
//!
//! Every fallible operation in the core returns [`Result`]. Absent documents
//! are not errors: lookups return `Option` and deletes return `bool`.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sitedb operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    #[error("Storage failure: {message}")]
    Storage { message: String },

    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git operation failed: {message}")]
    GitError {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("Failed to serialize document '{id}': {message}")]
    Serialize { id: String, message: String },

    // ==========================================================================
    // Document Errors
    // ==========================================================================
    #[error("Document '{id}' has type '{existing}' and cannot become '{attempted}'")]
    ImmutableType {
        id: String,
        existing: String,
        attempted: String,
    },

    #[error("Document '{id}' of type '{doc_type}' is append-only and cannot be rewritten")]
    AppendOnly { id: String, doc_type: String },

    #[error("Type '{doc_type}' allows a single document and '{existing}' already exists")]
    SingletonExists { doc_type: String, existing: String },

    #[error("Field '{field}' is reserved for the document envelope")]
    ReservedField { field: String },

    #[error("Invalid contact request: {field} {reason}")]
    InvalidContactRequest { field: &'static str, reason: &'static str },

    // ==========================================================================
    // Identifier Errors
    // ==========================================================================
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Reserved name '{name}' cannot be used")]
    ReservedName { name: String },

    // ==========================================================================
    // Generation Pipeline Errors
    // ==========================================================================
    #[error("Generation service error: {message}")]
    GenerationService { message: String },

    #[error("Failed to parse generated payload: {message}")]
    Parse { message: String },

    #[error("Generated payload failed validation: {message}")]
    Validation { message: String },

    #[error("Generation was cancelled before the service responded")]
    Cancelled,

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

/// Result type alias for sitedb operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage {
            message: err.to_string(),
        }
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::GitError {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Storage {
            message: format!("YAML: {}", err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Error::GenerationService { message }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        match err {
            crate::validation::ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidIdentifier {
                    kind: "identifier",
                    value,
                    reason,
                }
            }
            crate::validation::ValidationError::TooLong(value, _max) => Error::InvalidIdentifier {
                kind: "identifier",
                value,
                reason: "exceeds maximum length",
            },
            crate::validation::ValidationError::Empty => Error::InvalidIdentifier {
                kind: "identifier",
                value: String::new(),
                reason: "cannot be empty",
            },
            crate::validation::ValidationError::Reserved(name) => Error::ReservedName { name },
        }
    }
}

impl From<crate::schema::ValidationError> for Error {
    fn from(err: crate::schema::ValidationError) -> Self {
        Error::Validation {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::InvalidIdentifier { .. } => {
                Some("Use only letters, numbers, underscores, and hyphens")
            }
            Error::AppendOnly { .. } => Some("Create a new document instead of rewriting this one"),
            Error::ImmutableType { .. } => Some("Create a new document with the desired type"),
            Error::SingletonExists { .. } => Some("Update the existing document by its id"),
            Error::GenerationService { .. } => {
                Some("Check the generation endpoint, model and API key in .sitedb/config.yaml")
            }
            Error::Validation { .. } | Error::Parse { .. } => {
                Some("The service returned unexpected output; try the request again")
            }
            Error::InvalidContactRequest { .. } => Some("Fill in every field of the contact form"),
            _ => None,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidIdentifier { .. }
                | Error::ReservedName { .. }
                | Error::ReservedField { .. }
                | Error::InvalidContactRequest { .. }
                | Error::Parse { .. }
                | Error::Validation { .. }
                | Error::Cancelled
        )
    }

    /// Returns true for I/O, serialization and history failures
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. }
                | Error::FileReadError { .. }
                | Error::FileWriteError { .. }
                | Error::GitError { .. }
                | Error::Serialize { .. }
        )
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AppendOnly {
            id: "abc".to_string(),
            doc_type: "testimonial".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Document 'abc' of type 'testimonial' is append-only and cannot be rewritten"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::GenerationService {
            message: "503".to_string(),
        };
        assert!(err.suggestion().is_some());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_singleton_display() {
        let err = Error::SingletonExists {
            doc_type: "business-info".to_string(),
            existing: "p1".to_string(),
        };
        assert!(err.to_string().contains("'p1' already exists"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_io_error_is_storage() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(err.is_storage());
    }
}

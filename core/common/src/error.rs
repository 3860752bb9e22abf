//! Common error types for file storage operations.

use thiserror::Error;

/// Top-level error type for file storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Backend configuration is unusable (credentials, durations, options).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A blob key, container name or tag broke a provider naming rule.
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// Content was refused by the content validation engine.
    #[error("File '{name}' with content type '{content_type}' is not allowed")]
    ContentRejected {
        /// Name of the rejected file.
        name: String,
        /// Declared content type of the rejected file.
        content_type: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The storage backend failed while performing an operation.
    #[error("Backend error during {operation}: {message}")]
    Backend {
        /// The operation that failed, e.g. "create container".
        operation: String,
        /// Backend-provided failure description.
        message: String,
    },

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a backend error for the named operation.
    pub fn backend(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Violations of the provider naming rules.
///
/// Each variant identifies exactly one rule so callers can report which
/// constraint a name broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("Blob name cannot be empty")]
    EmptyBlobName,

    #[error("Blob name must be between 1 and 1024 characters in length (got {0})")]
    BlobNameLength(usize),

    #[error("Blob name must not end with '.' or '/'")]
    BlobNameTrailingCharacter,

    #[error("The number of '/' delimited segments cannot exceed 254 (got {0})")]
    TooManySegments(usize),

    #[error("No path segment ('/' delimited segment) can end in a '.' (segment '{0}')")]
    SegmentEndsWithDot(String),

    #[error("Container name cannot be empty")]
    EmptyContainerName,

    #[error("Container name must be between 3 and 63 characters in length (got {0})")]
    ContainerNameLength(usize),

    #[error("Container name can only contain lowercase letters, numbers or hyphens")]
    ContainerNameCharacters,

    #[error("Container name must start and end with a number or letter")]
    ContainerNameBoundary,

    #[error("Container name cannot contain multiple hyphens in sequence")]
    ContainerNameConsecutiveHyphens,

    #[error("At most {max} tags can be set on an object (got {count})")]
    TooManyTags { count: usize, max: usize },

    #[error("Tag key must be between 1 and 128 characters in length (got '{0}')")]
    TagKeyLength(String),

    #[error("Tag value for '{0}' cannot exceed 256 characters")]
    TagValueLength(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the memory engine.
///
/// The first group of variants maps one-to-one onto the machine-readable
/// error kinds carried in tool responses. The remaining variants are
/// infrastructure failures that surface on the wire as `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid retrieval trigger: {0}")]
    InvalidTrigger(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden content: {0}")]
    ForbiddenContent(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Deadline exceeded")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable kind tag carried in tool error envelopes.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::InvalidTrigger(_) => "InvalidTrigger",
            Error::NotFound(_) => "NotFound",
            Error::ForbiddenContent(_) => "ForbiddenContent",
            Error::UploadRejected(_) => "UploadRejected",
            Error::Conflict(_) => "Conflict",
            Error::DependencyUnavailable(_) => "DependencyUnavailable",
            Error::Timeout => "Timeout",
            Error::Internal(_) | Error::Storage(_) | Error::Serialization(_) | Error::Io(_) => {
                "Internal"
            }
        }
    }

    /// Check if this error is recoverable (can retry with backoff)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::Timeout | Error::DependencyUnavailable(_)
        )
    }

    /// Helper for project lookups.
    pub(crate) fn project_not_found(project_id: &str) -> Self {
        Error::NotFound(format!("Project not found: {project_id}"))
    }

    /// Helper for path-shaped storage failures.
    pub(crate) fn storage_at(path: &PathBuf, err: impl std::fmt::Display) -> Self {
        Error::Storage(format!("{}: {err}", path.display()))
    }
}

//! Engine-wide error taxonomy.

/// Errors surfaced by the archive engine.
///
/// Duplicate-write races are deliberately absent: re-archiving an item
/// under an existing stable id is absorbed as success, never reported
/// as a conflict.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Backend I/O failure. Surfaced to the caller, never retried by
    /// the engine itself.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed criteria, unparsable cursor, unknown preference preset
    /// or a missing required filter.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Preference change rejected due to a server-mandated override.
    #[error("not allowed by server policy: {0}")]
    PolicyViolation(String),

    /// A referenced item or cursor position does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The router could not construct a store for a domain.
    #[error("repository configuration error: {0}")]
    Configuration(String),
}

impl ArchiveError {
    /// Stable identifier for protocol collaborators that need to map an
    /// error onto a specific rejection response.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::StorageUnavailable(_) => "storage-unavailable",
            ArchiveError::InvalidRequest(_) => "invalid-request",
            ArchiveError::PolicyViolation(_) => "policy-violation",
            ArchiveError::NotFound(_) => "not-found",
            ArchiveError::Configuration(_) => "configuration-error",
        }
    }
}

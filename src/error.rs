use thiserror::Error;

/// Error types for Locus operations
#[derive(Debug, Error)]
pub enum LocusError {
    /// A rectangle or point with inconsistent geometry (min > max on an
    /// axis, too few dimensions, or a dimension mismatch with the index)
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Insert of a record identifier that is already indexed
    #[error("duplicate record identifier")]
    DuplicateIdentifier,

    /// Remove or lookup of a record identifier that is not indexed
    #[error("record identifier not found")]
    NotFound,

    /// Configuration that cannot produce a legal tree
    #[error("capacity violation: {0}")]
    CapacityViolation(String),

    /// Cross-index or tree invariant check failed; the index refuses
    /// further mutation until rebuilt
    #[error("structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// A plan step failed mid-execution; partial results were discarded
    #[error("execution aborted: {0}")]
    ExecutionAborted(String),

    /// A lock on the index state was poisoned
    #[error("failed to acquire index lock")]
    Lock,
}

/// Result type alias for Locus operations
pub type Result<T> = std::result::Result<T, LocusError>;

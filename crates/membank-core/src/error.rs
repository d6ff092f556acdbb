use thiserror::Error;

/// Typed failure taxonomy for the retrieval core.
///
/// Cache misses and sections that segment to zero chunks are not errors;
/// the first is a normal control-flow branch, the second is surfaced as a
/// skip count on the segmenter output.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// The embedding backend cannot be reached or loaded. Fatal to the
    /// operation that needed it; there is no fallback vector.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The persisted index failed validation on load. The only recovery is
    /// a full rebuild from the documents.
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;

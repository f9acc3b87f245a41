//! Caller-facing error taxonomy.

use crate::models::DocumentId;

/// Every caller-facing operation either succeeds or fails with one of these.
///
/// Failures that happen after an upload is accepted are recorded on the
/// document (status `failed`) instead of being returned from `submit`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Raised after the retry budget is exhausted or on a permanent provider error.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Entity recognition failed. The anonymizer absorbs this and degrades
    /// to pattern-only redaction; it never reaches a caller.
    #[error("anonymization failed: {0}")]
    Anonymization(String),

    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("document {0} belongs to a different owner")]
    Authorization(DocumentId),

    /// Backend fault (database, blob storage, task join).
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

use crate::value::ValueType;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The tenant identifier was absent or empty. Always fatal to the call.
    #[error("eName is required")]
    MissingTenant,

    /// A field value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A pagination cursor could not be decoded.
    #[error("invalid cursor")]
    InvalidCursor,

    /// Mutually exclusive pagination arguments were combined.
    #[error("invalid pagination: {0}")]
    InvalidPagination(&'static str),

    /// A payload was not a JSON object.
    #[error("payload must be an object")]
    InvalidPayload,

    /// Post-copy verification between instances failed.
    #[error("copy verification failed: {0}")]
    CopyVerification(String),
}

/// Errors from the value codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The runtime value has no stored representation (e.g. JSON null).
    #[error("unsupported value: {0}")]
    Unsupported(&'static str),

    /// The stored value does not match the recorded value type.
    #[error("stored value does not match type {expected}")]
    TypeMismatch { expected: ValueType },

    /// A stored date string was not valid RFC 3339.
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

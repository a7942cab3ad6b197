use thiserror::Error;

use palisade_store::StoreError;

/// Errors from the binding-document subsystem.
#[derive(Debug, Error)]
pub enum BindingError {
    /// No binding document exists at the given id for this tenant.
    #[error("binding document not found")]
    NotFound,

    /// The meta-envelope at the given id is not a binding document.
    #[error("not a binding document")]
    NotABindingDocument,

    /// The signer has already signed this document.
    #[error("signer {0:?} has already signed this binding document")]
    DuplicateSigner(String),

    /// The request shape is malformed for the declared document type.
    #[error("validation error: {0}")]
    Validation(String),

    /// A signature failed verification.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// A stored document could not be parsed back from its envelope form.
    #[error("malformed binding document: {0}")]
    Malformed(String),

    /// A signer's key set could not be fetched.
    #[error("key fetch failed: {0}")]
    KeyFetch(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

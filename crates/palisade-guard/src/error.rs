use thiserror::Error;

use palisade_store::StoreError;

/// Errors that can occur during authentication and authorization.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The tenant identifier was absent or empty.
    #[error("eName is required for access control")]
    MissingTenant,

    /// The record exists under the caller's tenant but the caller is not in
    /// its ACL. Only surfaced after existence is confirmed.
    #[error("access denied")]
    AccessDenied,

    /// A bearer token failed verification.
    #[error("token rejected: {0}")]
    TokenRejected(String),

    /// The directory service could not be reached or answered malformed.
    #[error("directory error: {0}")]
    Directory(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

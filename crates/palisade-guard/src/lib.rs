//! # Palisade Guard
//!
//! Authentication and authorization for vault operations.
//!
//! Two caller populations reach the vault: peer platforms making
//! server-to-server calls with a directory-issued bearer token, and end
//! users identified by the key id of their own signed token. Platform
//! callers are trusted for record-scoped operations once their token
//! verifies against the directory's signing keys; everyone else is checked
//! against the record's ACL.
//!
//! The store never answers "forbidden" — it only knows "not found". This
//! crate owns the deny-vs-not-found distinction and hands resolvers an
//! explicit [`RecordDecision`] instead of wrapping them in middleware.

pub mod context;
pub mod directory;
pub mod error;
pub mod guard;
pub mod token;

pub use context::CallContext;
pub use directory::{Directory, HttpDirectory, Jwk, Jwks, StaticDirectory};
pub use error::GuardError;
pub use guard::{AccessCheck, AccessGuard, RecordDecision};
pub use token::{identity_from_bearer, PlatformClaims, TokenVerifier};

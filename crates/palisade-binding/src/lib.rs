//! # Palisade Binding
//!
//! Binding documents: cryptographically signed claims that bind a tenant to
//! an identity attribute — an identity document, a photograph, a social
//! connection, or a self-declaration.
//!
//! A binding document starts with exactly one signature (the owner's) and
//! may receive additional counterparty signatures; a given signer may sign
//! at most once. Signatures are computed over the canonical byte form of
//! `{subject, type, data}` — recursively key-sorted JSON — so independent
//! implementations agree on the signed bytes.
//!
//! Documents are stored as meta-envelopes under a reserved ontology with an
//! ACL scoped to the subject.

pub mod canonical;
pub mod document;
pub mod error;
pub mod service;
pub mod verify;

pub use canonical::{canonical_document_bytes, compute_binding_document_hash};
pub use document::{
    BindingDocument, BindingDocumentData, BindingDocumentType, BindingSignature,
    BINDING_DOCUMENT_ONTOLOGY,
};
pub use error::BindingError;
pub use service::{BindingDocumentService, BindingRecord, CreateBindingDocument};
pub use verify::{HttpKeyFetcher, KeyFetcher, StaticKeyFetcher};

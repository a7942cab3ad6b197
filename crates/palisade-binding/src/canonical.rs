//! Canonical document bytes and hash.
//!
//! Cross-implementation signature verification only works if client and
//! server serialize the signable form identically. The canonical form is
//! the key-sorted JSON of `{subject, type, data}` — signatures excluded —
//! and the document hash is the SHA-256 of those UTF-8 bytes, hex-encoded.

use serde_json::{json, Value as Json};

use palisade_store::canon::{canonical_json, sha256_hex};

use crate::document::{BindingDocumentData, BindingDocumentType};

/// The UTF-8 bytes a binding-document signature is computed over.
pub fn canonical_document_bytes(
    subject: &str,
    doc_type: BindingDocumentType,
    data: &BindingDocumentData,
) -> Vec<u8> {
    let signable: Json = json!({
        "subject": subject,
        "type": doc_type.as_str(),
        "data": data.to_json(),
    });
    canonical_json(&signable).into_bytes()
}

/// SHA-256 hex digest of the canonical document form.
pub fn compute_binding_document_hash(
    subject: &str,
    doc_type: BindingDocumentType,
    data: &BindingDocumentData,
) -> String {
    sha256_hex(&canonical_document_bytes(subject, doc_type, data))
}

//! Resolver inputs, views, and payload-and-errors mutation results.
//!
//! Views never carry ACLs — access control is a write-time concern and is
//! never echoed back to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use palisade_binding::{BindingRecord, BindingSignature};
use palisade_store::{Envelope, MetaEnvelope};

/// Machine-readable error codes carried by [`UserError`].
pub mod codes {
    pub const MISSING_ENAME: &str = "MISSING_ENAME";
    pub const CREATE_FAILED: &str = "CREATE_FAILED";
    pub const UPDATE_FAILED: &str = "UPDATE_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const DUPLICATE_SIGNER: &str = "DUPLICATE_SIGNER";
}

/// A user-facing error from a mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl UserError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self { field: None, message: message.into(), code: Some(code.into()) }
    }

    pub fn on_field(code: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

/// A meta-envelope as clients see it: envelopes plus the reassembled
/// payload, no ACL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaEnvelopeView {
    pub id: String,
    pub ontology: String,
    pub envelopes: Vec<Envelope>,
    pub parsed: Json,
}

impl From<MetaEnvelope> for MetaEnvelopeView {
    fn from(meta: MetaEnvelope) -> Self {
        let parsed = meta.payload_json();
        Self { id: meta.id, ontology: meta.ontology, envelopes: meta.envelopes, parsed }
    }
}

/// Input for create/update mutations.
#[derive(Clone, Debug, Deserialize)]
pub struct MetaEnvelopeInput {
    pub ontology: String,
    pub payload: Json,
    pub acl: Vec<String>,
}

/// Input for bulk create operations (e.g. migrations). A supplied id is
/// preserved; a missing id is minted.
#[derive(Clone, Debug, Deserialize)]
pub struct BulkMetaEnvelopeInput {
    pub id: Option<String>,
    pub ontology: String,
    pub payload: Json,
    pub acl: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateMetaEnvelopePayload {
    pub meta_envelope: Option<MetaEnvelopeView>,
    pub errors: Vec<UserError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateMetaEnvelopePayload {
    pub meta_envelope: Option<MetaEnvelopeView>,
    pub errors: Vec<UserError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteMetaEnvelopePayload {
    pub deleted_id: String,
    pub success: bool,
    pub errors: Vec<UserError>,
}

/// Individual result for one bulk-create input.
#[derive(Clone, Debug, Serialize)]
pub struct BulkCreateResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkCreatePayload {
    pub results: Vec<BulkCreateResult>,
    pub success_count: u32,
    pub error_count: u32,
    pub errors: Vec<UserError>,
}

/// A binding document as clients see it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BindingDocumentView {
    pub id: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub data: Json,
    pub signatures: Vec<BindingSignature>,
}

impl From<BindingRecord> for BindingDocumentView {
    fn from(record: BindingRecord) -> Self {
        Self {
            id: record.id,
            subject: record.document.subject.clone(),
            doc_type: record.document.doc_type.as_str().into(),
            data: record.document.data.to_json(),
            signatures: record.document.signatures,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateBindingDocumentPayload {
    pub binding_document: Option<BindingDocumentView>,
    pub meta_envelope_id: Option<String>,
    pub errors: Vec<UserError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateBindingSignaturePayload {
    pub binding_document: Option<BindingDocumentView>,
    pub errors: Vec<UserError>,
}

//! # Palisade Protocol
//!
//! The resolver layer: exposes the envelope store, access guard, binding
//! documents, operation log, and webhook fan-out as a query/mutation API.
//!
//! Mutations follow the payload-and-errors convention — a result object
//! carrying either the affected record or a list of [`UserError`]s, never
//! raw error text. Around every successful mutation the resolver appends a
//! best-effort operation-log entry (failures are logged and swallowed) and
//! schedules webhook fan-out to peer platforms (never awaited by the
//! response path).
//!
//! A side HTTP surface (axum) exposes the operation log, tenant public-key
//! material, and cross-instance tenant copy.

pub mod config;
pub mod error;
pub mod http;
pub mod payload;
pub mod service;
pub mod webhook;

pub use config::{VaultConfig, WebhookConfig};
pub use error::ProtocolError;
pub use http::{router, AppState, MemoryConnector, StoreConnector};
pub use payload::{
    codes, BindingDocumentView, BulkCreatePayload, BulkCreateResult, BulkMetaEnvelopeInput,
    CreateBindingDocumentPayload, CreateBindingSignaturePayload, CreateMetaEnvelopePayload,
    DeleteMetaEnvelopePayload, MetaEnvelopeInput, MetaEnvelopeView, UpdateMetaEnvelopePayload,
    UserError,
};
pub use service::VaultService;
pub use webhook::{WebhookDispatcher, WebhookPayload};

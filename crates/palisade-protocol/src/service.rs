//! The vault's resolver layer.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;

use palisade_binding::{
    BindingDocumentService, BindingDocumentType, BindingError, BindingSignature,
    CreateBindingDocument, KeyFetcher,
};
use palisade_guard::{AccessGuard, CallContext, Directory, GuardError, RecordDecision};
use palisade_store::{
    compute_envelope_hash, compute_envelope_hash_for_delete, envelope::payload_from_json,
    Connection, EnvelopeStore, MetaFilter, Operation, OperationLogAppend, OperationLogPage,
    PageArgs,
};

use crate::config::VaultConfig;
use crate::error::ProtocolError;
use crate::payload::{
    codes, BindingDocumentView, BulkCreatePayload, BulkCreateResult, BulkMetaEnvelopeInput,
    CreateBindingDocumentPayload, CreateBindingSignaturePayload, CreateMetaEnvelopePayload,
    DeleteMetaEnvelopePayload, MetaEnvelopeInput, MetaEnvelopeView, UpdateMetaEnvelopePayload,
    UserError,
};
use crate::webhook::{WebhookDispatcher, WebhookPayload};

type Result<T> = std::result::Result<T, ProtocolError>;

/// Orchestrates the store, guard, binding documents, audit log, and webhook
/// fan-out behind the query/mutation surface.
///
/// Within one mutation the store write must succeed, the audit append is
/// best-effort (failures logged, never propagated), and webhook fan-out is
/// scheduled without ever being awaited by the response path.
pub struct VaultService {
    store: Arc<dyn EnvelopeStore>,
    guard: AccessGuard,
    bindings: BindingDocumentService,
    webhooks: Arc<WebhookDispatcher>,
    config: VaultConfig,
}

impl VaultService {
    pub fn new(
        store: Arc<dyn EnvelopeStore>,
        directory: Arc<dyn Directory>,
        keys: Arc<dyn KeyFetcher>,
        config: VaultConfig,
    ) -> Self {
        let guard = AccessGuard::new(store.clone(), directory.clone());
        let bindings = BindingDocumentService::new(store.clone(), keys);
        let webhooks = Arc::new(WebhookDispatcher::new(directory, config.webhook.clone()));
        Self { store, guard, bindings, webhooks, config }
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn EnvelopeStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `None` for absent, foreign-tenant, and not-found-under-this-tenant
    /// ids alike; `AccessDenied` only when the record is confirmed to exist
    /// under the caller's tenant.
    pub async fn meta_envelope(&self, id: &str, ctx: &CallContext) -> Result<Option<MetaEnvelopeView>> {
        match self.guard.authorize_record(id, ctx, false).await? {
            RecordDecision::NotFound => Ok(None),
            RecordDecision::Denied => Err(GuardError::AccessDenied.into()),
            RecordDecision::Proceed => {
                let record = self.store.find_by_id(id, ctx.tenant()?).await?;
                Ok(record.map(MetaEnvelopeView::from))
            }
        }
    }

    /// Paginated meta-envelopes. Edges the caller may not see are filtered
    /// by the ACL rules before the page is returned.
    pub async fn meta_envelopes(
        &self,
        filter: Option<&MetaFilter>,
        page: &PageArgs,
        ctx: &CallContext,
    ) -> Result<Connection<MetaEnvelopeView>> {
        let e_name = ctx.tenant()?;
        let connection = self.store.find_paginated(e_name, filter, page).await?;
        let mut visible = Connection {
            edges: Vec::with_capacity(connection.edges.len()),
            page_info: connection.page_info,
            total_count: connection.total_count,
        };
        for edge in connection.edges {
            if self.guard.allows(&edge.node.acl, ctx) {
                visible.edges.push(palisade_store::Edge {
                    cursor: edge.cursor,
                    node: MetaEnvelopeView::from(edge.node),
                });
            }
        }
        Ok(visible)
    }

    pub async fn meta_envelopes_by_ontology(
        &self,
        ontology: &str,
        ctx: &CallContext,
    ) -> Result<Vec<MetaEnvelopeView>> {
        let e_name = ctx.tenant()?;
        let records = self.store.find_by_ontology(ontology, e_name).await?;
        Ok(self
            .guard
            .filter_collection(records, ctx)
            .into_iter()
            .map(MetaEnvelopeView::from)
            .collect())
    }

    pub async fn search_meta_envelopes(
        &self,
        ontology: &str,
        term: &str,
        ctx: &CallContext,
    ) -> Result<Vec<MetaEnvelopeView>> {
        let e_name = ctx.tenant()?;
        let records = self.store.find_by_search_term(ontology, term, e_name).await?;
        Ok(self
            .guard
            .filter_collection(records, ctx)
            .into_iter()
            .map(MetaEnvelopeView::from)
            .collect())
    }

    pub async fn operation_logs(
        &self,
        e_name: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<OperationLogPage> {
        Ok(self.store.operation_logs(e_name, cursor, limit).await?)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn create_meta_envelope(
        &self,
        input: MetaEnvelopeInput,
        ctx: &CallContext,
    ) -> CreateMetaEnvelopePayload {
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => {
                return CreateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::MISSING_ENAME, "eName header is required")],
                };
            }
        };
        let payload = match payload_from_json(&input.payload) {
            Ok(payload) => payload,
            Err(e) => {
                return CreateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::on_field(codes::CREATE_FAILED, "payload", e.to_string())],
                };
            }
        };
        let result = match self
            .store
            .store(&input.ontology, &payload, &input.acl, &e_name)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "create failed");
                return CreateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::CREATE_FAILED, e.to_string())],
                };
            }
        };

        self.record_mutation(
            Operation::Create,
            &result.meta.id,
            Some(&input.ontology),
            compute_envelope_hash(&result.meta.id, &input.ontology, &input.payload),
            &e_name,
            ctx,
        )
        .await;
        self.notify_peers(&result.meta.id, &input.ontology, input.payload.clone(), &e_name, ctx, true);

        CreateMetaEnvelopePayload {
            meta_envelope: Some(MetaEnvelopeView {
                id: result.meta.id,
                ontology: result.meta.ontology,
                envelopes: result.envelopes,
                parsed: input.payload,
            }),
            errors: Vec::new(),
        }
    }

    pub async fn update_meta_envelope(
        &self,
        id: &str,
        input: MetaEnvelopeInput,
        ctx: &CallContext,
    ) -> UpdateMetaEnvelopePayload {
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => {
                return UpdateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::MISSING_ENAME, "eName header is required")],
                };
            }
        };
        // Payload-bearing updates on absent records proceed: the store's
        // upsert semantics create the record in place.
        match self.guard.authorize_record(id, ctx, true).await {
            Ok(RecordDecision::Proceed) => {}
            Ok(_) => {
                return UpdateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::ACCESS_DENIED, "access denied")],
                };
            }
            Err(e) => {
                return UpdateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::UPDATE_FAILED, e.to_string())],
                };
            }
        }
        let payload = match payload_from_json(&input.payload) {
            Ok(payload) => payload,
            Err(e) => {
                return UpdateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::on_field(codes::UPDATE_FAILED, "payload", e.to_string())],
                };
            }
        };
        let result = match self
            .store
            .update(id, &input.ontology, &payload, &input.acl, &e_name)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, id, "update failed");
                return UpdateMetaEnvelopePayload {
                    meta_envelope: None,
                    errors: vec![UserError::new(codes::UPDATE_FAILED, e.to_string())],
                };
            }
        };

        self.record_mutation(
            Operation::Update,
            id,
            Some(&input.ontology),
            compute_envelope_hash(id, &input.ontology, &input.payload),
            &e_name,
            ctx,
        )
        .await;
        // Update-path delivery is immediate.
        self.notify_peers(id, &input.ontology, input.payload.clone(), &e_name, ctx, false);

        UpdateMetaEnvelopePayload {
            meta_envelope: Some(MetaEnvelopeView {
                id: result.meta.id,
                ontology: result.meta.ontology,
                envelopes: result.envelopes,
                parsed: input.payload,
            }),
            errors: Vec::new(),
        }
    }

    pub async fn remove_meta_envelope(&self, id: &str, ctx: &CallContext) -> DeleteMetaEnvelopePayload {
        let failure = |code: &str, message: &str| DeleteMetaEnvelopePayload {
            deleted_id: id.to_string(),
            success: false,
            errors: vec![UserError::new(code, message)],
        };
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => return failure(codes::MISSING_ENAME, "eName header is required"),
        };
        match self.guard.authorize_record(id, ctx, false).await {
            Ok(RecordDecision::Proceed) => {}
            Ok(RecordDecision::NotFound) => return failure(codes::NOT_FOUND, "meta-envelope not found"),
            Ok(RecordDecision::Denied) => return failure(codes::ACCESS_DENIED, "access denied"),
            Err(e) => return failure(codes::NOT_FOUND, &e.to_string()),
        }

        // The ontology is only available before the node is gone.
        let ontology = match self.store.find_by_id(id, &e_name).await {
            Ok(record) => record.map(|r| r.ontology),
            Err(_) => None,
        };
        if let Err(e) = self.store.delete(id, &e_name).await {
            tracing::error!(error = %e, id, "delete failed");
            return failure(codes::NOT_FOUND, &e.to_string());
        }

        self.record_mutation(
            Operation::Delete,
            id,
            ontology.as_deref(),
            compute_envelope_hash_for_delete(id),
            &e_name,
            ctx,
        )
        .await;

        DeleteMetaEnvelopePayload {
            deleted_id: id.to_string(),
            success: true,
            errors: Vec::new(),
        }
    }

    /// Update a single field's value. Returns `false` when the envelope
    /// does not resolve under the caller's tenant.
    pub async fn update_envelope_value(
        &self,
        envelope_id: &str,
        new_value: Json,
        ctx: &CallContext,
    ) -> Result<bool> {
        let e_name = ctx.tenant()?.to_string();
        let Some(owner) = self.store.meta_for_envelope(envelope_id, &e_name).await? else {
            return Ok(false);
        };
        match self.guard.authorize_record(&owner.meta_envelope_id, ctx, false).await? {
            RecordDecision::Proceed => {}
            RecordDecision::NotFound => return Ok(false),
            RecordDecision::Denied => return Err(GuardError::AccessDenied.into()),
        }

        let value = palisade_store::FieldValue::try_from(new_value.clone())
            .map_err(palisade_store::StoreError::from)?;
        self.store.update_envelope_value(envelope_id, &value, &e_name).await?;

        let hash_payload = serde_json::json!({ "envelopeId": envelope_id, "newValue": new_value });
        self.record_mutation(
            Operation::UpdateEnvelopeValue,
            &owner.meta_envelope_id,
            Some(&owner.ontology),
            compute_envelope_hash(envelope_id, &owner.ontology, &hash_payload),
            &e_name,
            ctx,
        )
        .await;
        Ok(true)
    }

    /// Bulk create, used by migrations. `skip_webhooks` is honored only
    /// when the caller's authenticated platform is the configured migration
    /// tool — a client-declared flag alone is never trusted.
    pub async fn bulk_create_meta_envelopes(
        &self,
        inputs: Vec<BulkMetaEnvelopeInput>,
        skip_webhooks: bool,
        ctx: &CallContext,
    ) -> BulkCreatePayload {
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => {
                return BulkCreatePayload {
                    results: Vec::new(),
                    success_count: 0,
                    error_count: 0,
                    errors: vec![UserError::new(codes::MISSING_ENAME, "eName header is required")],
                };
            }
        };
        let migration_caller = match (&self.config.migration_platform, ctx.platform_id()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        let skip_webhooks = skip_webhooks && migration_caller;

        let mut results = Vec::with_capacity(inputs.len());
        let mut success_count = 0;
        let mut error_count = 0;
        for input in inputs {
            let outcome = self.bulk_create_one(&input, skip_webhooks, &e_name, ctx).await;
            match outcome {
                Ok(id) => {
                    success_count += 1;
                    results.push(BulkCreateResult { id, success: true, error: None });
                }
                Err(message) => {
                    error_count += 1;
                    results.push(BulkCreateResult {
                        id: input.id.clone().unwrap_or_default(),
                        success: false,
                        error: Some(message),
                    });
                }
            }
        }

        BulkCreatePayload { results, success_count, error_count, errors: Vec::new() }
    }

    async fn bulk_create_one(
        &self,
        input: &BulkMetaEnvelopeInput,
        skip_webhooks: bool,
        e_name: &str,
        ctx: &CallContext,
    ) -> std::result::Result<String, String> {
        let payload = payload_from_json(&input.payload).map_err(|e| e.to_string())?;
        let result = self
            .store
            .store_with_id(input.id.as_deref(), &input.ontology, &payload, &input.acl, e_name)
            .await
            .map_err(|e| e.to_string())?;

        self.record_mutation(
            Operation::Create,
            &result.meta.id,
            Some(&input.ontology),
            compute_envelope_hash(&result.meta.id, &input.ontology, &input.payload),
            e_name,
            ctx,
        )
        .await;
        if !skip_webhooks {
            self.notify_peers(&result.meta.id, &input.ontology, input.payload.clone(), e_name, ctx, true);
        }
        Ok(result.meta.id)
    }

    // -----------------------------------------------------------------------
    // Binding documents
    // -----------------------------------------------------------------------

    pub async fn binding_document(
        &self,
        id: &str,
        ctx: &CallContext,
    ) -> Result<Option<BindingDocumentView>> {
        match self.guard.authorize_record(id, ctx, false).await? {
            RecordDecision::NotFound => Ok(None),
            RecordDecision::Denied => Err(GuardError::AccessDenied.into()),
            RecordDecision::Proceed => {
                let record = self.bindings.get(id, ctx.tenant()?).await?;
                Ok(record.map(BindingDocumentView::from))
            }
        }
    }

    pub async fn binding_documents(
        &self,
        doc_type: Option<BindingDocumentType>,
        page: &PageArgs,
        ctx: &CallContext,
    ) -> Result<Connection<BindingDocumentView>> {
        let e_name = ctx.tenant()?;
        let connection = self.bindings.find(e_name, doc_type, page).await?;
        let mut visible = Connection {
            edges: Vec::with_capacity(connection.edges.len()),
            page_info: connection.page_info,
            total_count: connection.total_count,
        };
        for edge in connection.edges {
            if self.guard.allows(&edge.node.acl, ctx) {
                visible.edges.push(palisade_store::Edge {
                    cursor: edge.cursor,
                    node: BindingDocumentView::from(edge.node),
                });
            }
        }
        Ok(visible)
    }

    pub async fn create_binding_document(
        &self,
        input: CreateBindingDocument,
        ctx: &CallContext,
    ) -> CreateBindingDocumentPayload {
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => {
                return CreateBindingDocumentPayload {
                    binding_document: None,
                    meta_envelope_id: None,
                    errors: vec![UserError::new(codes::MISSING_ENAME, "eName header is required")],
                };
            }
        };
        match self.bindings.create(input, &e_name).await {
            Ok((id, document)) => CreateBindingDocumentPayload {
                binding_document: Some(BindingDocumentView {
                    id: id.clone(),
                    subject: document.subject.clone(),
                    doc_type: document.doc_type.as_str().into(),
                    data: document.data.to_json(),
                    signatures: document.signatures,
                }),
                meta_envelope_id: Some(id),
                errors: Vec::new(),
            },
            Err(e) => CreateBindingDocumentPayload {
                binding_document: None,
                meta_envelope_id: None,
                errors: vec![binding_error(&e)],
            },
        }
    }

    pub async fn create_binding_document_signature(
        &self,
        binding_document_id: &str,
        signature: BindingSignature,
        ctx: &CallContext,
    ) -> CreateBindingSignaturePayload {
        let e_name = match ctx.tenant() {
            Ok(e_name) => e_name.to_string(),
            Err(_) => {
                return CreateBindingSignaturePayload {
                    binding_document: None,
                    errors: vec![UserError::new(codes::MISSING_ENAME, "eName header is required")],
                };
            }
        };
        match self
            .bindings
            .add_counterparty_signature(binding_document_id, signature, &e_name)
            .await
        {
            Ok(document) => CreateBindingSignaturePayload {
                binding_document: Some(BindingDocumentView {
                    id: binding_document_id.to_string(),
                    subject: document.subject.clone(),
                    doc_type: document.doc_type.as_str().into(),
                    data: document.data.to_json(),
                    signatures: document.signatures,
                }),
                errors: Vec::new(),
            },
            Err(e) => CreateBindingSignaturePayload {
                binding_document: None,
                errors: vec![binding_error(&e)],
            },
        }
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Append an operation-log entry. Best-effort: a failed append is
    /// logged and swallowed, never failing the triggering mutation.
    async fn record_mutation(
        &self,
        operation: Operation,
        meta_envelope_id: &str,
        ontology: Option<&str>,
        envelope_hash: String,
        e_name: &str,
        ctx: &CallContext,
    ) {
        let append = OperationLogAppend {
            e_name: e_name.to_string(),
            meta_envelope_id: meta_envelope_id.to_string(),
            envelope_hash,
            operation,
            platform: ctx.platform_id().map(str::to_string),
            timestamp: Utc::now(),
            ontology: ontology.map(str::to_string),
        };
        if let Err(e) = self.store.append_operation_log(append).await {
            tracing::warn!(error = %e, operation = operation.as_str(), "operation log append failed");
        }
    }

    /// Schedule webhook fan-out. Create-path delivery honors the configured
    /// delay; update-path delivery is immediate.
    fn notify_peers(
        &self,
        id: &str,
        ontology: &str,
        data: Json,
        e_name: &str,
        ctx: &CallContext,
        is_create: bool,
    ) {
        let payload = WebhookPayload {
            id: id.to_string(),
            w3id: e_name.to_string(),
            evault_public_key: self.config.public_key.clone(),
            data,
            schema_id: ontology.to_string(),
            origin_platform: ctx.platform_id().map(str::to_string),
        };
        let delay = if is_create {
            self.config.webhook.create_delay
        } else {
            std::time::Duration::ZERO
        };
        self.webhooks.dispatch(payload, delay);
    }
}

fn binding_error(error: &BindingError) -> UserError {
    let code = match error {
        BindingError::NotFound | BindingError::NotABindingDocument => codes::NOT_FOUND,
        BindingError::DuplicateSigner(_) => codes::DUPLICATE_SIGNER,
        BindingError::Validation(_) | BindingError::Malformed(_) => codes::VALIDATION_ERROR,
        BindingError::InvalidSignature(_) => codes::INVALID_SIGNATURE,
        BindingError::KeyFetch(_) | BindingError::Store(_) => codes::CREATE_FAILED,
    };
    UserError::new(code, error.to_string())
}

//! The `EnvelopeStore` abstraction and cross-instance tenant copy.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::envelope::{EnvelopeOwner, MetaEnvelope, Payload, StoreResult};
use crate::error::StoreError;
use crate::oplog::{OperationLogAppend, OperationLogEntry, OperationLogPage};
use crate::page::{Connection, MetaFilter, PageArgs};
use crate::value::FieldValue;

type Result<T> = std::result::Result<T, StoreError>;

/// Tenant-scoped storage of meta-envelopes, their typed envelopes, per-tenant
/// key material, and the operation log.
///
/// Every operation requires a non-empty `e_name` and fails with
/// [`StoreError::MissingTenant`] otherwise. All other "not found for this
/// tenant" conditions are `None`/empty results, never errors — absent records
/// and foreign-tenant records are indistinguishable to callers. The store
/// never decides deny-vs-allow; that is the access guard's job.
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Create a meta-envelope with a freshly minted id, one envelope per
    /// payload field, as one atomic write.
    async fn store(
        &self,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult>;

    /// Like [`EnvelopeStore::store`] but with a caller-supplied meta id
    /// (bulk/migration ingestion). A `None` id mints one.
    async fn store_with_id(
        &self,
        id: Option<&str>,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult>;

    /// Insert a complete meta-envelope preserving every id, upserting nodes
    /// that already exist. Used by cross-instance copies.
    async fn ingest(&self, meta: &MetaEnvelope, e_name: &str) -> Result<()>;

    /// `None` both when the id does not exist and when it belongs to another
    /// tenant.
    async fn find_by_id(&self, id: &str, e_name: &str) -> Result<Option<MetaEnvelope>>;

    /// The subset of `ids` owned by `e_name`; excluded ids are silently
    /// dropped.
    async fn find_by_ids(&self, ids: &[String], e_name: &str) -> Result<Vec<MetaEnvelope>>;

    async fn find_by_ontology(&self, ontology: &str, e_name: &str) -> Result<Vec<MetaEnvelope>>;

    /// Case-insensitive substring search over envelope values within an
    /// ontology. Array values match if any element's textual form contains
    /// the term; object values match against their stringified form. Returns
    /// complete meta-envelopes.
    async fn find_by_search_term(
        &self,
        ontology: &str,
        term: &str,
        e_name: &str,
    ) -> Result<Vec<MetaEnvelope>>;

    /// Relay-style cursor pagination with optional ontology and search
    /// filters.
    async fn find_paginated(
        &self,
        e_name: &str,
        filter: Option<&MetaFilter>,
        page: &PageArgs,
    ) -> Result<Connection<MetaEnvelope>>;

    /// Every meta-envelope owned by the tenant.
    async fn all_for_tenant(&self, e_name: &str) -> Result<Vec<MetaEnvelope>>;

    /// Upsert: creates the record in place when `(id, e_name)` is absent;
    /// otherwise replaces the envelope set — fields present in `payload` are
    /// updated or created, absent fields are deleted, acl and ontology are
    /// replaced unconditionally.
    async fn update(
        &self,
        id: &str,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult>;

    /// Update a single field's value in place. Silent no-op when the
    /// envelope does not belong to `e_name`.
    async fn update_envelope_value(
        &self,
        envelope_id: &str,
        new_value: &FieldValue,
        e_name: &str,
    ) -> Result<()>;

    /// Detach and remove the meta-envelope and all linked envelopes. No-op
    /// when the id does not belong to `e_name`.
    async fn delete(&self, id: &str, e_name: &str) -> Result<()>;

    /// Resolve the owning meta-envelope of an envelope id.
    async fn meta_for_envelope(
        &self,
        envelope_id: &str,
        e_name: &str,
    ) -> Result<Option<EnvelopeOwner>>;

    /// Per-tenant public key material.
    async fn get_public_keys(&self, e_name: &str) -> Result<Vec<String>>;

    /// Append a public key, skipping duplicates.
    async fn add_public_key(&self, e_name: &str, public_key: &str) -> Result<()>;

    /// Append an operation log entry. The entry id is minted here.
    async fn append_operation_log(&self, entry: OperationLogAppend) -> Result<OperationLogEntry>;

    /// Paginated log entries, ordered timestamp descending then id
    /// ascending. `limit` is clamped to `1..=100`.
    async fn operation_logs(
        &self,
        e_name: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<OperationLogPage>;
}

/// Copy every record of one tenant from `source` to `target`, preserving all
/// ids, then verify the copy: the target must hold the same record count and
/// the exact envelope id set per meta-envelope. Public key material is
/// copied along. Returns the number of meta-envelopes copied.
pub async fn copy_tenant(
    source: &dyn EnvelopeStore,
    target: &dyn EnvelopeStore,
    e_name: &str,
) -> Result<usize> {
    let records = source.all_for_tenant(e_name).await?;
    let count = records.len();
    if count == 0 {
        tracing::info!(e_name, "no records to copy");
        return Ok(0);
    }

    tracing::info!(e_name, count, "copying tenant records");
    for record in &records {
        target.ingest(record, e_name).await?;
    }

    for key in source.get_public_keys(e_name).await? {
        target.add_public_key(e_name, &key).await?;
    }

    // Verify: count and id-set equality per record.
    for record in &records {
        let copied = target.find_by_id(&record.id, e_name).await?.ok_or_else(|| {
            StoreError::CopyVerification(format!("meta-envelope {} missing from target", record.id))
        })?;
        let expected: BTreeSet<&str> = record.envelopes.iter().map(|e| e.id.as_str()).collect();
        let actual: BTreeSet<&str> = copied.envelopes.iter().map(|e| e.id.as_str()).collect();
        if expected != actual {
            return Err(StoreError::CopyVerification(format!(
                "envelope set mismatch for meta-envelope {}: expected {}, got {}",
                record.id,
                expected.len(),
                actual.len()
            )));
        }
    }

    tracing::info!(e_name, count, "copy verified");
    Ok(count)
}

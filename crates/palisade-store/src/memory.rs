//! In-memory graph implementation of [`EnvelopeStore`].
//!
//! Nodes live in keyed maps with an explicit `LINKS_TO` adjacency from
//! meta-envelope to envelope, mirroring the graph shape the store contract
//! assumes: addressable by node id, traversable by relationship. Meta nodes
//! are keyed by `(eName, id)` so one tenant's writes can never touch a
//! record another tenant holds under the same id.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeOwner, MetaEnvelope, Payload, StoreResult, StoredMeta};
use crate::error::StoreError;
use crate::oplog::{
    log_cursor, parse_log_cursor, OperationLogAppend, OperationLogEntry, OperationLogPage,
};
use crate::page::{encode_cursor, Connection, Edge, MetaFilter, PageArgs, PageInfo, SearchInput};
use crate::store::EnvelopeStore;
use crate::value::{decode, encode, FieldValue, StoredValue, ValueType};

type Result<T> = std::result::Result<T, StoreError>;

/// Tenant-scoped node address.
type MetaKey = (String, String);

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug)]
struct MetaNode {
    id: String,
    ontology: String,
    acl: Vec<String>,
    e_name: String,
}

impl MetaNode {
    fn key(&self) -> MetaKey {
        (self.e_name.clone(), self.id.clone())
    }
}

#[derive(Clone, Debug)]
struct EnvelopeNode {
    id: String,
    ontology: String,
    stored: StoredValue,
    value_type: ValueType,
}

fn meta_key(e_name: &str, id: &str) -> MetaKey {
    (e_name.to_string(), id.to_string())
}

/// In-memory envelope store backed by DashMap node tables.
#[derive(Default)]
pub struct MemoryStore {
    meta: DashMap<MetaKey, MetaNode>,
    envelopes: DashMap<String, EnvelopeNode>,
    /// LINKS_TO adjacency: meta node -> linked envelope ids.
    links: DashMap<MetaKey, Vec<String>>,
    /// Per-tenant public key material.
    tenant_keys: DashMap<String, Vec<String>>,
    logs: RwLock<Vec<OperationLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_tenant(e_name: &str) -> Result<()> {
        if e_name.is_empty() {
            return Err(StoreError::MissingTenant);
        }
        Ok(())
    }

    fn mint_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Reassemble a full record from its meta node and linked envelopes.
    fn assemble(&self, node: &MetaNode) -> Result<MetaEnvelope> {
        let mut envelopes = Vec::new();
        if let Some(ids) = self.links.get(&node.key()) {
            for envelope_id in ids.iter() {
                if let Some(env) = self.envelopes.get(envelope_id) {
                    envelopes.push(Envelope {
                        id: env.id.clone(),
                        ontology: env.ontology.clone(),
                        value: decode(&env.stored, env.value_type)?,
                        value_type: env.value_type,
                    });
                }
            }
        }
        Ok(MetaEnvelope {
            id: node.id.clone(),
            ontology: node.ontology.clone(),
            acl: node.acl.clone(),
            envelopes,
        })
    }

    /// Whether any envelope of the record matches the search input,
    /// honoring its optional field restriction.
    fn search_matches(&self, key: &MetaKey, search: &SearchInput) -> bool {
        let Some(ids) = self.links.get(key) else {
            return false;
        };
        ids.iter().any(|envelope_id| {
            let Some(env) = self.envelopes.get(envelope_id) else {
                return false;
            };
            if let Some(fields) = &search.fields {
                if !fields.iter().any(|f| f == &env.ontology) {
                    return false;
                }
            }
            search.matches(&env.stored.search_text())
        })
    }

    fn tenant_metas(&self, e_name: &str) -> Vec<MetaNode> {
        self.meta
            .iter()
            .filter(|entry| entry.key().0 == e_name)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl EnvelopeStore for MemoryStore {
    async fn store(
        &self,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult> {
        self.store_with_id(None, ontology, payload, acl, e_name).await
    }

    async fn store_with_id(
        &self,
        id: Option<&str>,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult> {
        Self::require_tenant(e_name)?;
        let meta_id = id.map(str::to_string).unwrap_or_else(Self::mint_id);
        let key = meta_key(e_name, &meta_id);

        // Envelopes and links go in before the meta node so a concurrent
        // reader never observes a half-linked record.
        let mut created = Vec::new();
        let mut link_ids = Vec::new();
        for (field_key, value) in payload {
            let (stored, value_type) = encode(value)?;
            let envelope_id = Self::mint_id();
            self.envelopes.insert(
                envelope_id.clone(),
                EnvelopeNode {
                    id: envelope_id.clone(),
                    ontology: field_key.clone(),
                    stored,
                    value_type,
                },
            );
            link_ids.push(envelope_id.clone());
            created.push(Envelope {
                id: envelope_id,
                ontology: field_key.clone(),
                value: value.clone(),
                value_type,
            });
        }
        self.links.insert(key.clone(), link_ids);
        self.meta.insert(
            key,
            MetaNode {
                id: meta_id.clone(),
                ontology: ontology.to_string(),
                acl: acl.to_vec(),
                e_name: e_name.to_string(),
            },
        );

        Ok(StoreResult {
            meta: StoredMeta {
                id: meta_id,
                ontology: ontology.to_string(),
                acl: acl.to_vec(),
            },
            envelopes: created,
        })
    }

    async fn ingest(&self, meta: &MetaEnvelope, e_name: &str) -> Result<()> {
        Self::require_tenant(e_name)?;
        let key = meta_key(e_name, &meta.id);
        let mut link_ids = Vec::new();
        for envelope in &meta.envelopes {
            let (stored, value_type) = encode(&envelope.value)?;
            self.envelopes.insert(
                envelope.id.clone(),
                EnvelopeNode {
                    id: envelope.id.clone(),
                    ontology: envelope.ontology.clone(),
                    stored,
                    value_type,
                },
            );
            link_ids.push(envelope.id.clone());
        }
        self.links.insert(key.clone(), link_ids);
        self.meta.insert(
            key,
            MetaNode {
                id: meta.id.clone(),
                ontology: meta.ontology.clone(),
                acl: meta.acl.clone(),
                e_name: e_name.to_string(),
            },
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &str, e_name: &str) -> Result<Option<MetaEnvelope>> {
        Self::require_tenant(e_name)?;
        match self.meta.get(&meta_key(e_name, id)) {
            Some(node) => Ok(Some(self.assemble(&node)?)),
            None => Ok(None),
        }
    }

    async fn find_by_ids(&self, ids: &[String], e_name: &str) -> Result<Vec<MetaEnvelope>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Self::require_tenant(e_name)?;
        let mut found = Vec::new();
        for id in ids {
            if let Some(record) = self.find_by_id(id, e_name).await? {
                found.push(record);
            }
        }
        Ok(found)
    }

    async fn find_by_ontology(&self, ontology: &str, e_name: &str) -> Result<Vec<MetaEnvelope>> {
        Self::require_tenant(e_name)?;
        let mut records = Vec::new();
        for node in self.tenant_metas(e_name) {
            if node.ontology == ontology {
                records.push(self.assemble(&node)?);
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn find_by_search_term(
        &self,
        ontology: &str,
        term: &str,
        e_name: &str,
    ) -> Result<Vec<MetaEnvelope>> {
        Self::require_tenant(e_name)?;
        let search = SearchInput::contains(term);
        let mut records = Vec::new();
        for node in self.tenant_metas(e_name) {
            if node.ontology == ontology && self.search_matches(&node.key(), &search) {
                records.push(self.assemble(&node)?);
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn find_paginated(
        &self,
        e_name: &str,
        filter: Option<&MetaFilter>,
        page: &PageArgs,
    ) -> Result<Connection<MetaEnvelope>> {
        Self::require_tenant(e_name)?;
        if page.first.is_some() && page.last.is_some() {
            return Err(StoreError::InvalidPagination("cannot specify both 'first' and 'last'"));
        }
        if page.after.is_some() && page.before.is_some() {
            return Err(StoreError::InvalidPagination("cannot specify both 'after' and 'before'"));
        }

        let limit = page
            .first
            .or(page.last)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE) as usize;
        let backward = page.last.is_some();

        let mut matched: Vec<MetaNode> = self
            .tenant_metas(e_name)
            .into_iter()
            .filter(|node| {
                if let Some(filter) = filter {
                    if let Some(ontology_id) = &filter.ontology_id {
                        if &node.ontology != ontology_id {
                            return false;
                        }
                    }
                    if let Some(search) = &filter.search {
                        if !search.term.is_empty() && !self.search_matches(&node.key(), search) {
                            return false;
                        }
                    }
                }
                true
            })
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));

        // Total is counted before cursor bounds are applied.
        let total_count = matched.len() as u64;

        if let Some(after) = &page.after {
            let cursor_id = crate::page::decode_cursor(after)?;
            matched.retain(|node| {
                if backward { node.id < cursor_id } else { node.id > cursor_id }
            });
        } else if let Some(before) = &page.before {
            let cursor_id = crate::page::decode_cursor(before)?;
            matched.retain(|node| {
                if backward { node.id > cursor_id } else { node.id < cursor_id }
            });
        }

        if backward {
            matched.reverse();
        }
        let has_extra = matched.len() > limit;
        matched.truncate(limit);
        if backward {
            matched.reverse();
        }

        let mut edges = Vec::with_capacity(matched.len());
        for node in &matched {
            edges.push(Edge {
                cursor: encode_cursor(&node.id),
                node: self.assemble(node)?,
            });
        }

        let page_info = PageInfo {
            has_next_page: if backward { page.after.is_some() } else { has_extra },
            has_previous_page: if backward { has_extra } else { page.after.is_some() },
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        Ok(Connection { edges, page_info, total_count })
    }

    async fn all_for_tenant(&self, e_name: &str) -> Result<Vec<MetaEnvelope>> {
        Self::require_tenant(e_name)?;
        let mut records = Vec::new();
        for node in self.tenant_metas(e_name) {
            records.push(self.assemble(&node)?);
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn update(
        &self,
        id: &str,
        ontology: &str,
        payload: &Payload,
        acl: &[String],
        e_name: &str,
    ) -> Result<StoreResult> {
        Self::require_tenant(e_name)?;

        let Some(existing) = self.find_by_id(id, e_name).await? else {
            // Upsert: absent under this tenant means create in place.
            return self.store_with_id(Some(id), ontology, payload, acl, e_name).await;
        };
        let key = meta_key(e_name, id);

        self.meta.insert(
            key.clone(),
            MetaNode {
                id: id.to_string(),
                ontology: ontology.to_string(),
                acl: acl.to_vec(),
                e_name: e_name.to_string(),
            },
        );

        let mut result_envelopes = Vec::new();
        let mut link_ids = Vec::new();
        for (field_key, value) in payload {
            let (stored, value_type) = encode(value)?;
            let envelope_id = match existing.envelopes.iter().find(|e| &e.ontology == field_key) {
                Some(current) => current.id.clone(),
                None => Self::mint_id(),
            };
            self.envelopes.insert(
                envelope_id.clone(),
                EnvelopeNode {
                    id: envelope_id.clone(),
                    ontology: field_key.clone(),
                    stored,
                    value_type,
                },
            );
            link_ids.push(envelope_id.clone());
            result_envelopes.push(Envelope {
                id: envelope_id,
                ontology: field_key.clone(),
                value: value.clone(),
                value_type,
            });
        }

        // Fields absent from the new payload are deleted.
        for envelope in &existing.envelopes {
            if !payload.contains_key(&envelope.ontology) {
                self.envelopes.remove(&envelope.id);
            }
        }
        self.links.insert(key, link_ids);

        Ok(StoreResult {
            meta: StoredMeta {
                id: id.to_string(),
                ontology: ontology.to_string(),
                acl: acl.to_vec(),
            },
            envelopes: result_envelopes,
        })
    }

    async fn update_envelope_value(
        &self,
        envelope_id: &str,
        new_value: &FieldValue,
        e_name: &str,
    ) -> Result<()> {
        Self::require_tenant(e_name)?;
        // No-op unless the envelope is linked from a meta node of this
        // tenant — never an error, by design.
        if self.meta_for_envelope(envelope_id, e_name).await?.is_none() {
            return Ok(());
        }
        let (stored, value_type) = encode(new_value)?;
        if let Some(mut env) = self.envelopes.get_mut(envelope_id) {
            env.stored = stored;
            env.value_type = value_type;
        }
        Ok(())
    }

    async fn delete(&self, id: &str, e_name: &str) -> Result<()> {
        Self::require_tenant(e_name)?;
        let key = meta_key(e_name, id);
        if self.meta.remove(&key).is_none() {
            return Ok(());
        }
        if let Some((_, envelope_ids)) = self.links.remove(&key) {
            for envelope_id in envelope_ids {
                self.envelopes.remove(&envelope_id);
            }
        }
        Ok(())
    }

    async fn meta_for_envelope(
        &self,
        envelope_id: &str,
        e_name: &str,
    ) -> Result<Option<EnvelopeOwner>> {
        Self::require_tenant(e_name)?;
        for entry in self.links.iter() {
            if entry.value().iter().any(|id| id == envelope_id) {
                if entry.key().0 != e_name {
                    continue;
                }
                if let Some(node) = self.meta.get(entry.key()) {
                    return Ok(Some(EnvelopeOwner {
                        meta_envelope_id: node.id.clone(),
                        ontology: node.ontology.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn get_public_keys(&self, e_name: &str) -> Result<Vec<String>> {
        Self::require_tenant(e_name)?;
        Ok(self
            .tenant_keys
            .get(e_name)
            .map(|keys| keys.clone())
            .unwrap_or_default())
    }

    async fn add_public_key(&self, e_name: &str, public_key: &str) -> Result<()> {
        Self::require_tenant(e_name)?;
        let mut keys = self.tenant_keys.entry(e_name.to_string()).or_default();
        if !keys.iter().any(|k| k == public_key) {
            keys.push(public_key.to_string());
        }
        Ok(())
    }

    async fn append_operation_log(&self, entry: OperationLogAppend) -> Result<OperationLogEntry> {
        Self::require_tenant(&entry.e_name)?;
        let entry = OperationLogEntry {
            id: Self::mint_id(),
            e_name: entry.e_name,
            meta_envelope_id: entry.meta_envelope_id,
            envelope_hash: entry.envelope_hash,
            operation: entry.operation,
            platform: entry.platform,
            timestamp: entry.timestamp,
            ontology: entry.ontology,
        };
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        logs.push(entry.clone());
        Ok(entry)
    }

    async fn operation_logs(
        &self,
        e_name: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<OperationLogPage> {
        Self::require_tenant(e_name)?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE) as usize;
        let cursor = match cursor {
            Some(raw) => Some(parse_log_cursor(raw).ok_or(StoreError::InvalidCursor)?),
            None => None,
        };

        let mut rows: Vec<OperationLogEntry> = {
            let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
            logs.iter().filter(|l| l.e_name == e_name).cloned().collect()
        };
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));

        if let Some((cursor_ts, cursor_id)) = cursor {
            rows.retain(|l| {
                l.timestamp < cursor_ts || (l.timestamp == cursor_ts && l.id > cursor_id)
            });
        }

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(log_cursor)
        } else {
            None
        };

        Ok(OperationLogPage { logs: rows, next_cursor, has_more })
    }
}

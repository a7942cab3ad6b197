//! Per-record and per-collection authorization.

use std::sync::Arc;

use palisade_store::{EnvelopeStore, MetaEnvelope};

use crate::context::CallContext;
use crate::directory::Directory;
use crate::error::GuardError;
use crate::token::{identity_from_bearer, TokenVerifier};

/// The ACL wildcard: public within the tenant.
pub const ACL_WILDCARD: &str = "*";

/// Result of checking one record: does it exist under the caller's tenant,
/// and may the caller touch it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessCheck {
    pub has_access: bool,
    pub exists: bool,
}

/// The guard's answer for an id-scoped operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordDecision {
    /// Execute the operation.
    Proceed,
    /// The record does not exist under the caller's tenant — absent and
    /// foreign-tenant records are deliberately indistinguishable.
    NotFound,
    /// The record exists and the caller is not permitted. Only ever
    /// returned after existence is confirmed under the caller's own tenant.
    Denied,
}

/// Authenticates callers and authorizes per-record operations.
pub struct AccessGuard {
    store: Arc<dyn EnvelopeStore>,
    verifier: TokenVerifier,
}

impl AccessGuard {
    pub fn new(store: Arc<dyn EnvelopeStore>, directory: Arc<dyn Directory>) -> Self {
        Self { store, verifier: TokenVerifier::new(directory) }
    }

    /// Build the caller context from the raw credentials of a request.
    ///
    /// The bearer token is verified against the directory's signing keys;
    /// verification failure is not an error here — the caller simply has no
    /// platform credential and falls back to ACL evaluation under the
    /// identity named by the token's key id.
    pub async fn authenticate(&self, bearer: Option<&str>, e_name: Option<&str>) -> CallContext {
        let platform = self.verifier.verify_bearer(bearer).await;
        let current_user = bearer
            .and_then(|h| h.strip_prefix("Bearer "))
            .and_then(identity_from_bearer);
        CallContext {
            e_name: e_name.map(str::to_string),
            current_user,
            platform,
        }
    }

    /// Check a caller's access to one record.
    ///
    /// A verified platform credential grants access unconditionally; the
    /// record's existence is still resolved under the caller's tenant so
    /// the protocol layer can distinguish update-in-place from plain reads.
    pub async fn check_access(&self, id: &str, ctx: &CallContext) -> Result<AccessCheck, GuardError> {
        if ctx.is_platform() {
            let Some(e_name) = ctx.e_name.as_deref().filter(|e| !e.is_empty()) else {
                return Ok(AccessCheck { has_access: true, exists: false });
            };
            let exists = self.store.find_by_id(id, e_name).await?.is_some();
            return Ok(AccessCheck { has_access: true, exists });
        }

        let e_name = ctx.tenant()?;
        let Some(record) = self.store.find_by_id(id, e_name).await? else {
            return Ok(AccessCheck { has_access: false, exists: false });
        };
        let has_access = acl_allows(&record.acl, ctx.current_user.as_deref());
        Ok(AccessCheck { has_access, exists: true })
    }

    /// Decide an id-scoped operation.
    ///
    /// Payload-bearing updates on absent records proceed so the store's
    /// upsert semantics can create the record in place.
    pub async fn authorize_record(
        &self,
        id: &str,
        ctx: &CallContext,
        is_payload_update: bool,
    ) -> Result<RecordDecision, GuardError> {
        let check = self.check_access(id, ctx).await?;
        if !check.exists && is_payload_update {
            return Ok(RecordDecision::Proceed);
        }
        if !check.has_access {
            return Ok(if check.exists { RecordDecision::Denied } else { RecordDecision::NotFound });
        }
        if !check.exists {
            return Ok(RecordDecision::NotFound);
        }
        Ok(RecordDecision::Proceed)
    }

    /// Filter an ACL-bearing collection down to the records this caller may
    /// see. Platform callers see everything; everyone else needs the
    /// wildcard or ACL membership. The results are already tenant-scoped by
    /// the store.
    pub fn filter_collection(&self, records: Vec<MetaEnvelope>, ctx: &CallContext) -> Vec<MetaEnvelope> {
        if ctx.is_platform() {
            return records;
        }
        records
            .into_iter()
            .filter(|r| acl_allows(&r.acl, ctx.current_user.as_deref()))
            .collect()
    }

    /// Whether the caller may see one ACL-bearing record.
    pub fn allows(&self, acl: &[String], ctx: &CallContext) -> bool {
        ctx.is_platform() || acl_allows(acl, ctx.current_user.as_deref())
    }
}

/// The two ACL rules: wildcard, or membership of the resolved identity.
fn acl_allows(acl: &[String], current_user: Option<&str>) -> bool {
    if acl.iter().any(|entry| entry == ACL_WILDCARD) {
        return true;
    }
    match current_user {
        Some(user) => acl.iter().any(|entry| entry == user),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_store::{FieldValue, MemoryStore, Payload};

    const TENANT: &str = "@alice";

    fn user_ctx(user: Option<&str>) -> CallContext {
        CallContext {
            e_name: Some(TENANT.into()),
            current_user: user.map(str::to_string),
            platform: None,
        }
    }

    async fn guard_with_record(acl: &[&str]) -> (AccessGuard, String) {
        let store = Arc::new(MemoryStore::new());
        let mut payload = Payload::new();
        payload.insert("name".into(), FieldValue::String("ada".into()));
        let acl: Vec<String> = acl.iter().map(|s| s.to_string()).collect();
        let result = store.store("profile", &payload, &acl, TENANT).await.unwrap();
        let directory = Arc::new(crate::directory::StaticDirectory::default());
        (AccessGuard::new(store, directory), result.meta.id)
    }

    #[tokio::test]
    async fn test_wildcard_acl_admits_anyone_including_no_identity() {
        let (guard, id) = guard_with_record(&["*"]).await;
        for user in [None, Some("@u1"), Some("@stranger")] {
            let check = guard.check_access(&id, &user_ctx(user)).await.unwrap();
            assert!(check.has_access && check.exists);
        }
    }

    #[tokio::test]
    async fn test_membership_acl_admits_only_members() {
        let (guard, id) = guard_with_record(&["@u1"]).await;

        let allowed = guard.check_access(&id, &user_ctx(Some("@u1"))).await.unwrap();
        assert!(allowed.has_access);

        let denied = guard.check_access(&id, &user_ctx(Some("@u2"))).await.unwrap();
        assert!(!denied.has_access && denied.exists);

        let anonymous = guard.check_access(&id, &user_ctx(None)).await.unwrap();
        assert!(!anonymous.has_access && anonymous.exists);
    }

    #[tokio::test]
    async fn test_denied_is_only_reported_for_existing_records() {
        let (guard, id) = guard_with_record(&["@u1"]).await;

        let decision = guard
            .authorize_record(&id, &user_ctx(Some("@u2")), false)
            .await
            .unwrap();
        assert_eq!(decision, RecordDecision::Denied);

        // An absent id reads as not-found, never denied.
        let decision = guard
            .authorize_record("missing", &user_ctx(Some("@u2")), false)
            .await
            .unwrap();
        assert_eq!(decision, RecordDecision::NotFound);
    }

    #[tokio::test]
    async fn test_payload_updates_on_absent_records_proceed() {
        let (guard, _) = guard_with_record(&["@u1"]).await;
        let decision = guard
            .authorize_record("new-id", &user_ctx(Some("@u2")), true)
            .await
            .unwrap();
        assert_eq!(decision, RecordDecision::Proceed, "upserts create in place");
    }

    #[tokio::test]
    async fn test_missing_tenant_fails_closed() {
        let (guard, id) = guard_with_record(&["*"]).await;
        let ctx = CallContext::default();
        assert!(matches!(
            guard.check_access(&id, &ctx).await,
            Err(GuardError::MissingTenant)
        ));
    }

    #[tokio::test]
    async fn test_filter_collection_applies_acl_rules() {
        let store = Arc::new(MemoryStore::new());
        let mut payload = Payload::new();
        payload.insert("k".into(), FieldValue::String("v".into()));
        store
            .store("o", &payload, &["*".to_string()], TENANT)
            .await
            .unwrap();
        store
            .store("o", &payload, &["@u1".to_string()], TENANT)
            .await
            .unwrap();
        store
            .store("o", &payload, &["@other".to_string()], TENANT)
            .await
            .unwrap();
        let directory = Arc::new(crate::directory::StaticDirectory::default());
        let guard = AccessGuard::new(store.clone(), directory);

        let records = store.find_by_ontology("o", TENANT).await.unwrap();
        assert_eq!(records.len(), 3);
        let visible = guard.filter_collection(records, &user_ctx(Some("@u1")));
        assert_eq!(visible.len(), 2, "wildcard + membership records remain");
    }
}

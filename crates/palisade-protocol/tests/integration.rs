use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use palisade_binding::{
    compute_binding_document_hash, BindingDocumentData, BindingDocumentType, BindingSignature,
    CreateBindingDocument, StaticKeyFetcher,
};
use palisade_guard::{CallContext, Directory, GuardError, Jwks, PlatformClaims, StaticDirectory};
use palisade_protocol::{
    codes, BulkMetaEnvelopeInput, MetaEnvelopeInput, ProtocolError, VaultConfig, VaultService,
};
use palisade_store::{MemoryStore, Operation, PageArgs};

const TENANT: &str = "@alice";
const PROFILE: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Directory that counts platform lookups, so tests can observe whether a
/// webhook dispatch actually happened.
struct CountingDirectory {
    lookups: AtomicUsize,
}

#[async_trait::async_trait]
impl Directory for CountingDirectory {
    async fn signing_keys(&self) -> Result<Jwks, GuardError> {
        Ok(Jwks::default())
    }

    async fn active_platforms(&self) -> Result<Vec<String>, GuardError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn service() -> VaultService {
    VaultService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StaticDirectory::default()),
        Arc::new(StaticKeyFetcher::default()),
        VaultConfig::default(),
    )
}

fn ctx() -> CallContext {
    CallContext::anonymous(TENANT)
}

fn platform_ctx(platform: &str) -> CallContext {
    CallContext {
        e_name: Some(TENANT.into()),
        current_user: None,
        platform: Some(PlatformClaims {
            platform: Some(platform.into()),
            claims: json!({ "platform": platform }),
        }),
    }
}

fn profile_input() -> MetaEnvelopeInput {
    MetaEnvelopeInput {
        ontology: PROFILE.into(),
        payload: json!({ "name": "Ada", "age": 36.0 }),
        acl: vec!["*".into()],
    }
}

// ----------------------------------------------------------------------------
// Meta-envelope mutations
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_create_and_read_back() {
    let service = service();
    let created = service.create_meta_envelope(profile_input(), &ctx()).await;
    assert!(created.errors.is_empty());
    let view = created.meta_envelope.unwrap();
    assert_eq!(view.parsed, json!({ "name": "Ada", "age": 36.0 }));
    assert_eq!(view.envelopes.len(), 2);

    let fetched = service.meta_envelope(&view.id, &ctx()).await.unwrap().unwrap();
    assert_eq!(fetched.id, view.id);
    assert_eq!(fetched.parsed, view.parsed);
}

#[tokio::test]
async fn test_create_without_tenant_reports_missing_ename() {
    let service = service();
    let result = service
        .create_meta_envelope(profile_input(), &CallContext::default())
        .await;
    assert!(result.meta_envelope.is_none());
    assert_eq!(result.errors[0].code.as_deref(), Some(codes::MISSING_ENAME));
}

#[tokio::test]
async fn test_create_rejects_null_payload_fields() {
    let service = service();
    let mut input = profile_input();
    input.payload = json!({ "name": null });
    let result = service.create_meta_envelope(input, &ctx()).await;
    assert!(result.meta_envelope.is_none());
    assert_eq!(result.errors[0].code.as_deref(), Some(codes::CREATE_FAILED));
}

#[tokio::test]
async fn test_update_on_absent_id_creates_in_place() {
    let service = service();
    let updated = service
        .update_meta_envelope("brand-new-id", profile_input(), &ctx())
        .await;
    assert!(updated.errors.is_empty());
    assert_eq!(updated.meta_envelope.unwrap().id, "brand-new-id");

    let fetched = service.meta_envelope("brand-new-id", &ctx()).await.unwrap().unwrap();
    assert_eq!(fetched.parsed, json!({ "name": "Ada", "age": 36.0 }));
}

#[tokio::test]
async fn test_update_is_a_full_replace() {
    let service = service();
    let created = service.create_meta_envelope(profile_input(), &ctx()).await;
    let id = created.meta_envelope.unwrap().id;

    let mut replacement = profile_input();
    replacement.payload = json!({ "name": "Ada Lovelace" });
    service.update_meta_envelope(&id, replacement, &ctx()).await;

    let fetched = service.meta_envelope(&id, &ctx()).await.unwrap().unwrap();
    assert_eq!(
        fetched.parsed,
        json!({ "name": "Ada Lovelace" }),
        "field 'age' must be gone after the replace"
    );
}

#[tokio::test]
async fn test_remove_reports_not_found_for_absent_ids() {
    let service = service();
    let removed = service.remove_meta_envelope("missing", &ctx()).await;
    assert!(!removed.success);
    assert_eq!(removed.errors[0].code.as_deref(), Some(codes::NOT_FOUND));

    let created = service.create_meta_envelope(profile_input(), &ctx()).await;
    let id = created.meta_envelope.unwrap().id;
    let removed = service.remove_meta_envelope(&id, &ctx()).await;
    assert!(removed.success);
    assert_eq!(removed.deleted_id, id);
    assert!(service.meta_envelope(&id, &ctx()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_envelope_value() {
    let service = service();
    let created = service.create_meta_envelope(profile_input(), &ctx()).await;
    let view = created.meta_envelope.unwrap();
    let age = view.envelopes.iter().find(|e| e.ontology == "age").unwrap();

    let updated = service
        .update_envelope_value(&age.id, json!(37.0), &ctx())
        .await
        .unwrap();
    assert!(updated);

    let fetched = service.meta_envelope(&view.id, &ctx()).await.unwrap().unwrap();
    assert_eq!(fetched.parsed["age"], json!(37.0));

    // An unknown envelope id is a no-op, not an error.
    let updated = service
        .update_envelope_value("missing-envelope", json!(1.0), &ctx())
        .await
        .unwrap();
    assert!(!updated);
}

// ----------------------------------------------------------------------------
// ACL enforcement through the resolver surface
// ----------------------------------------------------------------------------

fn user_ctx(user: &str) -> CallContext {
    CallContext {
        e_name: Some(TENANT.into()),
        current_user: Some(user.into()),
        platform: None,
    }
}

#[tokio::test]
async fn test_private_records_read_as_denied_or_absent() {
    let service = service();
    let mut input = profile_input();
    input.acl = vec!["@u1".into()];
    let created = service.create_meta_envelope(input, &ctx()).await;
    let id = created.meta_envelope.unwrap().id;

    // The member reads it.
    assert!(service.meta_envelope(&id, &user_ctx("@u1")).await.unwrap().is_some());

    // A non-member is denied — the record is known to exist under this
    // tenant, so denial is the correct signal.
    let err = service.meta_envelope(&id, &user_ctx("@u2")).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Guard(GuardError::AccessDenied)));

    // An absent id reads as None for everyone.
    assert!(service.meta_envelope("missing", &user_ctx("@u2")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_collection_queries_filter_by_acl() {
    let service = service();
    for acl in [vec!["*".to_string()], vec!["@u1".to_string()], vec!["@other".to_string()]] {
        let mut input = profile_input();
        input.acl = acl;
        service.create_meta_envelope(input, &ctx()).await;
    }

    let page = service
        .meta_envelopes(None, &PageArgs::forward(10), &user_ctx("@u1"))
        .await
        .unwrap();
    assert_eq!(page.total_count, 3, "total counts all tenant matches");
    assert_eq!(page.edges.len(), 2, "only wildcard + membership records are visible");

    let listed = service
        .meta_envelopes_by_ontology(PROFILE, &user_ctx("@u1"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let searched = service
        .search_meta_envelopes(PROFILE, "ada", &user_ctx("@u1"))
        .await
        .unwrap();
    assert_eq!(searched.len(), 2);
}

// ----------------------------------------------------------------------------
// Audit completeness
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_every_mutation_leaves_a_log_entry() {
    let service = service();
    let created = service.create_meta_envelope(profile_input(), &ctx()).await;
    let view = created.meta_envelope.unwrap();
    let age = view.envelopes.iter().find(|e| e.ontology == "age").unwrap().clone();

    service
        .update_meta_envelope(&view.id, profile_input(), &ctx())
        .await;
    service
        .update_envelope_value(&age.id, json!(40.0), &ctx())
        .await
        .unwrap();
    service.remove_meta_envelope(&view.id, &ctx()).await;

    let page = service.operation_logs(TENANT, None, 50).await.unwrap();
    let operations: Vec<Operation> = page.logs.iter().map(|l| l.operation).collect();
    for expected in [
        Operation::Create,
        Operation::Update,
        Operation::UpdateEnvelopeValue,
        Operation::Delete,
    ] {
        assert!(
            operations.contains(&expected),
            "missing log entry for {expected:?}"
        );
    }
    assert!(
        page.logs.iter().all(|l| l.meta_envelope_id == view.id),
        "every entry references the mutated record"
    );
    assert!(page.logs.iter().all(|l| !l.envelope_hash.is_empty()));
}

// ----------------------------------------------------------------------------
// Bulk create
// ----------------------------------------------------------------------------

fn bulk_input(id: Option<&str>, payload: serde_json::Value) -> BulkMetaEnvelopeInput {
    BulkMetaEnvelopeInput {
        id: id.map(str::to_string),
        ontology: PROFILE.into(),
        payload,
        acl: vec!["*".into()],
    }
}

#[tokio::test]
async fn test_bulk_create_reports_per_item_results() {
    let service = service();
    let payload = service
        .bulk_create_meta_envelopes(
            vec![
                bulk_input(Some("b1"), json!({ "k": "v1" })),
                bulk_input(None, json!({ "k": "v2" })),
                bulk_input(Some("b3"), json!({ "k": null })),
            ],
            false,
            &ctx(),
        )
        .await;
    assert_eq!(payload.success_count, 2);
    assert_eq!(payload.error_count, 1);
    assert_eq!(payload.results.len(), 3);
    assert!(payload.results[0].success);
    assert_eq!(payload.results[0].id, "b1");
    assert!(!payload.results[2].success);
    assert_eq!(payload.results[2].id, "b3");

    assert!(service.meta_envelope("b1", &ctx()).await.unwrap().is_some());
}

async fn wait_for_lookups(directory: &CountingDirectory, expected: usize) -> usize {
    for _ in 0..100 {
        let seen = directory.lookups.load(Ordering::SeqCst);
        if seen >= expected {
            return seen;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    directory.lookups.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_skip_webhooks_is_honored_only_for_the_migration_platform() {
    let directory = Arc::new(CountingDirectory { lookups: AtomicUsize::new(0) });
    let config = VaultConfig {
        migration_platform: Some("https://migrator.example".into()),
        ..VaultConfig::default()
    };
    let service = VaultService::new(
        Arc::new(MemoryStore::new()),
        directory.clone(),
        Arc::new(StaticKeyFetcher::default()),
        config,
    );

    // The migration platform may skip: no platform lookup happens.
    service
        .bulk_create_meta_envelopes(
            vec![bulk_input(Some("m1"), json!({ "k": "v" }))],
            true,
            &platform_ctx("https://migrator.example"),
        )
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(directory.lookups.load(Ordering::SeqCst), 0, "skip honored for migrator");

    // Any other caller's skip flag is silently ignored — delivery is
    // attempted, which shows up as a platform lookup.
    service
        .bulk_create_meta_envelopes(
            vec![bulk_input(Some("m2"), json!({ "k": "v" }))],
            true,
            &platform_ctx("https://random.example"),
        )
        .await;
    let lookups = wait_for_lookups(&directory, 1).await;
    assert!(lookups >= 1, "skip ignored for non-migration callers");
}

// ----------------------------------------------------------------------------
// Binding documents through the resolver surface
// ----------------------------------------------------------------------------

fn self_binding_input(subject: &str) -> CreateBindingDocument {
    let data = json!({ "name": "Ada" });
    let validated =
        BindingDocumentData::from_json(BindingDocumentType::SelfDeclared, &data).unwrap();
    let hash = compute_binding_document_hash(
        &format!("@{}", subject.trim_start_matches('@')),
        BindingDocumentType::SelfDeclared,
        &validated,
    );
    CreateBindingDocument {
        subject: subject.into(),
        doc_type: BindingDocumentType::SelfDeclared,
        data,
        owner_signature: BindingSignature {
            signer: "@alice".into(),
            signature: hash,
            timestamp: "2025-04-10T00:00:00Z".into(),
        },
    }
}

#[tokio::test]
async fn test_binding_document_lifecycle() {
    let service = service();
    let created = service
        .create_binding_document(self_binding_input("alice"), &user_ctx("@alice"))
        .await;
    assert!(created.errors.is_empty(), "{:?}", created.errors);
    let id = created.meta_envelope_id.unwrap();
    let view = created.binding_document.unwrap();
    assert_eq!(view.subject, "@alice");
    assert_eq!(view.doc_type, "self");

    // The subject can read it back; the ACL is scoped to the subject so a
    // stranger is denied.
    let fetched = service
        .binding_document(&id, &user_ctx("@alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.signatures.len(), 1);
    assert!(matches!(
        service.binding_document(&id, &user_ctx("@stranger")).await,
        Err(ProtocolError::Guard(GuardError::AccessDenied))
    ));

    // Counterparty co-signs once; a second attempt is a duplicate.
    let validated =
        BindingDocumentData::from_json(BindingDocumentType::SelfDeclared, &json!({ "name": "Ada" }))
            .unwrap();
    let counter = BindingSignature {
        signer: "@bob".into(),
        signature: compute_binding_document_hash("@alice", BindingDocumentType::SelfDeclared, &validated),
        timestamp: "2025-04-11T00:00:00Z".into(),
    };
    let signed = service
        .create_binding_document_signature(&id, counter.clone(), &user_ctx("@alice"))
        .await;
    assert!(signed.errors.is_empty());
    assert_eq!(signed.binding_document.unwrap().signatures.len(), 2);

    let duplicate = service
        .create_binding_document_signature(&id, counter, &user_ctx("@alice"))
        .await;
    assert_eq!(duplicate.errors[0].code.as_deref(), Some(codes::DUPLICATE_SIGNER));

    // Listing is scoped to the subject's view.
    let listed = service
        .binding_documents(None, &PageArgs::forward(10), &user_ctx("@alice"))
        .await
        .unwrap();
    assert_eq!(listed.edges.len(), 1);
    let hidden = service
        .binding_documents(None, &PageArgs::forward(10), &user_ctx("@stranger"))
        .await
        .unwrap();
    assert!(hidden.edges.is_empty());
}

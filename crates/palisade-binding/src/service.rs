//! Binding-document CRUD atop the envelope store.

use std::sync::Arc;

use palisade_store::{
    Connection, EnvelopeStore, MetaFilter, PageArgs, SearchInput, SearchMode,
};

use crate::canonical::{canonical_document_bytes, compute_binding_document_hash};
use crate::document::{
    normalize_subject, BindingDocument, BindingDocumentData, BindingDocumentType,
    BindingSignature, BINDING_DOCUMENT_ONTOLOGY,
};
use crate::error::BindingError;
use crate::verify::{verify_detached_signature, KeyFetcher};

type Result<T> = std::result::Result<T, BindingError>;

/// Input for creating a binding document. `data` is raw JSON, validated
/// against the declared type before anything is stored.
#[derive(Clone, Debug)]
pub struct CreateBindingDocument {
    pub subject: String,
    pub doc_type: BindingDocumentType,
    pub data: serde_json::Value,
    pub owner_signature: BindingSignature,
}

/// A stored binding document with its meta-envelope id and ACL. The ACL is
/// for the authorization layer and never reaches clients.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingRecord {
    pub id: String,
    pub acl: Vec<String>,
    pub document: BindingDocument,
}

/// Signed-claim CRUD built atop the envelope store.
pub struct BindingDocumentService {
    store: Arc<dyn EnvelopeStore>,
    keys: Arc<dyn KeyFetcher>,
}

impl BindingDocumentService {
    pub fn new(store: Arc<dyn EnvelopeStore>, keys: Arc<dyn KeyFetcher>) -> Self {
        Self { store, keys }
    }

    /// Create a binding document with the owner's signature as its first and
    /// only signature.
    ///
    /// The owner signature is accepted in either of two forms: the canonical
    /// document hash itself, or a detached ed25519 signature verifiable
    /// against the signer's published JWKS.
    pub async fn create(
        &self,
        input: CreateBindingDocument,
        e_name: &str,
    ) -> Result<(String, BindingDocument)> {
        let subject = normalize_subject(&input.subject);
        let data = BindingDocumentData::from_json(input.doc_type, &input.data)?;

        let expected_hash = compute_binding_document_hash(&subject, input.doc_type, &data);
        let hash_signature = input.owner_signature.signature == expected_hash;
        let detached_signature = verify_detached_signature(
            self.keys.as_ref(),
            &input.owner_signature.signer,
            &input.owner_signature.signature,
            &canonical_document_bytes(&subject, input.doc_type, &data),
        )
        .await;
        if !hash_signature && !detached_signature {
            return Err(BindingError::InvalidSignature("owner signature did not verify".into()));
        }

        let document = BindingDocument {
            subject: subject.clone(),
            doc_type: input.doc_type,
            data,
            signatures: vec![input.owner_signature],
        };

        let result = self
            .store
            .store(
                BINDING_DOCUMENT_ONTOLOGY,
                &document.to_payload()?,
                &[subject],
                e_name,
            )
            .await?;

        tracing::info!(id = %result.meta.id, doc_type = document.doc_type.as_str(), "binding document created");
        Ok((result.meta.id, document))
    }

    /// Append a counterparty signature.
    ///
    /// Counterparty signatures use the deterministic hash form. For
    /// social-connection documents the counterparty must be the subject. A
    /// signer may appear at most once.
    pub async fn add_counterparty_signature(
        &self,
        meta_envelope_id: &str,
        signature: BindingSignature,
        e_name: &str,
    ) -> Result<BindingDocument> {
        let meta = self
            .store
            .find_by_id(meta_envelope_id, e_name)
            .await?
            .ok_or(BindingError::NotFound)?;
        if meta.ontology != BINDING_DOCUMENT_ONTOLOGY {
            return Err(BindingError::NotABindingDocument);
        }
        let mut document = BindingDocument::from_meta(&meta)?;

        let expected_hash =
            compute_binding_document_hash(&document.subject, document.doc_type, &document.data);
        if signature.signature != expected_hash {
            return Err(BindingError::InvalidSignature(
                "expected the SHA-256 hash of the canonical binding document".into(),
            ));
        }

        if document.doc_type == BindingDocumentType::SocialConnection
            && signature.signer != document.subject
        {
            return Err(BindingError::Validation(format!(
                "signer {:?} is not the expected counterparty {:?}",
                signature.signer, document.subject
            )));
        }

        if document.signatures.iter().any(|s| s.signer == signature.signer) {
            return Err(BindingError::DuplicateSigner(signature.signer));
        }

        document.signatures.push(signature);
        let acl = vec![document.subject.clone()];
        self.store
            .update(
                meta_envelope_id,
                BINDING_DOCUMENT_ONTOLOGY,
                &document.to_payload()?,
                &acl,
                e_name,
            )
            .await?;

        Ok(document)
    }

    /// `None` both for missing ids and for ids that resolve to something
    /// other than a binding document.
    pub async fn get(&self, meta_envelope_id: &str, e_name: &str) -> Result<Option<BindingRecord>> {
        let Some(meta) = self.store.find_by_id(meta_envelope_id, e_name).await? else {
            return Ok(None);
        };
        if meta.ontology != BINDING_DOCUMENT_ONTOLOGY {
            return Ok(None);
        }
        let document = BindingDocument::from_meta(&meta)?;
        Ok(Some(BindingRecord { id: meta.id, acl: meta.acl, document }))
    }

    /// Paginated binding documents, optionally filtered by type. The type
    /// filter is pushed into the store query so requested page sizes are
    /// honored.
    pub async fn find(
        &self,
        e_name: &str,
        doc_type: Option<BindingDocumentType>,
        page: &PageArgs,
    ) -> Result<Connection<BindingRecord>> {
        let filter = MetaFilter {
            ontology_id: Some(BINDING_DOCUMENT_ONTOLOGY.into()),
            search: doc_type.map(|t| SearchInput {
                term: t.as_str().to_string(),
                case_sensitive: true,
                fields: Some(vec!["type".into()]),
                mode: SearchMode::Exact,
            }),
        };
        let connection = self.store.find_paginated(e_name, Some(&filter), page).await?;

        let mut records = Connection {
            edges: Vec::with_capacity(connection.edges.len()),
            page_info: connection.page_info,
            total_count: connection.total_count,
        };
        for edge in connection.edges {
            let document = BindingDocument::from_meta(&edge.node)?;
            records.edges.push(palisade_store::Edge {
                cursor: edge.cursor,
                node: BindingRecord { id: edge.node.id, acl: edge.node.acl, document },
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_store::MemoryStore;
    use serde_json::json;

    use crate::verify::StaticKeyFetcher;

    const TENANT: &str = "@alice";

    fn service() -> BindingDocumentService {
        BindingDocumentService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticKeyFetcher::default()),
        )
    }

    fn hash_signature(
        subject: &str,
        doc_type: BindingDocumentType,
        data: &serde_json::Value,
        signer: &str,
    ) -> BindingSignature {
        let data = BindingDocumentData::from_json(doc_type, data).unwrap();
        BindingSignature {
            signer: signer.into(),
            signature: compute_binding_document_hash(&normalize_subject(subject), doc_type, &data),
            timestamp: "2025-04-10T00:00:00Z".into(),
        }
    }

    fn self_input(subject: &str) -> CreateBindingDocument {
        let data = json!({"name": "Ada"});
        CreateBindingDocument {
            subject: subject.into(),
            doc_type: BindingDocumentType::SelfDeclared,
            data: data.clone(),
            owner_signature: hash_signature(subject, BindingDocumentType::SelfDeclared, &data, "@alice"),
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_subject_and_scopes_acl() {
        let service = service();
        let (id, document) = service.create(self_input("alice"), TENANT).await.unwrap();
        assert_eq!(document.subject, "@alice");
        assert_eq!(document.signatures.len(), 1);

        let record = service.get(&id, TENANT).await.unwrap().unwrap();
        assert_eq!(record.acl, vec!["@alice".to_string()], "acl scoped to the subject");
        assert_eq!(record.document, document);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_owner_signature() {
        let service = service();
        let mut input = self_input("alice");
        input.owner_signature.signature = "not-the-hash".into();
        assert!(matches!(
            service.create(input, TENANT).await,
            Err(BindingError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_counterparty_signing_and_duplicate_rejection() {
        let service = service();
        let data = json!({"name": "Ada"});
        let (id, _) = service.create(self_input("alice"), TENANT).await.unwrap();

        let counter = hash_signature("alice", BindingDocumentType::SelfDeclared, &data, "@bob");
        let document = service
            .add_counterparty_signature(&id, counter.clone(), TENANT)
            .await
            .unwrap();
        assert_eq!(document.signatures.len(), 2);

        // The same signer cannot sign twice, and the stored set is unchanged.
        let err = service
            .add_counterparty_signature(&id, counter, TENANT)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::DuplicateSigner(_)));
        let record = service.get(&id, TENANT).await.unwrap().unwrap();
        assert_eq!(record.document.signatures.len(), 2);
    }

    #[tokio::test]
    async fn test_counterparty_signature_must_be_canonical_hash() {
        let service = service();
        let (id, _) = service.create(self_input("alice"), TENANT).await.unwrap();
        let bad = BindingSignature {
            signer: "@bob".into(),
            signature: "wrong".into(),
            timestamp: "2025-04-10T00:00:00Z".into(),
        };
        assert!(matches!(
            service.add_counterparty_signature(&id, bad, TENANT).await,
            Err(BindingError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_social_connection_counterparty_must_be_subject() {
        let service = service();
        let data = json!({"name": "Bob"});
        let input = CreateBindingDocument {
            subject: "@bob".into(),
            doc_type: BindingDocumentType::SocialConnection,
            data: data.clone(),
            owner_signature: hash_signature("@bob", BindingDocumentType::SocialConnection, &data, "@alice"),
        };
        let (id, _) = service.create(input, TENANT).await.unwrap();

        let wrong = hash_signature("@bob", BindingDocumentType::SocialConnection, &data, "@carol");
        assert!(matches!(
            service.add_counterparty_signature(&id, wrong, TENANT).await,
            Err(BindingError::Validation(_))
        ));

        let right = hash_signature("@bob", BindingDocumentType::SocialConnection, &data, "@bob");
        assert!(service.add_counterparty_signature(&id, right, TENANT).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_and_foreign_ontologies() {
        let service = BindingDocumentService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticKeyFetcher::default()),
        );
        assert!(service.get("missing", TENANT).await.unwrap().is_none());

        // A record under a different ontology is not a binding document.
        let store = Arc::new(MemoryStore::new());
        let mut payload = palisade_store::Payload::new();
        payload.insert("k".into(), palisade_store::FieldValue::String("v".into()));
        let result = store
            .store("some-ontology", &payload, &["*".to_string()], TENANT)
            .await
            .unwrap();
        let service =
            BindingDocumentService::new(store, Arc::new(StaticKeyFetcher::default()));
        assert!(service.get(&result.meta.id, TENANT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_filters_by_type_in_the_query() {
        let service = service();
        service.create(self_input("alice"), TENANT).await.unwrap();
        let data = json!({"photoBlob": "base64-bytes"});
        let photo = CreateBindingDocument {
            subject: "alice".into(),
            doc_type: BindingDocumentType::Photograph,
            data: data.clone(),
            owner_signature: hash_signature("alice", BindingDocumentType::Photograph, &data, "@alice"),
        };
        service.create(photo, TENANT).await.unwrap();

        let all = service.find(TENANT, None, &PageArgs::forward(10)).await.unwrap();
        assert_eq!(all.total_count, 2);

        let photos = service
            .find(TENANT, Some(BindingDocumentType::Photograph), &PageArgs::forward(10))
            .await
            .unwrap();
        assert_eq!(photos.total_count, 1);
        assert_eq!(photos.edges[0].node.document.doc_type, BindingDocumentType::Photograph);
    }
}

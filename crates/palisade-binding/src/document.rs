//! Binding-document data model and validation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use palisade_store::{FieldValue, MetaEnvelope, Payload};

use crate::error::BindingError;

/// The reserved ontology under which binding documents are stored.
pub const BINDING_DOCUMENT_ONTOLOGY: &str = "b1d0a8c3-4e5f-6789-0abc-def012345678";

/// What a binding document binds the subject to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingDocumentType {
    IdDocument,
    Photograph,
    SocialConnection,
    #[serde(rename = "self")]
    SelfDeclared,
}

impl BindingDocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdDocument => "id_document",
            Self::Photograph => "photograph",
            Self::SocialConnection => "social_connection",
            Self::SelfDeclared => "self",
        }
    }
}

/// The per-type data variant, as a tagged union.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingDocumentData {
    IdDocument { vendor: String, reference: String, name: String },
    Photograph { photo_blob: String },
    SocialConnection { name: String },
    SelfDeclared { name: String },
}

impl BindingDocumentData {
    /// Validate raw JSON data against the declared document type.
    pub fn from_json(doc_type: BindingDocumentType, data: &Json) -> Result<Self, BindingError> {
        let Json::Object(map) = data else {
            return Err(BindingError::Validation("binding document data must be an object".into()));
        };
        let string_field = |key: &str| -> Result<String, BindingError> {
            map.get(key)
                .and_then(Json::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    BindingError::Validation(format!(
                        "{} data must have string field: {key}",
                        doc_type.as_str()
                    ))
                })
        };
        match doc_type {
            BindingDocumentType::IdDocument => Ok(Self::IdDocument {
                vendor: string_field("vendor")?,
                reference: string_field("reference")?,
                name: string_field("name")?,
            }),
            BindingDocumentType::Photograph => Ok(Self::Photograph {
                photo_blob: string_field("photoBlob")?,
            }),
            BindingDocumentType::SocialConnection => Ok(Self::SocialConnection {
                name: string_field("name")?,
            }),
            BindingDocumentType::SelfDeclared => Ok(Self::SelfDeclared {
                name: string_field("name")?,
            }),
        }
    }

    /// The wire shape of this variant. Social-connection and self data carry
    /// an explicit `kind` tag.
    pub fn to_json(&self) -> Json {
        match self {
            Self::IdDocument { vendor, reference, name } => {
                json!({ "vendor": vendor, "reference": reference, "name": name })
            }
            Self::Photograph { photo_blob } => json!({ "photoBlob": photo_blob }),
            Self::SocialConnection { name } => {
                json!({ "kind": "social_connection", "name": name })
            }
            Self::SelfDeclared { name } => json!({ "kind": "self", "name": name }),
        }
    }

    pub fn doc_type(&self) -> BindingDocumentType {
        match self {
            Self::IdDocument { .. } => BindingDocumentType::IdDocument,
            Self::Photograph { .. } => BindingDocumentType::Photograph,
            Self::SocialConnection { .. } => BindingDocumentType::SocialConnection,
            Self::SelfDeclared { .. } => BindingDocumentType::SelfDeclared,
        }
    }
}

/// One signature over the canonical document form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BindingSignature {
    pub signer: String,
    pub signature: String,
    pub timestamp: String,
}

/// A signed claim binding a subject to an identity attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingDocument {
    /// The subject's tenant identifier, always `@`-prefixed.
    pub subject: String,
    pub doc_type: BindingDocumentType,
    pub data: BindingDocumentData,
    /// Owner signature first; counterparties append. One entry per signer.
    pub signatures: Vec<BindingSignature>,
}

impl BindingDocument {
    /// The signable form: everything except the signatures.
    pub fn signable_json(&self) -> Json {
        json!({
            "subject": self.subject,
            "type": self.doc_type.as_str(),
            "data": self.data.to_json(),
        })
    }

    /// Render as the meta-envelope payload it is stored as.
    pub fn to_payload(&self) -> Result<Payload, BindingError> {
        let mut payload = Payload::new();
        payload.insert("subject".into(), FieldValue::String(self.subject.clone()));
        payload.insert("type".into(), FieldValue::String(self.doc_type.as_str().into()));
        let Json::Object(data) = self.data.to_json() else {
            return Err(BindingError::Malformed("data must render as an object".into()));
        };
        payload.insert("data".into(), FieldValue::Object(data));
        let signatures: Vec<Json> = self
            .signatures
            .iter()
            .map(|s| serde_json::to_value(s).map_err(|e| BindingError::Malformed(e.to_string())))
            .collect::<Result<_, _>>()?;
        payload.insert("signatures".into(), FieldValue::Array(signatures));
        Ok(payload)
    }

    /// Parse a stored meta-envelope back into a document.
    pub fn from_meta(meta: &MetaEnvelope) -> Result<Self, BindingError> {
        let payload = meta.payload_json();
        let Json::Object(map) = &payload else {
            return Err(BindingError::Malformed("payload is not an object".into()));
        };
        let subject = map
            .get("subject")
            .and_then(Json::as_str)
            .ok_or_else(|| BindingError::Malformed("missing subject".into()))?
            .to_string();
        let doc_type: BindingDocumentType = map
            .get("type")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| BindingError::Malformed(e.to_string()))?
            .ok_or_else(|| BindingError::Malformed("missing type".into()))?;
        let data = BindingDocumentData::from_json(
            doc_type,
            map.get("data").unwrap_or(&Json::Object(Map::new())),
        )?;
        let signatures: Vec<BindingSignature> = map
            .get("signatures")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| BindingError::Malformed(e.to_string()))?
            .ok_or_else(|| BindingError::Malformed("missing signatures".into()))?;
        Ok(Self { subject, doc_type, data, signatures })
    }
}

/// Subjects always carry the tenant marker prefix.
pub fn normalize_subject(subject: &str) -> String {
    if subject.starts_with('@') {
        subject.to_string()
    } else {
        format!("@{subject}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&BindingDocumentType::SelfDeclared).unwrap(),
            "\"self\""
        );
        assert_eq!(
            serde_json::from_str::<BindingDocumentType>("\"id_document\"").unwrap(),
            BindingDocumentType::IdDocument
        );
    }

    #[test]
    fn test_data_validation_per_type() {
        let ok = BindingDocumentData::from_json(
            BindingDocumentType::IdDocument,
            &json!({"vendor": "v", "reference": "r", "name": "n"}),
        );
        assert!(ok.is_ok());

        let missing = BindingDocumentData::from_json(
            BindingDocumentType::IdDocument,
            &json!({"vendor": "v"}),
        );
        assert!(matches!(missing, Err(BindingError::Validation(_))));

        let not_object =
            BindingDocumentData::from_json(BindingDocumentType::Photograph, &json!("flat"));
        assert!(matches!(not_object, Err(BindingError::Validation(_))));
    }

    #[test]
    fn test_tagged_variants_carry_kind() {
        let data = BindingDocumentData::SocialConnection { name: "bob".into() };
        assert_eq!(data.to_json(), json!({"kind": "social_connection", "name": "bob"}));
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("alice"), "@alice");
        assert_eq!(normalize_subject("@alice"), "@alice");
    }

    #[test]
    fn test_payload_round_trip() {
        let doc = BindingDocument {
            subject: "@alice".into(),
            doc_type: BindingDocumentType::SelfDeclared,
            data: BindingDocumentData::SelfDeclared { name: "Ada".into() },
            signatures: vec![BindingSignature {
                signer: "@alice".into(),
                signature: "sig".into(),
                timestamp: "2025-04-10T00:00:00Z".into(),
            }],
        };
        let payload = doc.to_payload().unwrap();
        let meta = MetaEnvelope {
            id: "m1".into(),
            ontology: BINDING_DOCUMENT_ONTOLOGY.into(),
            acl: vec!["@alice".into()],
            envelopes: payload
                .iter()
                .map(|(key, value)| palisade_store::Envelope {
                    id: format!("e-{key}"),
                    ontology: key.clone(),
                    value: value.clone(),
                    value_type: value.value_type(),
                })
                .collect(),
        };
        assert_eq!(BindingDocument::from_meta(&meta).unwrap(), doc);
    }
}

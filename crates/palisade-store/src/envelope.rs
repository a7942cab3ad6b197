//! Meta-envelope and envelope records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::value::{FieldValue, ValueType};

/// A payload is one runtime value per top-level field key.
pub type Payload = BTreeMap<String, FieldValue>;

/// A single typed field within a meta-envelope.
///
/// `ontology` holds the field key of the payload entry this envelope stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub ontology: String,
    pub value: FieldValue,
    #[serde(rename = "valueType")]
    pub value_type: ValueType,
}

/// A tenant-owned record grouping typed fields under one id and ontology,
/// as returned by reads: all envelopes, plus the ACL for the authorization
/// layer. The ACL is stripped before anything reaches a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaEnvelope {
    pub id: String,
    pub ontology: String,
    pub acl: Vec<String>,
    pub envelopes: Vec<Envelope>,
}

impl MetaEnvelope {
    /// Reassemble the payload from the envelope set.
    pub fn payload(&self) -> Payload {
        self.envelopes
            .iter()
            .map(|e| (e.ontology.clone(), e.value.clone()))
            .collect()
    }

    /// The payload as a JSON object (dates rendered as RFC 3339 strings).
    pub fn payload_json(&self) -> Json {
        let map: Map<String, Json> = self
            .envelopes
            .iter()
            .map(|e| (e.ontology.clone(), e.value.to_json()))
            .collect();
        Json::Object(map)
    }
}

/// The meta-envelope head written by a store or update operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMeta {
    pub id: String,
    pub ontology: String,
    pub acl: Vec<String>,
}

/// Result of a store or update operation: the head plus the envelope set
/// that was written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreResult {
    pub meta: StoredMeta,
    pub envelopes: Vec<Envelope>,
}

/// The owning meta-envelope of a single envelope, resolved by envelope id.
/// Used when logging single-field updates, where the caller only has the
/// envelope id.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvelopeOwner {
    pub meta_envelope_id: String,
    pub ontology: String,
}

/// Convert a JSON object into a payload. Rejects non-objects and null
/// field values.
pub fn payload_from_json(value: &Json) -> Result<Payload, crate::error::StoreError> {
    let Json::Object(map) = value else {
        return Err(crate::error::StoreError::InvalidPayload);
    };
    let mut payload = Payload::new();
    for (key, field) in map {
        payload.insert(key.clone(), FieldValue::try_from(field.clone())?);
    }
    Ok(payload)
}

/// Render a payload as a JSON object.
pub fn payload_to_json(payload: &Payload) -> Json {
    Json::Object(
        payload
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_from_json_rejects_non_objects() {
        assert!(payload_from_json(&json!([1, 2])).is_err());
        assert!(payload_from_json(&json!("flat")).is_err());
    }

    #[test]
    fn test_payload_from_json_rejects_null_fields() {
        assert!(payload_from_json(&json!({"a": null})).is_err());
    }

    #[test]
    fn test_payload_json_round_trip() {
        let json = json!({"name": "ada", "tags": ["x", "y"], "count": 2.0});
        let payload = payload_from_json(&json).unwrap();
        assert_eq!(payload_to_json(&payload), json);
    }
}

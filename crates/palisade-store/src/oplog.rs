//! Append-only operation log types.
//!
//! Every mutation leaves a hash-annotated trail entry. Entries are never
//! updated or deleted; divergence between a re-derived hash and the logged
//! one is evidence the mutable record was altered out of band.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The mutation kind a log entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    UpdateEnvelopeValue,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::UpdateEnvelopeValue => "update_envelope_value",
        }
    }
}

/// A single operation log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogEntry {
    pub id: String,
    pub e_name: String,
    pub meta_envelope_id: String,
    pub envelope_hash: String,
    pub operation: Operation,
    pub platform: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology: Option<String>,
}

/// Parameters for appending a log entry. The entry id is minted by the
/// store on append.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationLogAppend {
    pub e_name: String,
    pub meta_envelope_id: String,
    pub envelope_hash: String,
    pub operation: Operation,
    pub platform: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub ontology: Option<String>,
}

/// One page of log entries, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogPage {
    pub logs: Vec<OperationLogEntry>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Cursor format: `"timestamp|id"`. `|` keeps the separator out of the
/// colons in RFC 3339 timestamps.
pub(crate) fn log_cursor(entry: &OperationLogEntry) -> String {
    format!("{}|{}", entry.timestamp.to_rfc3339(), entry.id)
}

pub(crate) fn parse_log_cursor(cursor: &str) -> Option<(DateTime<Utc>, String)> {
    let (ts, id) = cursor.split_once('|')?;
    let ts = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    Some((ts, id.to_string()))
}

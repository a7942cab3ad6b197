//! Relay-style cursor pagination and query filters.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// How a search term matches an envelope value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    /// Match if the term appears anywhere in the value.
    #[default]
    Contains,
    /// Match if the value starts with the term.
    StartsWith,
    /// Match only exact values.
    Exact,
}

/// A search over envelope values, optionally restricted to specific fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchInput {
    pub term: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchInput {
    /// A case-insensitive CONTAINS search over all fields.
    pub fn contains(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            case_sensitive: false,
            fields: None,
            mode: SearchMode::Contains,
        }
    }

    /// Whether a value's textual form matches this search.
    pub fn matches(&self, text: &str) -> bool {
        let (value, term) = if self.case_sensitive {
            (text.to_string(), self.term.clone())
        } else {
            (text.to_lowercase(), self.term.to_lowercase())
        };
        match self.mode {
            SearchMode::Contains => value.contains(&term),
            SearchMode::StartsWith => value.starts_with(&term),
            SearchMode::Exact => value == term,
        }
    }
}

/// Filter criteria for paginated meta-envelope queries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaFilter {
    pub ontology_id: Option<String>,
    pub search: Option<SearchInput>,
}

/// Forward/backward pagination arguments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageArgs {
    pub first: Option<u32>,
    pub after: Option<String>,
    pub last: Option<u32>,
    pub before: Option<String>,
}

impl PageArgs {
    pub fn forward(first: u32) -> Self {
        Self { first: Some(first), ..Self::default() }
    }

    pub fn forward_after(first: u32, after: impl Into<String>) -> Self {
        Self { first: Some(first), after: Some(after.into()), ..Self::default() }
    }

    pub fn backward(last: u32) -> Self {
        Self { last: Some(last), ..Self::default() }
    }
}

/// Pagination state for a connection page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// One node plus its opaque position cursor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

/// A page of results with pagination state and the total match count
/// (counted without cursor bounds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

impl<T> Connection<T> {
    pub fn empty() -> Self {
        Self { edges: Vec::new(), page_info: PageInfo::default(), total_count: 0 }
    }

    /// Map every node, keeping cursors and pagination state.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Connection<U> {
        let mut f = f;
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|e| Edge { cursor: e.cursor, node: f(e.node) })
                .collect(),
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}

/// Encode a record id as an opaque cursor.
pub fn encode_cursor(id: &str) -> String {
    BASE64.encode(id.as_bytes())
}

/// Decode an opaque cursor back to a record id.
pub fn decode_cursor(cursor: &str) -> Result<String, StoreError> {
    let bytes = BASE64.decode(cursor).map_err(|_| StoreError::InvalidCursor)?;
    String::from_utf8(bytes).map_err(|_| StoreError::InvalidCursor)
}

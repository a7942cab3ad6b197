//! # Palisade Store
//!
//! Graph-backed storage for meta-envelopes and their typed field envelopes.
//!
//! Every record belongs to exactly one tenant (its `eName`) and every store
//! operation requires a non-empty tenant identifier. Records that exist but
//! belong to another tenant are indistinguishable from records that do not
//! exist: reads return `None`/empty, writes are silent no-ops. The store
//! never answers "forbidden" — authorization is decided one layer up.
//!
//! ## Features
//!
//! - **Value codec**: lossless round-tripping of string, number, boolean,
//!   date, array, and object field values through a schemaless property graph
//! - **EnvelopeStore trait**: async storage abstraction with tenant-scoped
//!   CRUD, search, and Relay-style pagination
//! - **MemoryStore**: in-memory graph implementation (meta nodes, envelope
//!   nodes, `LINKS_TO` adjacency)
//! - **Operation log**: append-only, hash-annotated record of every mutation
//! - **Canonical hashing**: deterministic SHA-256 digests over key-sorted JSON

pub mod canon;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod oplog;
pub mod page;
pub mod store;
pub mod value;

pub use canon::{canonical_json, compute_envelope_hash, compute_envelope_hash_for_delete};
pub use envelope::{Envelope, EnvelopeOwner, MetaEnvelope, Payload, StoreResult, StoredMeta};
pub use error::{CodecError, StoreError};
pub use memory::MemoryStore;
pub use oplog::{Operation, OperationLogAppend, OperationLogEntry, OperationLogPage};
pub use page::{Connection, Edge, MetaFilter, PageArgs, PageInfo, SearchInput, SearchMode};
pub use store::{copy_tenant, EnvelopeStore};
pub use value::{decode, encode, FieldValue, StoredValue, ValueType};

//! Key-value data layer for Lineage.
//!
//! Every record Lineage writes lives in a named bucket of a key-value store
//! that may hold several conflicting values ("siblings") for one key. This
//! crate defines that contract and ships two backends for it.
//!
//! # Architecture
//!
//! ```text
//! ActorStore / EventStore
//!     |
//!     +-- Backend::bucket(name) --> Bucket
//!         |-- get(key)                    -> Lookup (not found | siblings + context)
//!         |-- put(key, doc, indexes, ctx) -> supersedes the dots named by ctx
//!         +-- get_by_index(name, value, range)
//! ```
//!
//! # Modules
//!
//! - [`kv`] -- The [`Backend`] / [`Bucket`] traits and the values they exchange
//! - [`memory`] -- In-process backend with sibling semantics and fault injection
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod kv;
pub mod memory;

// Re-export primary types for convenience.
pub use dragonfly::{DragonflyBackend, DragonflyBucket};
pub use error::DbError;
pub use kv::{Backend, Bucket, CausalContext, IndexRange, Indexes, Lookup, StoredDoc};
pub use memory::{MemoryBackend, MemoryBucket};

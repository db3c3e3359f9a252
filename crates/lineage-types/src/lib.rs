//! Shared type definitions for Lineage.
//!
//! This crate is the single source of truth for the records that flow
//! between the storage backends (`lineage-db`), the versioned actor store
//! (`lineage-actors`) and the event log (`lineage-events`).
//!
//! # Modules
//!
//! - [`ids`] -- String identifier wrappers for actors, events and event packs
//! - [`clock`] -- Canonical version clock compared by structural equality
//! - [`records`] -- Stored document shapes and secondary index names
//! - [`id_gen`] -- Process-wide sortable identifier generator

pub mod clock;
pub mod id_gen;
pub mod ids;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use clock::Clock;
pub use id_gen::IdGenerator;
pub use ids::{ActorId, EventId, EventPackId};
pub use records::{ActorRecord, EventPackRecord, EventRecord, composite_key, snapshot_key};

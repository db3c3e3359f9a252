//! Versioned actor storage for Lineage.
//!
//! Every write of an actor produces two records in the actor bucket: an
//! immutable snapshot keyed by `{actor_id}-{clock}` and the mutable current
//! record keyed by the actor id. Each version remembers the clock it was
//! derived from, which forms a parent-pointer chain through the snapshots.
//!
//! When concurrent writers leave several current records behind, the
//! [`AncestorResolver`] walks those chains in lock-step rounds until they
//! meet and returns the nearest common ancestor.
//!
//! # Modules
//!
//! - [`actor_store`] -- [`ActorStore`]: fetch, store, snapshots, repair
//! - [`ancestor`] -- [`AncestorResolver`]: round-based common ancestor search
//! - [`error`] -- [`ActorError`]

pub mod actor_store;
pub mod ancestor;
pub mod error;

pub use actor_store::{ActorStore, ActorVersions, PriorVersion, Reconciliation, StoreReceipt};
pub use ancestor::{AncestorResolver, Resolution, ResolverConfig};
pub use error::ActorError;

//! Event storage for Lineage aggregates.
//!
//! Events are immutable once written. Each aggregate has two views of its
//! history:
//!
//! - the **event log**: one record per event, keyed by a generated sortable
//!   id and range-scanned by `{aggregate_id}-{event_id}` for "events since"
//!   queries;
//! - **event packs**: a whole batch of events stored as one record tagged
//!   with the actor clock it belongs to.
//!
//! # Modules
//!
//! - [`store`] -- [`EventStore`] handle shared by both views
//! - [`event_log`] -- append and range reads of single events
//! - [`event_pack`] -- batch writes and lookups by clock
//! - [`error`] -- [`EventError`]

pub mod error;
pub mod event_log;
pub mod event_pack;
pub mod store;

pub use error::EventError;
pub use store::EventStore;

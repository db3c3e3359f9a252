//! The [`EventStore`] handle.

use std::sync::Arc;

use lineage_db::Bucket;
use lineage_types::IdGenerator;

/// Event log and event packs of one actor type.
///
/// Clones share the same buckets and id generator.
#[derive(Debug, Clone)]
pub struct EventStore<K: Bucket> {
    pub(crate) events: K,
    pub(crate) packs: K,
    pub(crate) ids: Arc<IdGenerator>,
}

impl<K: Bucket> EventStore<K> {
    /// Create a store writing single events to `events` and batches to
    /// `packs`, drawing ids from `ids`.
    pub const fn new(events: K, packs: K, ids: Arc<IdGenerator>) -> Self {
        Self { events, packs, ids }
    }

    /// Bucket holding single event records.
    pub const fn events_bucket(&self) -> &K {
        &self.events
    }

    /// Bucket holding event packs.
    pub const fn packs_bucket(&self) -> &K {
        &self.packs
    }
}

//! Bucket name derivation.
//!
//! | Store | Default bucket |
//! |-------|----------------|
//! | actors | `<type>` |
//! | events | `<type>_events` |
//! | event packs | `<type>_event_packs` |
//!
//! `<type>` is the lowercased actor type. A configured override replaces
//! the default, and a prefix is then applied to either as
//! `<prefix>_<bucket>`.

use crate::config::StoreBuckets;

/// Bucket names used by the stores of one actor type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
    /// Current records and snapshots.
    pub actors: String,
    /// Single events.
    pub events: String,
    /// Event packs.
    pub event_packs: String,
}

impl BucketNames {
    /// Resolve the bucket names for `actor_type`.
    pub fn resolve(
        actor_type: &str,
        prefix: Option<&str>,
        overrides: Option<&StoreBuckets>,
    ) -> Self {
        let base = actor_type.to_lowercase();
        let pick = |configured: Option<&String>, default: String| {
            prefixed(prefix, configured.cloned().unwrap_or(default))
        };

        Self {
            actors: pick(overrides.and_then(|o| o.actor_bucket.as_ref()), base.clone()),
            events: pick(
                overrides.and_then(|o| o.event_bucket.as_ref()),
                format!("{base}_events"),
            ),
            event_packs: pick(
                overrides.and_then(|o| o.event_pack_bucket.as_ref()),
                format!("{base}_event_packs"),
            ),
        }
    }
}

/// Apply `prefix` to `bucket`. An empty prefix counts as none.
pub fn prefixed(prefix: Option<&str>, bucket: String) -> String {
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}_{bucket}"),
        None => bucket,
    }
}

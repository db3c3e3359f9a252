//! Stored document shapes and their secondary index names.
//!
//! # Key Patterns
//!
//! | Record | Key | Indexes |
//! |--------|-----|---------|
//! | Actor (current) | `{actor_id}` | none |
//! | Actor (snapshot) | `{actor_id}-{clock}` | `aggregate_id` |
//! | Event | `{event_id}` | `aggregate_id`, `aggregate_event_id` |
//! | Event pack | `{pack_id}` | `aggregate_id`, `aggregate_clock`, `aggregate_pack_id` |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::ids::{ActorId, EventId, EventPackId};

/// Index holding the owning actor id on snapshots, events and packs.
pub const AGGREGATE_ID_INDEX: &str = "aggregate_id";

/// Index holding `{aggregate_id}-{event_id}` on events.
pub const AGGREGATE_EVENT_ID_INDEX: &str = "aggregate_event_id";

/// Index holding `{aggregate_id}-{clock}` on event packs.
pub const AGGREGATE_CLOCK_INDEX: &str = "aggregate_clock";

/// Index holding `{aggregate_id}-{pack_id}` on event packs.
pub const AGGREGATE_PACK_ID_INDEX: &str = "aggregate_pack_id";

/// Join an aggregate id and a suffix with `-`.
pub fn composite_key(aggregate_id: &ActorId, suffix: impl core::fmt::Display) -> String {
    format!("{aggregate_id}-{suffix}")
}

/// Storage key of the snapshot written for `actor_id` at `clock`.
pub fn snapshot_key(actor_id: &ActorId, clock: &Clock) -> String {
    composite_key(actor_id, clock)
}

/// One version of an actor, either the current record or a snapshot.
///
/// Fields other than `id`, `vector` and `ancestor` belong to the host's
/// payload and are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    /// The actor this version belongs to.
    pub id: ActorId,
    /// Clock at which this version was written.
    pub vector: Clock,
    /// Clock of the version this one was derived from; `None` for the root.
    #[serde(default)]
    pub ancestor: Option<Clock>,
    /// Host payload fields.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl ActorRecord {
    /// Whether this version has no recorded predecessor.
    pub const fn is_root(&self) -> bool {
        self.ancestor.is_none()
    }

    /// Key of the snapshot holding this version.
    pub fn snapshot_key(&self) -> String {
        snapshot_key(&self.id, &self.vector)
    }

    /// Decode the whole record into a host type.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] raised by the conversion.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }
}

/// A single event appended to an aggregate's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Generated, sortable event id.
    pub id: EventId,
    /// The aggregate the event belongs to.
    pub aggregate_id: ActorId,
    /// Host event payload.
    pub event: serde_json::Value,
}

/// A batch of events stored as one record for a given actor version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPackRecord {
    /// Generated, sortable pack id.
    pub id: EventPackId,
    /// The aggregate the pack belongs to.
    pub aggregate_id: ActorId,
    /// Embedded event payloads in the order they were stored.
    pub events: Vec<serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn actor_record_keeps_payload_fields() {
        let raw = json!({
            "id": "board-1",
            "vector": { "A": 2 },
            "ancestor": { "A": 1 },
            "name": "a board",
            "lanes": 3
        });
        let record: ActorRecord =
            serde_json::from_value(raw.clone()).expect("record should decode");

        assert_eq!(record.id.as_str(), "board-1");
        assert_eq!(record.ancestor, Some(Clock::from_entries([("A", 1)])));
        assert_eq!(record.payload.get("name"), Some(&json!("a board")));
        assert_eq!(serde_json::to_value(&record).ok(), Some(raw));
    }

    #[test]
    fn root_record_has_null_ancestor() {
        let record: Result<ActorRecord, _> = serde_json::from_value(json!({
            "id": "board-1",
            "vector": { "A": 1 },
            "ancestor": null
        }));
        assert!(record.is_ok_and(|r| r.is_root()));
    }

    #[test]
    fn snapshot_key_joins_id_and_clock() {
        let id = ActorId::from("board-1");
        let clock = Clock::from_entries([("B", 1), ("A", 2)]);
        assert_eq!(snapshot_key(&id, &clock), "board-1-A:2,B:1");
    }

    #[test]
    fn distinct_clocks_get_distinct_snapshot_keys() {
        let id = ActorId::from("b1");
        let plain = snapshot_key(&id, &Clock::from_entries([("A", 1), ("B", 1)]));
        let joined = snapshot_key(&id, &Clock::from_entries([("A:1,B", 1)]));
        assert_eq!(plain, "b1-A:1,B:1");
        assert_ne!(plain, joined);
    }

    #[test]
    fn decode_into_host_type() {
        #[derive(Deserialize)]
        struct Board {
            name: String,
            vector: Clock,
        }

        let record = ActorRecord {
            id: ActorId::from("board-1"),
            vector: Clock::new().incremented("A"),
            ancestor: None,
            payload: serde_json::Map::from_iter([("name".to_owned(), json!("a board"))]),
        };
        let board = record.decode::<Board>().ok();
        assert_eq!(board.as_ref().map(|b| b.name.as_str()), Some("a board"));
        assert_eq!(board.map(|b| b.vector), Some(Clock::new().incremented("A")));
    }
}

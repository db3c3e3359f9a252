//! Error types for actor storage and ancestor resolution.

use lineage_db::DbError;
use lineage_types::{ActorId, Clock};

/// Errors that can occur while storing, fetching or reconciling actors.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// The key-value store failed.
    #[error("storage error: {0}")]
    Db(#[from] DbError),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Nothing is stored under the key.
    #[error("record not found: {key}")]
    NotFound {
        /// The key that was read.
        key: String,
    },

    /// Several siblings were stored where exactly one was required.
    #[error("conflicting siblings at {key}: {count} values")]
    Conflict {
        /// The key that was read.
        key: String,
        /// Number of siblings found.
        count: usize,
    },

    /// The actor payload did not serialize to a JSON object, or its `id`
    /// is not a string.
    #[error("actor payload must serialize to a JSON object with a string id")]
    InvalidPayload,

    /// One or both of the snapshot and current-record writes failed.
    ///
    /// Writes that succeeded are not rolled back.
    #[error("partial write for actor {actor_id}: written {written:?}, failed {failed:?}: {message}")]
    PartialWrite {
        /// The actor being stored.
        actor_id: ActorId,
        /// Keys that were written.
        written: Vec<String>,
        /// Keys whose write failed.
        failed: Vec<String>,
        /// Backend error messages for the failed writes.
        message: String,
    },

    /// Ancestor resolution was asked to reconcile an empty sibling set.
    #[error("no siblings supplied for actor {actor_id}")]
    NoSiblings {
        /// The actor being reconciled.
        actor_id: ActorId,
    },

    /// Every ancestor chain ended without meeting the others.
    #[error("no common ancestor for actor {actor_id} after {rounds} rounds")]
    NoCommonAncestor {
        /// The actor being reconciled.
        actor_id: ActorId,
        /// Rounds completed before the last chain closed.
        rounds: usize,
    },

    /// A chain led back to a clock it had already visited.
    #[error("ancestor cycle detected for actor {actor_id} at clock {clock}")]
    CycleDetected {
        /// The actor being reconciled.
        actor_id: ActorId,
        /// The clock seen twice.
        clock: Clock,
    },

    /// Chains were still open after the configured number of rounds.
    #[error("ancestor search for actor {actor_id} exceeded {max_rounds} rounds")]
    DepthExceeded {
        /// The actor being reconciled.
        actor_id: ActorId,
        /// The configured round limit.
        max_rounds: usize,
    },
}

//! Error types for event storage.

use lineage_db::DbError;
use lineage_types::ActorId;

/// Errors that can occur while storing or reading events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The key-value store failed.
    #[error("storage error: {0}")]
    Db(#[from] DbError),

    /// An event or record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record matched the lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// Some records of a batch were written and others were not.
    ///
    /// Written records are not rolled back.
    #[error("partial write for {aggregate_id}: {} written, {} failed: {message}", written.len(), failed.len())]
    PartialWrite {
        /// The aggregate the batch belonged to.
        aggregate_id: ActorId,
        /// Keys that were written.
        written: Vec<String>,
        /// Keys whose write failed.
        failed: Vec<String>,
        /// The underlying storage errors.
        message: String,
    },
}

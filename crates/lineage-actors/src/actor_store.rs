//! Storage of versioned actors in a single bucket.
//!
//! # Write Protocol
//!
//! ```text
//! store(id, clock, actor)
//!   |
//!   +-- ancestor := actor.vector, vector := clock
//!   +-- concurrently read:
//!   |   |-- current record at `{id}` (missing / single / siblings)
//!   |   +-- snapshot at `{id}-{clock}` (left by an earlier attempt)
//!   |
//!   +-- concurrently:
//!       |-- put `{id}-{clock}` (snapshot, indexed by aggregate_id,
//!       |                       superseding an earlier attempt)
//!       +-- put `{id}`         (current, superseding a single prior version)
//! ```
//!
//! The two writes are not transactional. A failure of either surfaces as
//! [`ActorError::PartialWrite`]; a current record left behind by a failed
//! write can be re-derived with [`ActorStore::restore_from_snapshot`], or
//! the same `store` call can be retried. A retry replaces the snapshot it
//! finds at `{id}-{clock}`, so the snapshot key keeps a single value.

use lineage_db::{Bucket, CausalContext, IndexRange, Indexes, Lookup};
use lineage_types::records::AGGREGATE_ID_INDEX;
use lineage_types::{ActorId, ActorRecord, Clock, snapshot_key};
use serde::Serialize;
use serde_json::Value;

use crate::ancestor::{AncestorResolver, ResolverConfig};
use crate::error::ActorError;

/// Result of reading an actor's current key.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorVersions {
    /// Exactly one current version.
    Single(ActorRecord),
    /// Concurrent writes left several unreconciled versions.
    Conflicting(Vec<ActorRecord>),
}

/// What `store` found under the current key before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorVersion {
    /// No current record existed (or it could not be read).
    Missing,
    /// One current record existed and was superseded.
    Single {
        /// Its `vector`, if it carried a readable one.
        vector: Option<Clock>,
    },
    /// Several siblings existed; the write was added next to them.
    Conflicting {
        /// Number of siblings found.
        siblings: usize,
    },
}

/// Acknowledgement of a successful `store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    /// Key of the snapshot written for the new version.
    pub snapshot_key: String,
    /// State of the current key before the write.
    pub prior: PriorVersion,
}

/// Result of [`ActorStore::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The current key held a single version.
    Clean(ActorRecord),
    /// The current key held siblings; their nearest common ancestor is
    /// returned next to them for the caller to merge.
    Diverged {
        /// Snapshot of the nearest common ancestor.
        ancestor: ActorRecord,
        /// The conflicting current versions.
        siblings: Vec<ActorRecord>,
    },
}

/// Stores current records and immutable snapshots of one actor type.
#[derive(Debug, Clone)]
pub struct ActorStore<K: Bucket> {
    name: String,
    bucket: K,
    resolver: ResolverConfig,
}

impl<K: Bucket> ActorStore<K> {
    /// Create a store for actor type `name` backed by `bucket`.
    pub fn new(name: impl Into<String>, bucket: K) -> Self {
        Self {
            name: name.into(),
            bucket,
            resolver: ResolverConfig::default(),
        }
    }

    /// Set the limits used by ancestor resolution.
    #[must_use]
    pub const fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Actor type this store was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying bucket.
    pub const fn bucket(&self) -> &K {
        &self.bucket
    }

    /// Read the current record of `actor_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::NotFound`] if the actor was never stored, or
    /// the storage/decoding error.
    pub async fn fetch(&self, actor_id: &ActorId) -> Result<ActorVersions, ActorError> {
        self.fetch_key(actor_id.as_str()).await
    }

    /// Read the snapshot of `actor_id` written at `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::NotFound`] if no such snapshot exists and
    /// [`ActorError::Conflict`] if the snapshot key holds siblings.
    pub async fn fetch_version(
        &self,
        actor_id: &ActorId,
        clock: &Clock,
    ) -> Result<ActorRecord, ActorError> {
        let key = snapshot_key(actor_id, clock);
        match self.fetch_key(&key).await? {
            ActorVersions::Single(record) => Ok(record),
            ActorVersions::Conflicting(records) => Err(ActorError::Conflict {
                key,
                count: records.len(),
            }),
        }
    }

    /// Every snapshot of `actor_id`, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns the storage or decoding error.
    pub async fn snapshots(&self, actor_id: &ActorId) -> Result<Vec<ActorRecord>, ActorError> {
        let docs = self
            .bucket
            .get_by_index(AGGREGATE_ID_INDEX, actor_id.as_str(), IndexRange::Exact)
            .await?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d.doc).map_err(ActorError::from))
            .collect()
    }

    /// Store a new version of `actor_id` at `clock`.
    ///
    /// `actor` is copied; its `id` defaults to `actor_id`, its `vector`
    /// (the version being superseded) becomes `ancestor`, and `clock`
    /// becomes the new `vector`.
    ///
    /// # Errors
    ///
    /// - [`ActorError::InvalidPayload`] if `actor` is not a JSON object or
    ///   carries an `id` that is not a string.
    /// - [`ActorError::PartialWrite`] if either write fails.
    pub async fn store<T>(
        &self,
        actor_id: &ActorId,
        clock: &Clock,
        actor: &T,
    ) -> Result<StoreReceipt, ActorError>
    where
        T: Serialize + ?Sized,
    {
        let record = build_version(actor_id, clock, serde_json::to_value(actor)?)?;
        let snapshot_key = snapshot_key(actor_id, clock);
        let ((prior, context), snapshot_context) = tokio::join!(
            self.read_prior(actor_id),
            self.read_snapshot_context(&snapshot_key),
        );

        let snapshot_indexes = Indexes::from([(AGGREGATE_ID_INDEX.to_owned(), actor_id.to_string())]);
        let current_indexes = Indexes::new();

        let (snapshot, current) = tokio::join!(
            self.bucket
                .put(&snapshot_key, &record, &snapshot_indexes, snapshot_context.as_ref()),
            self.bucket
                .put(actor_id.as_str(), &record, &current_indexes, context.as_ref()),
        );

        if let (Ok(()), Ok(())) = (&snapshot, &current) {
            tracing::debug!(
                actor = %self.name,
                %actor_id,
                vector = %clock,
                ?prior,
                "Stored actor version"
            );
            return Ok(StoreReceipt {
                snapshot_key,
                prior,
            });
        }

        let mut written = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for (key, result) in [(snapshot_key, snapshot), (actor_id.to_string(), current)] {
            match result {
                Ok(()) => written.push(key),
                Err(e) => {
                    messages.push(format!("{key}: {e}"));
                    failed.push(key);
                }
            }
        }

        tracing::warn!(
            actor = %self.name,
            %actor_id,
            ?written,
            ?failed,
            "Actor write only partially applied"
        );
        Err(ActorError::PartialWrite {
            actor_id: actor_id.clone(),
            written,
            failed,
            message: messages.join("; "),
        })
    }

    /// Find the nearest common ancestor of `siblings` and return its snapshot.
    ///
    /// # Errors
    ///
    /// See [`AncestorResolver::resolve`].
    pub async fn find_ancestor(
        &self,
        actor_id: &ActorId,
        siblings: &[ActorRecord],
    ) -> Result<ActorRecord, ActorError> {
        AncestorResolver::new(&self.bucket, self.resolver)
            .resolve(actor_id, siblings)
            .await
    }

    /// Read the current key and, if it holds siblings, resolve their
    /// common ancestor. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ActorStore::fetch`] and
    /// [`ActorStore::find_ancestor`].
    pub async fn reconcile(&self, actor_id: &ActorId) -> Result<Reconciliation, ActorError> {
        match self.fetch(actor_id).await? {
            ActorVersions::Single(record) => Ok(Reconciliation::Clean(record)),
            ActorVersions::Conflicting(siblings) => {
                let ancestor = self.find_ancestor(actor_id, &siblings).await?;
                Ok(Reconciliation::Diverged { ancestor, siblings })
            }
        }
    }

    /// Rewrite the current record of `actor_id` from its snapshot at
    /// `clock`, superseding whatever the current key holds.
    ///
    /// Used to recover from a [`ActorError::PartialWrite`] that left the
    /// current record behind its latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ActorStore::fetch_version`] or the storage
    /// error of the rewrite.
    pub async fn restore_from_snapshot(
        &self,
        actor_id: &ActorId,
        clock: &Clock,
    ) -> Result<ActorRecord, ActorError> {
        let snapshot = self.fetch_version(actor_id, clock).await?;
        let context = match self.bucket.get(actor_id.as_str()).await? {
            Lookup::NotFound => None,
            Lookup::Found { context, .. } => Some(context),
        };

        let doc = serde_json::to_value(&snapshot)?;
        self.bucket
            .put(actor_id.as_str(), &doc, &Indexes::new(), context.as_ref())
            .await?;

        tracing::info!(actor = %self.name, %actor_id, vector = %clock, "Restored current record from snapshot");
        Ok(snapshot)
    }

    async fn fetch_key(&self, key: &str) -> Result<ActorVersions, ActorError> {
        let Lookup::Found { siblings, .. } = self.bucket.get(key).await? else {
            return Err(ActorError::NotFound {
                key: key.to_owned(),
            });
        };

        let mut records = siblings
            .into_iter()
            .map(|s| serde_json::from_value::<ActorRecord>(s.doc))
            .collect::<Result<Vec<_>, _>>()?;

        if records.len() == 1 {
            if let Some(record) = records.pop() {
                return Ok(ActorVersions::Single(record));
            }
        }
        Ok(ActorVersions::Conflicting(records))
    }

    /// Context of a snapshot an earlier attempt left at `key`, so that a
    /// retried write replaces it instead of adding a sibling.
    async fn read_snapshot_context(&self, key: &str) -> Option<CausalContext> {
        match self.bucket.get(key).await {
            Ok(Lookup::Found { siblings, context }) => {
                tracing::debug!(
                    actor = %self.name,
                    key,
                    siblings = siblings.len(),
                    "Replacing existing snapshot"
                );
                Some(context)
            }
            Ok(Lookup::NotFound) => None,
            Err(e) => {
                tracing::warn!(actor = %self.name, key, error = %e, "Could not read snapshot");
                None
            }
        }
    }

    /// Inspect the current key before a write.
    ///
    /// A read failure is treated like a missing record: the write then
    /// lands next to whatever exists instead of superseding it.
    async fn read_prior(&self, actor_id: &ActorId) -> (PriorVersion, Option<CausalContext>) {
        match self.bucket.get(actor_id.as_str()).await {
            Ok(Lookup::NotFound) => (PriorVersion::Missing, None),
            Ok(Lookup::Found { siblings, context }) => match siblings.as_slice() {
                [current] => {
                    let vector = current
                        .doc
                        .get("vector")
                        .and_then(|v| serde_json::from_value::<Clock>(v.clone()).ok());
                    (PriorVersion::Single { vector }, Some(context))
                }
                _ => {
                    tracing::warn!(
                        actor = %self.name,
                        %actor_id,
                        siblings = siblings.len(),
                        "Storing over unresolved siblings"
                    );
                    (
                        PriorVersion::Conflicting {
                            siblings: siblings.len(),
                        },
                        None,
                    )
                }
            },
            Err(e) => {
                tracing::warn!(actor = %self.name, %actor_id, error = %e, "Could not read current record");
                (PriorVersion::Missing, None)
            }
        }
    }
}

/// Turn a host payload into the record written for a new version.
fn build_version(actor_id: &ActorId, clock: &Clock, actor: Value) -> Result<Value, ActorError> {
    let Value::Object(mut record) = actor else {
        return Err(ActorError::InvalidPayload);
    };

    let keep_id = match record.get("id") {
        Some(Value::String(id)) => !id.is_empty(),
        None | Some(Value::Null) => false,
        Some(_) => return Err(ActorError::InvalidPayload),
    };
    if !keep_id {
        record.insert("id".to_owned(), Value::String(actor_id.to_string()));
    }

    let ancestor = record.remove("vector").unwrap_or(Value::Null);
    record.insert("ancestor".to_owned(), ancestor);
    record.insert("vector".to_owned(), serde_json::to_value(clock)?);

    Ok(Value::Object(record))
}

//! Round-based nearest common ancestor search across sibling versions.
//!
//! Each sibling gets a frontier: the clocks seen so far on its ancestor
//! chain, newest first, seeded with the sibling's own `ancestor`. A round
//! fetches the snapshot behind the last clock of every open frontier
//! concurrently and appends that snapshot's `ancestor`. Rounds run strictly
//! one after another; a round completes only once every fetch in it has
//! settled.
//!
//! A frontier closes when its chain reaches a root, when the snapshot is
//! missing or unreadable, or when the fetch misses the round deadline. A
//! closed frontier still takes part in the intersection with the clocks it
//! already holds.
//!
//! ```text
//!            N1 <- common ancestor
//!           /  \
//!         N2    N3
//!                \
//!                 N4
//!                /  \
//!              N5    N6
//!
//! siblings [N2, N5, N6]
//!   seed     [N1]        [N4]        [N4]
//!   round 1  [N1,N0]     [N4,N3]     [N4,N3]
//!   round 2  [N1,N0,x]   [N4,N3,N1]  [N4,N3,N1]  -> N1
//! ```

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use lineage_db::{Bucket, Lookup};
use lineage_types::{ActorId, ActorRecord, Clock, snapshot_key};

use crate::error::ActorError;

/// Default cap on resolution rounds.
const DEFAULT_MAX_ROUNDS: usize = 64;

/// Default deadline for a single fetch within a round, in milliseconds.
const DEFAULT_ROUND_TIMEOUT_MS: u64 = 2000;

/// Limits applied to a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum number of fetch rounds before giving up.
    pub max_rounds: usize,
    /// Deadline for each fetch; a fetch that misses it closes its branch.
    pub round_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            round_timeout: Duration::from_millis(DEFAULT_ROUND_TIMEOUT_MS),
        }
    }
}

impl ResolverConfig {
    /// Set the maximum number of rounds.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the per-fetch deadline.
    #[must_use]
    pub const fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }
}

/// The common ancestor clock and how many rounds it took to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Clock of the nearest common ancestor.
    pub clock: Clock,
    /// Fetch rounds performed; zero when the siblings already agreed.
    pub rounds: usize,
}

/// Why a frontier stopped producing candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchEnd {
    Root,
    Missing,
    Unreadable,
    Conflicted,
    TimedOut,
}

/// Outcome of fetching one snapshot.
#[derive(Debug)]
enum Hop {
    Ancestor(Clock),
    End(BranchEnd),
}

/// Clocks observed on one sibling's chain.
#[derive(Debug, Clone, Default)]
struct Frontier {
    chain: Vec<Clock>,
    seen: HashSet<Clock>,
    end: Option<BranchEnd>,
}

impl Frontier {
    fn seed(sibling: &ActorRecord) -> Self {
        let mut frontier = Self::default();
        match &sibling.ancestor {
            Some(ancestor) => {
                frontier.seen.insert(ancestor.clone());
                frontier.chain.push(ancestor.clone());
            }
            None => frontier.end = Some(BranchEnd::Root),
        }
        frontier
    }

    /// Clock whose snapshot should be fetched next, if still open.
    fn next_lookup(&self) -> Option<&Clock> {
        if self.end.is_some() {
            return None;
        }
        self.chain.last()
    }

    /// Append `clock`, or hand it back if this chain already saw it.
    fn extend(&mut self, clock: Clock) -> Result<(), Clock> {
        if !self.seen.insert(clock.clone()) {
            return Err(clock);
        }
        self.chain.push(clock);
        Ok(())
    }

    fn close(&mut self, end: BranchEnd) {
        self.end = Some(end);
    }

    fn contains(&self, clock: &Clock) -> bool {
        self.seen.contains(clock)
    }
}

/// First clock on the first frontier's chain that every frontier holds.
fn common_ancestor(frontiers: &[Frontier]) -> Option<&Clock> {
    let (first, rest) = frontiers.split_first()?;
    first
        .chain
        .iter()
        .find(|clock| rest.iter().all(|f| f.contains(clock)))
}

/// Finds the nearest common ancestor of sibling versions of one actor.
#[derive(Debug)]
pub struct AncestorResolver<'a, K: Bucket> {
    bucket: &'a K,
    config: ResolverConfig,
}

impl<'a, K: Bucket> AncestorResolver<'a, K> {
    /// Create a resolver reading snapshots from `bucket`.
    pub const fn new(bucket: &'a K, config: ResolverConfig) -> Self {
        Self { bucket, config }
    }

    /// Find the common ancestor of `siblings` and fetch its snapshot.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`AncestorResolver::resolve_clock`], plus
    /// [`ActorError::NotFound`] or [`ActorError::Conflict`] if the ancestor's
    /// snapshot is missing or has siblings.
    pub async fn resolve(
        &self,
        actor_id: &ActorId,
        siblings: &[ActorRecord],
    ) -> Result<ActorRecord, ActorError> {
        let resolution = self.resolve_clock(actor_id, siblings).await?;
        let key = snapshot_key(actor_id, &resolution.clock);

        match self.bucket.get(&key).await? {
            Lookup::NotFound => Err(ActorError::NotFound { key }),
            Lookup::Found { mut siblings, .. } => match (siblings.pop(), siblings.is_empty()) {
                (Some(only), true) => Ok(serde_json::from_value(only.doc)?),
                _ => Err(ActorError::Conflict {
                    key,
                    count: siblings.len().saturating_add(1),
                }),
            },
        }
    }

    /// Find the clock of the common ancestor of `siblings`.
    ///
    /// # Errors
    ///
    /// - [`ActorError::NoSiblings`] if `siblings` is empty.
    /// - [`ActorError::NoCommonAncestor`] if every chain closed first.
    /// - [`ActorError::CycleDetected`] if a chain revisits a clock.
    /// - [`ActorError::DepthExceeded`] if chains are still open after
    ///   [`ResolverConfig::max_rounds`] rounds.
    pub async fn resolve_clock(
        &self,
        actor_id: &ActorId,
        siblings: &[ActorRecord],
    ) -> Result<Resolution, ActorError> {
        if siblings.is_empty() {
            return Err(ActorError::NoSiblings {
                actor_id: actor_id.clone(),
            });
        }

        let mut frontiers: Vec<Frontier> = siblings.iter().map(Frontier::seed).collect();
        if let Some(clock) = common_ancestor(&frontiers) {
            tracing::debug!(%actor_id, %clock, "Siblings share an ancestor");
            return Ok(Resolution {
                clock: clock.clone(),
                rounds: 0,
            });
        }

        for round in 1..=self.config.max_rounds {
            let lookups: Vec<(usize, Clock)> = frontiers
                .iter()
                .enumerate()
                .filter_map(|(i, f)| f.next_lookup().map(|clock| (i, clock.clone())))
                .collect();

            if lookups.is_empty() {
                return Err(ActorError::NoCommonAncestor {
                    actor_id: actor_id.clone(),
                    rounds: round.saturating_sub(1),
                });
            }

            tracing::debug!(%actor_id, round, open = lookups.len(), "Ancestor round");
            let hops = join_all(
                lookups
                    .iter()
                    .map(|(_, clock)| self.fetch_hop(actor_id, clock)),
            )
            .await;

            for ((index, _), hop) in lookups.into_iter().zip(hops) {
                let Some(frontier) = frontiers.get_mut(index) else {
                    continue;
                };
                match hop {
                    Hop::Ancestor(clock) => {
                        frontier
                            .extend(clock)
                            .map_err(|clock| ActorError::CycleDetected {
                                actor_id: actor_id.clone(),
                                clock,
                            })?;
                    }
                    Hop::End(end) => {
                        if end != BranchEnd::Root {
                            tracing::warn!(%actor_id, sibling = index, ?end, "Closing ancestor branch");
                        }
                        frontier.close(end);
                    }
                }
            }

            if let Some(clock) = common_ancestor(&frontiers) {
                tracing::debug!(%actor_id, %clock, rounds = round, "Found common ancestor");
                return Ok(Resolution {
                    clock: clock.clone(),
                    rounds: round,
                });
            }
        }

        if frontiers.iter().all(|f| f.next_lookup().is_none()) {
            return Err(ActorError::NoCommonAncestor {
                actor_id: actor_id.clone(),
                rounds: self.config.max_rounds,
            });
        }
        Err(ActorError::DepthExceeded {
            actor_id: actor_id.clone(),
            max_rounds: self.config.max_rounds,
        })
    }

    /// Fetch the snapshot at `clock` and read its `ancestor` pointer.
    async fn fetch_hop(&self, actor_id: &ActorId, clock: &Clock) -> Hop {
        let key = snapshot_key(actor_id, clock);
        let lookup = match tokio::time::timeout(self.config.round_timeout, self.bucket.get(&key))
            .await
        {
            Err(_) => return Hop::End(BranchEnd::TimedOut),
            Ok(Err(e)) => {
                tracing::debug!(key = %key, error = %e, "Ancestor fetch failed");
                return Hop::End(BranchEnd::Unreadable);
            }
            Ok(Ok(lookup)) => lookup,
        };

        let Lookup::Found { siblings, .. } = lookup else {
            return Hop::End(BranchEnd::Missing);
        };
        let [snapshot] = siblings.as_slice() else {
            return Hop::End(BranchEnd::Conflicted);
        };

        match snapshot.doc.get("ancestor") {
            None | Some(serde_json::Value::Null) => Hop::End(BranchEnd::Root),
            Some(ancestor) => serde_json::from_value::<Clock>(ancestor.clone())
                .map_or(Hop::End(BranchEnd::Unreadable), Hop::Ancestor),
        }
    }
}

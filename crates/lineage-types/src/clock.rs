//! Canonical version clock.
//!
//! A [`Clock`] is a set of `(node, counter)` pairs held in a [`BTreeMap`] so
//! that two clocks with the same entries are structurally equal, hash the
//! same and render the same storage key regardless of the order in which
//! nodes were incremented. Zero counters are dropped on construction and on
//! deserialization.
//!
//! Clocks are only ever compared for equality. No causal ordering or
//! dominance check is performed anywhere in the workspace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An opaque version identifier attached to every actor version.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct Clock(BTreeMap<String, u64>);

impl Clock {
    /// Create an empty clock.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a clock from `(node, counter)` pairs.
    ///
    /// Later pairs for the same node overwrite earlier ones.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        entries
            .into_iter()
            .map(|(node, counter)| (node.into(), counter))
            .collect::<BTreeMap<_, _>>()
            .into()
    }

    /// Increment the counter for `node` and return the new value.
    pub fn increment(&mut self, node: &str) -> u64 {
        let counter = self.0.entry(node.to_owned()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Return a copy of this clock with `node` incremented.
    #[must_use]
    pub fn incremented(&self, node: &str) -> Self {
        let mut next = self.clone();
        next.increment(node);
        next
    }

    /// Counter recorded for `node`, zero when absent.
    pub fn get(&self, node: &str) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Whether no node has been incremented.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(node, counter)` pairs in node order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(node, counter)| (node.as_str(), *counter))
    }
}

impl From<BTreeMap<String, u64>> for Clock {
    fn from(mut entries: BTreeMap<String, u64>) -> Self {
        entries.retain(|_, counter| *counter > 0);
        Self(entries)
    }
}

impl From<Clock> for BTreeMap<String, u64> {
    fn from(clock: Clock) -> Self {
        clock.0
    }
}

/// Renders the canonical key fragment, e.g. `A:2,B:1`.
///
/// `\`, `,` and `:` inside node names are escaped with a leading `\` so
/// that distinct clocks never share a fragment.
impl core::fmt::Display for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use core::fmt::Write;

        for (i, (node, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            for c in node.chars() {
                if matches!(c, '\\' | ',' | ':') {
                    f.write_char('\\')?;
                }
                f.write_char(c)?;
            }
            write!(f, ":{counter}")?;
        }
        Ok(())
    }
}

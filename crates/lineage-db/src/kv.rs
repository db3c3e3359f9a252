//! The key-value store contract consumed by the actor and event stores.
//!
//! A [`Backend`] hands out named [`Bucket`]s. A bucket read returns either
//! [`Lookup::NotFound`] or every sibling currently stored under the key,
//! together with the [`CausalContext`] naming them. Passing that context
//! back on a write supersedes exactly those siblings; a write without a
//! context is stored next to whatever is already there.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Secondary index tags attached to a write: index name to index value.
pub type Indexes = BTreeMap<String, String>;

/// One stored value together with the index tags it was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    /// Key the value is stored under.
    pub key: String,
    /// The stored JSON document.
    pub doc: serde_json::Value,
    /// Index tags written alongside the document.
    #[serde(default)]
    pub indexes: Indexes,
}

/// The set of sibling "dots" observed by a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalContext(BTreeSet<String>);

impl CausalContext {
    /// An empty context, equivalent to having read nothing.
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Build a context from sibling dots.
    pub fn from_dots<I, S>(dots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(dots.into_iter().map(Into::into).collect())
    }

    /// Whether `dot` was observed.
    pub fn contains(&self, dot: &str) -> bool {
        self.0.contains(dot)
    }

    /// Iterate over the observed dots.
    pub fn dots(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of observed dots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no dot was observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of reading a single key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Nothing is stored under the key.
    NotFound,
    /// One or more siblings are stored under the key.
    Found {
        /// Every sibling, oldest first. Dots are time-ordered uuids, so
        /// writes from different processes within the same millisecond may
        /// come back in either order.
        siblings: Vec<StoredDoc>,
        /// Context that supersedes all of `siblings` when written back.
        context: CausalContext,
    },
}

impl Lookup {
    /// Whether the key was missing.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Number of siblings returned, zero when missing.
    pub fn sibling_count(&self) -> usize {
        match self {
            Self::NotFound => 0,
            Self::Found { siblings, .. } => siblings.len(),
        }
    }
}

/// How an index value is matched by [`Bucket::get_by_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRange {
    /// Index value equal to the query value.
    Exact,
    /// Index value greater than or equal to the query value, open-ended.
    From,
}

impl IndexRange {
    /// Whether `candidate` satisfies this range for query `value`.
    pub fn matches(self, candidate: &str, value: &str) -> bool {
        match self {
            Self::Exact => candidate == value,
            Self::From => candidate >= value,
        }
    }
}

/// A named collection of keys inside a [`Backend`].
pub trait Bucket: Clone + Send + Sync + 'static {
    /// Bucket name as known to the backend.
    fn name(&self) -> &str;

    /// Read every sibling stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Lookup, DbError>> + Send;

    /// Store `doc` under `key` with the given index tags.
    ///
    /// With `Some(context)` the siblings named by the context are replaced;
    /// with `None` the value is added next to any existing siblings.
    fn put(
        &self,
        key: &str,
        doc: &serde_json::Value,
        indexes: &Indexes,
        context: Option<&CausalContext>,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Read every stored value whose `index` tag satisfies `range` for
    /// `value`, ordered by index value then key.
    fn get_by_index(
        &self,
        index: &str,
        value: &str,
        range: IndexRange,
    ) -> impl Future<Output = Result<Vec<StoredDoc>, DbError>> + Send;

    /// Remove every sibling stored under `key`. Administrative only.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), DbError>> + Send;
}

/// A key-value store that hands out buckets by name.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Bucket handle type.
    type Bucket: Bucket;

    /// Open the bucket called `name`.
    fn bucket(&self, name: &str) -> Self::Bucket;
}

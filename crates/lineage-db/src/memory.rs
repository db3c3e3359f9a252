//! In-process backend with sibling semantics.
//!
//! Each key holds a list of siblings tagged with a unique dot. Writes follow
//! the rules of [`Bucket::put`]: a causal context removes the dots it names,
//! and the new value is always appended under a fresh dot. With
//! [`MemoryBackend::last_write_wins`] every write replaces all siblings.
//!
//! Faults can be injected per `(bucket, key)` to exercise failure paths
//! (failed writes, failed reads and slow reads), and writes can be failed
//! for a whole bucket.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DbError;
use crate::kv::{Backend, Bucket, CausalContext, IndexRange, Indexes, Lookup, StoredDoc};

type FaultKey = (String, String);

#[derive(Debug, Clone)]
struct Sibling {
    dot: String,
    doc: serde_json::Value,
    indexes: Indexes,
}

#[derive(Debug, Default)]
struct Faults {
    failing_puts: HashSet<FaultKey>,
    failing_buckets: HashSet<String>,
    failing_gets: HashSet<FaultKey>,
    slow_gets: HashMap<FaultKey, Duration>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    buckets: RwLock<HashMap<String, BTreeMap<String, Vec<Sibling>>>>,
    faults: RwLock<Faults>,
    last_write_wins: bool,
}

/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    /// Create an empty store that keeps concurrent writes as siblings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store where every write replaces all siblings.
    pub fn last_write_wins() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                last_write_wins: true,
                ..MemoryInner::default()
            }),
        }
    }

    /// Make every write to `key` in `bucket` fail.
    pub async fn fail_puts(&self, bucket: &str, key: &str) {
        let mut faults = self.inner.faults.write().await;
        faults.failing_puts.insert(fault_key(bucket, key));
    }

    /// Make every write to `bucket` fail, whatever the key.
    pub async fn fail_bucket_puts(&self, bucket: &str) {
        let mut faults = self.inner.faults.write().await;
        faults.failing_buckets.insert(bucket.to_owned());
    }

    /// Make every read of `key` in `bucket` fail.
    pub async fn fail_gets(&self, bucket: &str, key: &str) {
        let mut faults = self.inner.faults.write().await;
        faults.failing_gets.insert(fault_key(bucket, key));
    }

    /// Delay every read of `key` in `bucket` by `delay`.
    pub async fn delay_gets(&self, bucket: &str, key: &str, delay: Duration) {
        let mut faults = self.inner.faults.write().await;
        faults.slow_gets.insert(fault_key(bucket, key), delay);
    }

    /// Remove every injected fault.
    pub async fn clear_faults(&self) {
        *self.inner.faults.write().await = Faults::default();
    }

    /// Number of keys currently stored in `bucket`.
    pub async fn key_count(&self, bucket: &str) -> usize {
        self.inner
            .buckets
            .read()
            .await
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }
}

impl Backend for MemoryBackend {
    type Bucket = MemoryBucket;

    fn bucket(&self, name: &str) -> MemoryBucket {
        MemoryBucket {
            name: name.to_owned(),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A bucket of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    inner: Arc<MemoryInner>,
}

impl MemoryBucket {
    fn fault_key(&self, key: &str) -> FaultKey {
        fault_key(&self.name, key)
    }
}

impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Lookup, DbError> {
        let (fail, delay) = {
            let faults = self.inner.faults.read().await;
            let fk = self.fault_key(key);
            (
                faults.failing_gets.contains(&fk),
                faults.slow_gets.get(&fk).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DbError::Unavailable(format!(
                "injected read failure for {}/{key}",
                self.name
            )));
        }

        let buckets = self.inner.buckets.read().await;
        let Some(siblings) = buckets.get(&self.name).and_then(|b| b.get(key)) else {
            return Ok(Lookup::NotFound);
        };
        if siblings.is_empty() {
            return Ok(Lookup::NotFound);
        }

        Ok(Lookup::Found {
            siblings: siblings
                .iter()
                .map(|s| StoredDoc {
                    key: key.to_owned(),
                    doc: s.doc.clone(),
                    indexes: s.indexes.clone(),
                })
                .collect(),
            context: CausalContext::from_dots(siblings.iter().map(|s| s.dot.clone())),
        })
    }

    async fn put(
        &self,
        key: &str,
        doc: &serde_json::Value,
        indexes: &Indexes,
        context: Option<&CausalContext>,
    ) -> Result<(), DbError> {
        let fail = {
            let faults = self.inner.faults.read().await;
            faults.failing_puts.contains(&self.fault_key(key))
                || faults.failing_buckets.contains(&self.name)
        };
        if fail {
            return Err(DbError::Unavailable(format!(
                "injected write failure for {}/{key}",
                self.name
            )));
        }

        let mut buckets = self.inner.buckets.write().await;
        let siblings = buckets
            .entry(self.name.clone())
            .or_default()
            .entry(key.to_owned())
            .or_default();

        if self.inner.last_write_wins {
            siblings.clear();
        } else if let Some(context) = context {
            siblings.retain(|s| !context.contains(&s.dot));
        }

        siblings.push(Sibling {
            dot: Uuid::now_v7().to_string(),
            doc: doc.clone(),
            indexes: indexes.clone(),
        });

        tracing::trace!(bucket = %self.name, key, siblings = siblings.len(), "put");
        Ok(())
    }

    async fn get_by_index(
        &self,
        index: &str,
        value: &str,
        range: IndexRange,
    ) -> Result<Vec<StoredDoc>, DbError> {
        let buckets = self.inner.buckets.read().await;
        let Some(bucket) = buckets.get(&self.name) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(&str, &str, &Sibling)> = bucket
            .iter()
            .flat_map(|(key, siblings)| siblings.iter().map(move |s| (key.as_str(), s)))
            .filter_map(|(key, s)| {
                s.indexes
                    .get(index)
                    .filter(|candidate| range.matches(candidate, value))
                    .map(|candidate| (candidate.as_str(), key, s))
            })
            .collect();
        hits.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        Ok(hits
            .into_iter()
            .map(|(_, key, s)| StoredDoc {
                key: key.to_owned(),
                doc: s.doc.clone(),
                indexes: s.indexes.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), DbError> {
        let mut buckets = self.inner.buckets.write().await;
        if let Some(bucket) = buckets.get_mut(&self.name) {
            bucket.remove(key);
        }
        Ok(())
    }
}

fn fault_key(bucket: &str, key: &str) -> FaultKey {
    (bucket.to_owned(), key.to_owned())
}

//! `Dragonfly` (Redis-compatible) backend.
//!
//! Siblings are modelled with one hash per key: each field is a dot and
//! each value a JSON-serialized [`StoredDoc`]. A write with a causal
//! context deletes the fields it names before adding its own, so two
//! writers that read the same state each remove the same old dot and
//! leave two siblings behind.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{bucket}:obj:{key}` | Hash | dot -> serialized sibling |
//! | `{bucket}:idx:{index}` | Set | every value ever written to the index |
//! | `{bucket}:idx:{index}:{value}` | Set | keys written with that index value |
//!
//! Index sets are append-only. Stale entries (superseded or deleted
//! siblings) are filtered out on read by re-checking each sibling's tags.

use std::collections::HashMap;

use fred::prelude::*;
use uuid::Uuid;

use crate::error::DbError;
use crate::kv::{Backend, Bucket, CausalContext, IndexRange, Indexes, Lookup, StoredDoc};

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyBackend {
    client: Client,
    allow_siblings: bool,
}

impl DragonflyBackend {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self {
            client,
            allow_siblings: true,
        })
    }

    /// Keep concurrent writes as siblings (`true`, the default) or let
    /// every write replace all siblings (`false`).
    #[must_use]
    pub const fn with_siblings(mut self, allow: bool) -> Self {
        self.allow_siblings = allow;
        self
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl Backend for DragonflyBackend {
    type Bucket = DragonflyBucket;

    fn bucket(&self, name: &str) -> DragonflyBucket {
        DragonflyBucket {
            client: self.client.clone(),
            name: name.to_owned(),
            allow_siblings: self.allow_siblings,
        }
    }
}

/// A bucket of a [`DragonflyBackend`].
#[derive(Clone)]
pub struct DragonflyBucket {
    client: Client,
    name: String,
    allow_siblings: bool,
}

impl DragonflyBucket {
    fn object_key(&self, key: &str) -> String {
        format!("{}:obj:{key}", self.name)
    }

    fn index_values_key(&self, index: &str) -> String {
        format!("{}:idx:{index}", self.name)
    }

    fn index_members_key(&self, index: &str, value: &str) -> String {
        format!("{}:idx:{index}:{value}", self.name)
    }

    /// Index values satisfying `range`, in ascending order.
    async fn matching_index_values(
        &self,
        index: &str,
        value: &str,
        range: IndexRange,
    ) -> Result<Vec<String>, DbError> {
        match range {
            IndexRange::Exact => Ok(vec![value.to_owned()]),
            IndexRange::From => {
                // TODO: keep index values in a sorted set and use ZRANGEBYLEX
                // once range scans over large indexes show up in profiles.
                let mut values: Vec<String> =
                    self.client.smembers(self.index_values_key(index)).await?;
                values.retain(|candidate| range.matches(candidate, value));
                values.sort();
                Ok(values)
            }
        }
    }
}

impl Bucket for DragonflyBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Lookup, DbError> {
        let fields: HashMap<String, String> = self.client.hgetall(self.object_key(key)).await?;
        if fields.is_empty() {
            return Ok(Lookup::NotFound);
        }

        let mut entries: Vec<(String, String)> = fields.into_iter().collect();
        entries.sort();

        let mut siblings = Vec::with_capacity(entries.len());
        for (_, json) in &entries {
            siblings.push(serde_json::from_str::<StoredDoc>(json)?);
        }
        let context = CausalContext::from_dots(entries.into_iter().map(|(dot, _)| dot));

        Ok(Lookup::Found { siblings, context })
    }

    async fn put(
        &self,
        key: &str,
        doc: &serde_json::Value,
        indexes: &Indexes,
        context: Option<&CausalContext>,
    ) -> Result<(), DbError> {
        let object_key = self.object_key(key);
        let stored = StoredDoc {
            key: key.to_owned(),
            doc: doc.clone(),
            indexes: indexes.clone(),
        };
        let json = serde_json::to_string(&stored)?;

        if !self.allow_siblings {
            let _: u32 = self.client.del(object_key.as_str()).await?;
        } else if let Some(context) = context.filter(|c| !c.is_empty()) {
            let dots: Vec<String> = context.dots().map(str::to_owned).collect();
            let _: u32 = self.client.hdel(object_key.as_str(), dots).await?;
        }

        let field = HashMap::from([(Uuid::now_v7().to_string(), json)]);
        let _: u32 = self.client.hset(object_key.as_str(), field).await?;

        for (index, value) in indexes {
            let _: u32 = self
                .client
                .sadd(self.index_values_key(index), value.as_str())
                .await?;
            let _: u32 = self
                .client
                .sadd(self.index_members_key(index, value), key)
                .await?;
        }

        tracing::trace!(bucket = %self.name, key, "put");
        Ok(())
    }

    async fn get_by_index(
        &self,
        index: &str,
        value: &str,
        range: IndexRange,
    ) -> Result<Vec<StoredDoc>, DbError> {
        let mut docs = Vec::new();
        for candidate in self.matching_index_values(index, value, range).await? {
            let mut keys: Vec<String> = self
                .client
                .smembers(self.index_members_key(index, &candidate))
                .await?;
            keys.sort();

            for key in keys {
                if let Lookup::Found { siblings, .. } = self.get(&key).await? {
                    docs.extend(siblings.into_iter().filter(|s| {
                        s.indexes.get(index).is_some_and(|v| *v == candidate)
                    }));
                }
            }
        }
        Ok(docs)
    }

    async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(self.object_key(key)).await?;
        Ok(())
    }
}

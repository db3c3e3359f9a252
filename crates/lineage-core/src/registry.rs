//! The [`StoreRegistry`]: one actor store and one event store per actor type.
//!
//! The host creates a registry at startup and owns it. Stores are created
//! on first request and cached; later requests for the same actor type
//! return a handle to the same buckets. [`StoreRegistry::clear`] drops the
//! cache so the next request builds fresh stores (data is untouched).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lineage_actors::ActorStore;
use lineage_db::{Backend, DbError, DragonflyBackend, MemoryBackend};
use lineage_events::EventStore;
use lineage_types::IdGenerator;

use crate::config::LineageConfig;
use crate::naming::BucketNames;

/// Errors that can occur while building stores.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backend could not be reached.
    #[error("backend error: {0}")]
    Db(#[from] DbError),

    /// Actor types must be non-empty and free of whitespace.
    #[error("invalid actor type: {0:?}")]
    InvalidActorType(String),
}

/// Creates and caches the stores of every actor type on one backend.
pub struct StoreRegistry<B: Backend> {
    backend: B,
    config: LineageConfig,
    ids: Arc<IdGenerator>,
    actors: RwLock<HashMap<String, ActorStore<B::Bucket>>>,
    events: RwLock<HashMap<String, EventStore<B::Bucket>>>,
}

impl StoreRegistry<MemoryBackend> {
    /// Build a registry on a fresh in-memory backend.
    ///
    /// `storage.allow_siblings = false` selects last-write-wins.
    pub fn in_memory(config: LineageConfig) -> Self {
        let backend = if config.storage.allow_siblings {
            MemoryBackend::new()
        } else {
            MemoryBackend::last_write_wins()
        };
        Self::new(backend, config)
    }
}

impl StoreRegistry<DragonflyBackend> {
    /// Connect to `storage.dragonfly_url` and build a registry on it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Db`] if the connection fails.
    pub async fn connect(config: LineageConfig) -> Result<Self, RegistryError> {
        let backend = DragonflyBackend::connect(&config.storage.dragonfly_url)
            .await?
            .with_siblings(config.storage.allow_siblings);
        Ok(Self::new(backend, config))
    }
}

impl<B: Backend> StoreRegistry<B> {
    /// Build a registry on an existing backend.
    pub fn new(backend: B, config: LineageConfig) -> Self {
        let ids = Arc::new(IdGenerator::from_seed(&config.ids.seed));
        tracing::info!(
            prefix = config.storage.bucket_prefix.as_deref().unwrap_or(""),
            worker_id = ids.worker_id(),
            "Store registry created"
        );
        Self {
            backend,
            config,
            ids,
            actors: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
        }
    }

    /// The backend every store writes to.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The configuration the registry was built with.
    pub const fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// The id generator shared by every event store.
    pub fn ids(&self) -> Arc<IdGenerator> {
        Arc::clone(&self.ids)
    }

    /// Bucket names for `actor_type` under this registry's configuration.
    pub fn bucket_names(&self, actor_type: &str) -> BucketNames {
        BucketNames::resolve(
            actor_type,
            self.config.storage.bucket_prefix.as_deref(),
            self.config.store(actor_type),
        )
    }

    /// The actor store for `actor_type`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidActorType`] for an empty actor type
    /// or one containing whitespace.
    pub fn actors(&self, actor_type: &str) -> Result<ActorStore<B::Bucket>, RegistryError> {
        validate_actor_type(actor_type)?;
        if let Some(store) = self.lookup_actors(actor_type) {
            return Ok(store);
        }

        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        let store = actors.entry(actor_type.to_owned()).or_insert_with(|| {
            let names = self.bucket_names(actor_type);
            tracing::info!(actor_type, bucket = %names.actors, "Created actor store");
            ActorStore::new(actor_type, self.backend.bucket(&names.actors))
                .with_resolver(self.config.resolution.resolver())
        });
        Ok(store.clone())
    }

    /// The event store for `actor_type`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidActorType`] for an empty actor type
    /// or one containing whitespace.
    pub fn events(&self, actor_type: &str) -> Result<EventStore<B::Bucket>, RegistryError> {
        validate_actor_type(actor_type)?;
        if let Some(store) = self.lookup_events(actor_type) {
            return Ok(store);
        }

        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let store = events.entry(actor_type.to_owned()).or_insert_with(|| {
            let names = self.bucket_names(actor_type);
            tracing::info!(
                actor_type,
                events = %names.events,
                packs = %names.event_packs,
                "Created event store"
            );
            EventStore::new(
                self.backend.bucket(&names.events),
                self.backend.bucket(&names.event_packs),
                self.ids(),
            )
        });
        Ok(store.clone())
    }

    /// The cached actor store for `actor_type`, without creating one.
    pub fn lookup_actors(&self, actor_type: &str) -> Option<ActorStore<B::Bucket>> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor_type)
            .cloned()
    }

    /// The cached event store for `actor_type`, without creating one.
    pub fn lookup_events(&self, actor_type: &str) -> Option<EventStore<B::Bucket>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor_type)
            .cloned()
    }

    /// Number of cached stores of both kinds.
    pub fn len(&self) -> usize {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner).len();
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner).len();
        actors.saturating_add(events)
    }

    /// Whether no store has been created since construction or the last
    /// [`clear`](Self::clear).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached store. Handles already given out keep working.
    pub fn clear(&self) {
        self.actors.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.events.write().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::info!("Store registry cleared");
    }
}

fn validate_actor_type(actor_type: &str) -> Result<(), RegistryError> {
    if actor_type.is_empty() || actor_type.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidActorType(actor_type.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use lineage_db::Bucket;

    use super::*;

    #[test]
    fn stores_are_cached_per_type() {
        let registry = StoreRegistry::in_memory(LineageConfig::default());
        assert!(registry.is_empty());

        assert!(registry.actors("Board").is_ok());
        assert!(registry.actors("Board").is_ok());
        assert!(registry.events("Board").is_ok());
        assert!(registry.actors("Card").is_ok());
        assert_eq!(registry.len(), 3);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.lookup_actors("Board").is_none());
    }

    #[test]
    fn lookup_does_not_create() {
        let registry = StoreRegistry::in_memory(LineageConfig::default());
        assert!(registry.lookup_events("Board").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_actor_types_are_rejected() {
        let registry = StoreRegistry::in_memory(LineageConfig::default());
        assert!(matches!(
            registry.actors(""),
            Err(RegistryError::InvalidActorType(_))
        ));
        assert!(matches!(
            registry.events("two words"),
            Err(RegistryError::InvalidActorType(_))
        ));
    }

    #[test]
    fn stores_use_configured_bucket_names() {
        let mut config = LineageConfig::default();
        config.storage.bucket_prefix = Some("kanban".to_owned());
        let registry = StoreRegistry::in_memory(config);

        let actors = registry.actors("Board").ok();
        assert_eq!(
            actors.as_ref().map(|s| s.bucket().name()),
            Some("kanban_board")
        );
        let events = registry.events("Board").ok();
        assert_eq!(
            events.as_ref().map(|s| s.packs_bucket().name()),
            Some("kanban_board_event_packs")
        );
    }
}

//! Host-facing entry point for Lineage.
//!
//! A host loads a [`LineageConfig`], picks a backend and builds one
//! [`StoreRegistry`] at startup. The registry hands out one actor store and
//! one event store per actor type, all sharing the backend connection and a
//! single id generator.
//!
//! ```text
//! LineageConfig (YAML + env)
//!       |
//!       v
//! StoreRegistry<B: Backend>
//!   |-- actors("board") -> ActorStore  (bucket: <prefix>_board)
//!   +-- events("board") -> EventStore  (buckets: <prefix>_board_events,
//!                                                <prefix>_board_event_packs)
//! ```
//!
//! # Modules
//!
//! - [`config`] -- [`LineageConfig`] and its sections
//! - [`naming`] -- bucket name derivation
//! - [`registry`] -- [`StoreRegistry`]

pub mod config;
pub mod naming;
pub mod registry;

pub use config::{ConfigError, LineageConfig};
pub use naming::BucketNames;
pub use registry::{RegistryError, StoreRegistry};

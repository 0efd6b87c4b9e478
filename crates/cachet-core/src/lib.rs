//! Typed entity cache and JSON:API data layer on top of `cachet-api`.
//!
//! - **[`ModelCache`]**: Registry of entity types plus one identity-keyed
//!   partition per type. `add` is an upsert that fires a [`ChangeEvent`] on
//!   the [`ChangeBus`]; [`save`](ModelCache::save) / [`load`](ModelCache::load)
//!   move whole partitions through a [`PersistentStore`].
//!
//! - **[`Entity`]**: The contract every cacheable type implements: a type
//!   name, an embedded [`EntityMeta`], a declared field list built with
//!   [`entity_fields!`], and wire-mapping hooks.
//!
//! - **[`WireDocument`]**: Maps `{ data, included? }` documents onto
//!   entities, in single-resource or list mode.
//!
//! - **[`Backend`] / [`RequestService`]**: List, create, update and delete
//!   against a configured base address. I/O runs on background tasks; results
//!   are merged into the cache by a single merge processor task.
//!
//! - **[`PathValue`]**: Declarative extraction of a typed value from a
//!   dot-separated path.
//!
//! - **[`Observable`]**: A single value whose bindings are called with the
//!   new (and old) value on every `set`.

pub mod bus;
pub mod cache;
pub mod codec;
pub mod entity;
pub mod error;
pub mod observe;
pub mod path_value;
pub mod persist;
pub mod service;
pub mod settings;
pub mod stream;
pub mod wire;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{ChangeBus, ChangeEvent};
pub use cache::{ModelCache, PartitionState};
pub use entity::{
    Entity, EntityMeta, Field, Relationship, TypeDescriptor, attribute, optional_relationship_id,
    relationship_id,
};
pub use error::{CoreError, MappingError, StoreError};
pub use observe::Observable;
pub use path_value::{Extract, PathValue};
pub use persist::{FileStore, MemoryStore, PersistentStore};
pub use service::{Backend, BackendOptions, RequestService, ServiceMap};
pub use settings::Settings;
pub use stream::EventStream;
pub use wire::{WireDocument, map_many, map_one};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

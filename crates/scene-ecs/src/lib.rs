#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cast_possible_truncation)]

//! Scene ECS - sparse-set Entity Component System with lifecycle signals
//!
//! Designed for single-threaded scene management where reaction code (signal
//! handlers) may freely restructure the registry while it is being notified.
//!
//! # Key Concepts
//!
//! - **Entity**: A generational handle; stale copies never alias new entities
//! - **Component**: Any `'static` type attached to entities
//! - **Storage**: One paged sparse set per component type
//! - **Signal**: Construct / update / destroy notifications per component type
//! - **Plugin**: Bundles component registration and signal wiring
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry.on_destroy::<Position>().connect(|registry, entity| {
//!     tracing::info!(%entity, "position going away");
//! });
//!
//! let entity = registry.create_entity();
//! registry.emplace_component(entity, Position { x: 0.0, y: 0.0 });
//! registry.destroy_entity(entity);
//! ```

mod component;
mod entity;
mod query;
mod registry;
mod signal;
mod storage;

pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
pub use entity::{Entity, EntityAllocator, EntityIndex, Generation};
pub use query::ComponentSet;
pub use registry::{Plugin, Registry};
pub use signal::{Connection, ConnectionId, ScopedBlock, Signal, SignalKind, Signals};
pub use storage::{ErasedStorage, PAGE_SIZE, SparseSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Component, Connection, Entity, Plugin, Registry, SignalKind};
}

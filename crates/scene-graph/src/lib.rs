#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

//! Scene Graph
//!
//! Parent/children hierarchy and transform propagation on top of `scene-ecs`.
//!
//! # Core Concept: The Tree Is a Component
//!
//! Each node holds a [`Hierarchy`] (parent handle plus ordered children) and a
//! [`Transform`] (local TRS plus cached world matrix). There is no separate
//! scene object: the registry is the scene.
//!
//! - [`HierarchyPlugin`] wires cascading destroy into the registry
//! - [`append_child`] / [`remove_child`] keep both sides of a link in sync
//! - [`update_transform`] refreshes world matrices below a root
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry.add_plugin(HierarchyPlugin);
//!
//! let root = spawn_node(&mut registry);
//! let arm = spawn_child(&mut registry, root)?;
//! registry.patch_component::<Transform>(root, |t| t.translate(Vec3::Y));
//!
//! update_all_transforms(&mut registry);
//! registry.destroy_entity(root); // arm goes too
//! ```

mod error;
mod hierarchy;
mod transform;

pub use error::{HierarchyError, HierarchyResult};
pub use hierarchy::{
    Ancestors, Hierarchy, HierarchyPlugin, ancestors, append_child, children_of, depth,
    descendants, detach, insert_child, is_ancestor, parent_of, remove_child, reparent, root_of,
    spawn_child, spawn_node,
};
pub use transform::{Transform, update_all_transforms, update_transform};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Hierarchy, HierarchyError, HierarchyPlugin, Transform, append_child, remove_child,
        spawn_child, spawn_node, update_all_transforms, update_transform,
    };
    pub use scene_ecs::prelude::*;
}

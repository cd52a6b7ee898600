//! Hierarchy error types.

use scene_ecs::Entity;
use thiserror::Error;

/// A rejected hierarchy edit. The tree is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// The handle is null, stale, or its entity is being destroyed.
    #[error("entity {0} is not valid")]
    InvalidEntity(Entity),

    /// The entity has no `Hierarchy` component.
    #[error("entity {0} has no Hierarchy component")]
    MissingHierarchy(Entity),

    /// The child must be detached before it can be parented again.
    #[error("entity {child} already has parent {parent}")]
    AlreadyParented {
        /// The child being appended.
        child: Entity,
        /// Its current parent.
        parent: Entity,
    },

    /// An entity cannot be its own parent.
    #[error("entity {0} cannot be its own parent")]
    SelfParent(Entity),

    /// The edit would make an entity its own ancestor.
    #[error("entity {child} is an ancestor of {parent}")]
    Cycle {
        /// The entity being appended.
        child: Entity,
        /// The intended parent, a descendant of `child`.
        parent: Entity,
    },

    /// The child is not in the parent's children list.
    #[error("entity {child} is not a child of {parent}")]
    NotAChild {
        /// The intended parent.
        parent: Entity,
        /// The entity that was expected among its children.
        child: Entity,
    },
}

/// Result type for hierarchy operations.
pub type HierarchyResult<T> = Result<T, HierarchyError>;

//! Parent/children scene tree with cascading destroy.
//!
//! Every node carries a [`Hierarchy`] component: a plain parent handle plus an
//! ordered child list. The parent link is a lookup, not ownership; whether the
//! parent still exists is a question for the registry.
//!
//! Edits go through the free functions in this module, which keep both sides
//! of a link in sync:
//!
//! ```text
//! child ∈ children_of(parent)  ⇔  parent_of(child) == Some(parent)
//! ```
//!
//! With [`HierarchyPlugin`] installed, destroying a node (or removing its
//! `Hierarchy`) destroys its whole subtree.

use std::{cell::RefCell, rc::Rc};

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;
use scene_ecs::{Entity, Plugin, Registry};
use smallvec::SmallVec;

use crate::{
    error::{HierarchyError, HierarchyResult},
    transform::Transform,
};

/// Tree linkage of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    parent: Entity,
    children: SmallVec<[Entity; 4]>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self {
            parent: Entity::NULL,
            children: SmallVec::new(),
        }
    }
}

impl Hierarchy {
    /// The parent handle, `Entity::NULL` for a root.
    #[must_use]
    pub fn parent(&self) -> Entity {
        self.parent
    }

    /// Children in insertion order.
    #[must_use]
    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    /// Whether this node has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_null()
    }

    /// Whether this node has at least one child.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// Installs the cascading destroy handler on `on_destroy::<Hierarchy>`.
///
/// Install it once per registry, before nodes are created.
#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchyPlugin;

impl Plugin for HierarchyPlugin {
    fn build(&self, registry: &mut Registry) {
        registry.register::<Hierarchy>();
        registry.register::<Transform>();
        let claimed = InFlight::default();
        registry
            .on_destroy::<Hierarchy>()
            .connect(move |registry, entity| cascade(registry, entity, &claimed));
    }
}

/// Nodes already owned by a running cascade.
type InFlight = Rc<RefCell<HashSet<Entity, FxBuildHasher>>>;

/// The nodes one cascade claimed. Dropping it releases the claims.
struct Claims {
    in_flight: InFlight,
    nodes: Vec<Entity>,
}

impl Claims {
    fn new(in_flight: &InFlight) -> Self {
        Self {
            in_flight: Rc::clone(in_flight),
            nodes: Vec::new(),
        }
    }

    fn claim(&mut self, entity: Entity) {
        if self.in_flight.borrow_mut().insert(entity) {
            self.nodes.push(entity);
        }
    }
}

impl Drop for Claims {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.borrow_mut();
        for node in &self.nodes {
            in_flight.remove(node);
        }
    }
}

/// Tear down the subtree rooted at `entity`.
///
/// Nodes collected by a running cascade are skipped when their own destroy
/// signal arrives, so each subtree is walked once. An unrelated node destroyed
/// by another subscriber mid-cascade still gets its own cascade.
fn cascade(registry: &mut Registry, entity: Entity, in_flight: &InFlight) {
    if in_flight.borrow().contains(&entity) {
        return;
    }

    if let Some(parent) = parent_of(registry, entity) {
        if registry.is_valid(parent) {
            registry.patch_component::<Hierarchy>(parent, |node| {
                node.children.retain(|child| *child != entity);
            });
        }
    }

    let mut claims = Claims::new(in_flight);
    claims.claim(entity);
    for node in descendants(registry, entity) {
        claims.claim(node);
    }
    tracing::debug!(%entity, nodes = claims.nodes.len(), "destroying subtree");

    let mut cursor = 0;
    while let Some(&node) = claims.nodes.get(cursor) {
        // Children linked by a handler after collection
        for &child in children_of(registry, node) {
            claims.claim(child);
        }
        registry.destroy_entity(node);
        cursor += 1;
    }
}

// ============================================================================
// Edits
// ============================================================================

fn node(registry: &Registry, entity: Entity) -> HierarchyResult<&Hierarchy> {
    if !registry.is_valid(entity) || registry.is_destroying(entity) {
        return Err(HierarchyError::InvalidEntity(entity));
    }
    registry
        .try_get::<Hierarchy>(entity)
        .ok_or(HierarchyError::MissingHierarchy(entity))
}

/// Check that `child` can be linked under `parent` right now.
fn check_link(registry: &Registry, parent: Entity, child: Entity) -> HierarchyResult<()> {
    if parent == child {
        return Err(HierarchyError::SelfParent(child));
    }
    node(registry, parent)?;
    let current = node(registry, child)?.parent;
    if !current.is_null() {
        return Err(HierarchyError::AlreadyParented {
            child,
            parent: current,
        });
    }
    if is_ancestor(registry, child, parent) {
        return Err(HierarchyError::Cycle { child, parent });
    }
    Ok(())
}

fn reject(error: HierarchyError) -> HierarchyError {
    tracing::debug!(%error, "rejected hierarchy edit");
    error
}

/// Append `child` as the last child of `parent`.
///
/// The child must be a root: detach it (or use [`reparent`]) first. Fires
/// `on_update::<Hierarchy>` for both nodes.
pub fn append_child(registry: &mut Registry, parent: Entity, child: Entity) -> HierarchyResult<()> {
    insert_child(registry, parent, child, usize::MAX)
}

/// Insert `child` at `index` in `parent`'s children, clamped to the end.
pub fn insert_child(
    registry: &mut Registry,
    parent: Entity,
    child: Entity,
    index: usize,
) -> HierarchyResult<()> {
    check_link(registry, parent, child).map_err(reject)?;

    registry.patch_component::<Hierarchy>(parent, |node| {
        let index = index.min(node.children.len());
        node.children.insert(index, child);
    });
    registry.patch_component::<Hierarchy>(child, |node| node.parent = parent);

    tracing::trace!(%parent, %child, "linked child");
    Ok(())
}

/// Unlink `child` from `parent`, making it a root.
///
/// Fails without changes if `child` is not one of `parent`'s children.
pub fn remove_child(registry: &mut Registry, parent: Entity, child: Entity) -> HierarchyResult<()> {
    let linked = node(registry, parent)?.children.contains(&child)
        && node(registry, child)?.parent == parent;
    if !linked {
        return Err(reject(HierarchyError::NotAChild { parent, child }));
    }

    registry.patch_component::<Hierarchy>(parent, |node| {
        if let Some(position) = node.children.iter().position(|&c| c == child) {
            node.children.remove(position);
        }
    });
    registry.patch_component::<Hierarchy>(child, |node| node.parent = Entity::NULL);

    tracing::trace!(%parent, %child, "unlinked child");
    Ok(())
}

/// Make `child` a root. Returns its former parent, `None` if it was a root.
pub fn detach(registry: &mut Registry, child: Entity) -> HierarchyResult<Option<Entity>> {
    let parent = node(registry, child)?.parent;
    if parent.is_null() {
        return Ok(None);
    }
    if !registry.is_valid(parent) {
        tracing::warn!(%child, %parent, "clearing stale parent link");
        registry.patch_component::<Hierarchy>(child, |node| node.parent = Entity::NULL);
        return Ok(None);
    }
    if registry.is_destroying(parent) {
        tracing::debug!(%child, %parent, "detaching from parent mid-teardown");
        registry.patch_component::<Hierarchy>(parent, |node| {
            node.children.retain(|c| *c != child);
        });
        registry.patch_component::<Hierarchy>(child, |node| node.parent = Entity::NULL);
        return Ok(Some(parent));
    }
    remove_child(registry, parent, child)?;
    Ok(Some(parent))
}

/// Move `child` under `new_parent`, detaching it from its current parent.
///
/// Validated up front: on error nothing has changed.
pub fn reparent(registry: &mut Registry, child: Entity, new_parent: Entity) -> HierarchyResult<()> {
    if parent_of(registry, child) == Some(new_parent) {
        return Ok(());
    }
    if child == new_parent {
        return Err(reject(HierarchyError::SelfParent(child)));
    }
    node(registry, new_parent)?;
    node(registry, child)?;
    if is_ancestor(registry, child, new_parent) {
        return Err(reject(HierarchyError::Cycle {
            child,
            parent: new_parent,
        }));
    }

    detach(registry, child)?;
    append_child(registry, new_parent, child)
}

// ============================================================================
// Spawning
// ============================================================================

/// Create a root node with default `Hierarchy` and `Transform`.
pub fn spawn_node(registry: &mut Registry) -> Entity {
    let entity = registry.create_entity();
    registry.emplace_component(entity, Hierarchy::default());
    registry.emplace_component(entity, Transform::default());
    entity
}

/// Create a node and append it under `parent`.
pub fn spawn_child(registry: &mut Registry, parent: Entity) -> HierarchyResult<Entity> {
    node(registry, parent)?;
    let child = spawn_node(registry);
    if let Err(error) = append_child(registry, parent, child) {
        registry.destroy_entity(child);
        return Err(error);
    }
    Ok(child)
}

// ============================================================================
// Queries
// ============================================================================

/// The entity's parent, `None` for roots and entities without `Hierarchy`.
#[must_use]
pub fn parent_of(registry: &Registry, entity: Entity) -> Option<Entity> {
    registry
        .try_get::<Hierarchy>(entity)
        .map(Hierarchy::parent)
        .filter(|parent| !parent.is_null())
}

/// The entity's children, empty if it has no `Hierarchy`.
#[must_use]
pub fn children_of(registry: &Registry, entity: Entity) -> &[Entity] {
    registry
        .try_get::<Hierarchy>(entity)
        .map(Hierarchy::children)
        .unwrap_or_default()
}

/// Walks parent links upward, nearest first.
///
/// Stops at a root, at a stale link, or after visiting as many nodes as there
/// are live entities (which only a corrupted tree can reach).
pub struct Ancestors<'r> {
    registry: &'r Registry,
    current: Entity,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let parent = parent_of(self.registry, self.current)?;
        if !self.registry.is_valid(parent) {
            tracing::warn!(entity = %self.current, %parent, "stale parent link");
            return None;
        }
        if self.remaining == 0 {
            tracing::warn!(entity = %self.current, "parent chain longer than entity count");
            return None;
        }
        self.remaining -= 1;
        self.current = parent;
        Some(parent)
    }
}

/// Iterate `entity`'s ancestors from its parent up to the root.
#[must_use]
pub fn ancestors(registry: &Registry, entity: Entity) -> Ancestors<'_> {
    Ancestors {
        registry,
        current: entity,
        remaining: registry.alive_count(),
    }
}

/// Whether `ancestor` lies on `entity`'s parent chain.
#[must_use]
pub fn is_ancestor(registry: &Registry, ancestor: Entity, entity: Entity) -> bool {
    ancestors(registry, entity).any(|e| e == ancestor)
}

/// Number of ancestors; zero for a root.
#[must_use]
pub fn depth(registry: &Registry, entity: Entity) -> usize {
    ancestors(registry, entity).count()
}

/// Top-most ancestor, or `entity` itself if it is a root.
#[must_use]
pub fn root_of(registry: &Registry, entity: Entity) -> Entity {
    ancestors(registry, entity).last().unwrap_or(entity)
}

/// All descendants of `entity` in breadth-first order, excluding `entity`.
#[must_use]
pub fn descendants(registry: &Registry, entity: Entity) -> Vec<Entity> {
    let limit = registry.alive_count();
    let mut found: Vec<Entity> = children_of(registry, entity).to_vec();
    let mut cursor = 0;

    while cursor < found.len() {
        if found.len() > limit {
            tracing::warn!(%entity, "subtree larger than entity count, truncating");
            found.truncate(limit);
            break;
        }
        let next = found[cursor];
        found.extend_from_slice(children_of(registry, next));
        cursor += 1;
    }
    found
}

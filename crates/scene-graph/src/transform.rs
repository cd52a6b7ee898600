//! Local transforms and world-matrix propagation.
//!
//! A [`Transform`] stores translation, rotation and scale relative to its
//! parent, plus a cached `local_to_world` matrix. The cache is refreshed by
//! [`update_transform`], which walks a subtree top-down and recomputes every
//! node that is dirty or sits below a dirty ancestor.
//!
//! The inherited dirtiness lives only on the traversal stack. After a pass
//! triggered by a dirty parent, children's stored flags are left as they were.

use glam::{Mat4, Quat, Vec3};
use scene_ecs::{Entity, Registry};

use crate::hierarchy::Hierarchy;

/// Position, rotation and scale of a node relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,
    dirty: bool,
    local_to_world: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_trs(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }
}

impl Transform {
    /// Build a dirty transform from translation, rotation and scale.
    #[must_use]
    pub fn from_trs(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            local_position: position,
            local_rotation: rotation.normalize(),
            local_scale: scale,
            dirty: true,
            local_to_world: Mat4::IDENTITY,
        }
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(position: Vec3) -> Self {
        Self::from_trs(position, Quat::IDENTITY, Vec3::ONE)
    }

    /// Builder form of [`Transform::set_local_rotation`].
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_local_rotation(rotation);
        self
    }

    /// Builder form of [`Transform::set_local_scale`].
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_local_scale(scale);
        self
    }

    /// Translation relative to the parent.
    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    /// Rotation relative to the parent, always normalized.
    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    /// Scale relative to the parent.
    pub fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    /// Set the translation and mark the node dirty.
    pub fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
        self.dirty = true;
    }

    /// Set the rotation. The quaternion is normalized.
    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation.normalize();
        self.dirty = true;
    }

    /// Set the scale and mark the node dirty.
    pub fn set_local_scale(&mut self, scale: Vec3) {
        self.local_scale = scale;
        self.dirty = true;
    }

    /// Move by `delta` in parent space.
    pub fn translate(&mut self, delta: Vec3) {
        self.set_local_position(self.local_position + delta);
    }

    /// Apply `rotation` on top of the current rotation.
    pub fn rotate(&mut self, rotation: Quat) {
        self.set_local_rotation(rotation * self.local_rotation);
    }

    /// Force recomputation of this node and its subtree on the next pass.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether this node's own fields changed since its last recompute.
    ///
    /// A clean node can still be stale if an ancestor is dirty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Parent-space matrix: translate, then rotate, then scale.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.local_scale,
            self.local_rotation,
            self.local_position,
        )
    }

    /// Cached world matrix from the last propagation pass.
    #[must_use]
    pub fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    /// World-space origin of this node, from the cached matrix.
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.local_to_world.w_axis.truncate()
    }
}

/// Refresh cached world matrices for the subtree rooted at `root`.
///
/// `root` is treated as parented to the identity. Nodes missing either
/// `Transform` or `Hierarchy` are skipped along with their subtrees. Children
/// are visited in order. The writes do not fire `on_update::<Transform>`.
pub fn update_transform(registry: &mut Registry, root: Entity) {
    let limit = registry.alive_count();
    let mut visited = 0;
    let mut stack: Vec<(Entity, Mat4, bool)> = vec![(root, Mat4::IDENTITY, false)];

    while let Some((entity, parent_matrix, inherited_dirty)) = stack.pop() {
        let (Some(transform), Some(node)) =
            registry.try_get_components_mut::<(Transform, Hierarchy)>(entity)
        else {
            continue;
        };

        visited += 1;
        if visited > limit {
            tracing::warn!(%root, "transform pass visited more nodes than exist, stopping");
            break;
        }

        let dirty = inherited_dirty || transform.dirty;
        if dirty {
            transform.local_to_world = parent_matrix * transform.local_matrix();
            transform.dirty = false;
        }

        let world = transform.local_to_world;
        stack.extend(node.children().iter().rev().map(|&child| (child, world, dirty)));
    }
}

/// Run [`update_transform`] for every root node. Returns the number of roots.
pub fn update_all_transforms(registry: &mut Registry) -> usize {
    let roots: Vec<Entity> = registry
        .iter::<Hierarchy>()
        .filter(|(_, node)| node.is_root())
        .map(|(entity, _)| entity)
        .filter(|&entity| registry.has_component::<Transform>(entity))
        .collect();

    for &root in &roots {
        update_transform(registry, root);
    }
    tracing::trace!(roots = roots.len(), "propagated transforms");
    roots.len()
}

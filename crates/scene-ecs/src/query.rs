//! Multi-component lookups for a single entity.
//!
//! ```ignore
//! let (transform, hierarchy) = registry.try_get_components::<(Transform, Hierarchy)>(entity);
//! ```
//!
//! Each element is `Option<&T>` (or `Option<&mut T>` for the mutable form),
//! absent when the entity lacks that component or the handle is stale.

use crate::{
    component::Component,
    entity::Entity,
    registry::Registry,
    storage::SparseSet,
};

/// A tuple of component types fetched together.
///
/// Implemented for tuples of one to four component types.
pub trait ComponentSet {
    /// Shared references, one `Option` per element.
    type Refs<'r>;
    /// Exclusive references, one `Option` per element.
    type RefsMut<'r>;

    /// Fetch shared references for `entity`.
    fn fetch(registry: &Registry, entity: Entity) -> Self::Refs<'_>;

    /// Fetch exclusive references for `entity`.
    ///
    /// # Panics
    ///
    /// Panics if a component type appears twice in the set.
    fn fetch_mut(registry: &mut Registry, entity: Entity) -> Self::RefsMut<'_>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'r> = ($(Option<&'r $name>,)+);
            type RefsMut<'r> = ($(Option<&'r mut $name>,)+);

            fn fetch(registry: &Registry, entity: Entity) -> Self::Refs<'_> {
                ($(registry.try_get::<$name>(entity),)+)
            }

            #[allow(non_snake_case)]
            fn fetch_mut(registry: &mut Registry, entity: Entity) -> Self::RefsMut<'_> {
                let valid = registry.is_valid(entity);
                let ids = [$(registry.register::<$name>()),+];
                let Some([$($name),+]) = registry.storages_disjoint_mut(ids) else {
                    panic!("try_get_components_mut requires distinct component types");
                };
                if !valid {
                    return ($(None::<&mut $name>,)+);
                }

                ($(
                    $name
                        .as_any_mut()
                        .downcast_mut::<SparseSet<$name>>()
                        .and_then(|storage| storage.get_mut(entity)),
                )+)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);

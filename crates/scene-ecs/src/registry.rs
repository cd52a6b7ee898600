//! Registry - the owner of all entities, component storages and signals.
//!
//! The registry is the single point of truth for "is this entity alive" and
//! "does it have this component". Every component type gets one sparse-set
//! storage and three lifecycle signals, created on first use and indexed by the
//! type's [`ComponentId`].
//!
//! # Signal timing
//!
//! - `on_construct::<T>` fires after a new `T` is in place.
//! - `on_update::<T>` fires after a `T` was replaced or patched.
//! - `on_destroy::<T>` fires before the `T` leaves storage, so handlers can
//!   still read it.
//!
//! # Handles
//!
//! References returned by the registry are valid until the next structural
//! change to the same storage. Entity handles outlive their entity; check
//! [`Registry::is_valid`] before trusting a handle kept across calls.

use smallvec::SmallVec;

use crate::{
    component::{Component, ComponentId, ComponentRegistry},
    entity::{Entity, EntityAllocator},
    query::ComponentSet,
    signal::{Signal, SignalKind, Signals},
    storage::{ErasedStorage, SparseSet},
};

/// Storage plus signals for one component type.
struct Pool {
    storage: Box<dyn ErasedStorage>,
    signals: Signals,
}

impl Pool {
    fn new<T: Component>() -> Self {
        Self {
            storage: Box::new(SparseSet::<T>::new()),
            signals: Signals::default(),
        }
    }
}

/// The entity/component database.
///
/// Not thread-safe: a registry has a single logical owner.
pub struct Registry {
    entities: EntityAllocator,
    components: ComponentRegistry,
    /// Indexed by `ComponentId`.
    pools: Vec<Pool>,
    /// `(component, entity)` pairs whose destroy dispatch is in flight.
    removing: SmallVec<[(ComponentId, Entity); 8]>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            components: ComponentRegistry::new(),
            pools: Vec::new(),
            removing: SmallVec::new(),
        }
    }

    /// Create a registry with room for `entity_capacity` entities.
    #[must_use]
    pub fn with_capacity(entity_capacity: usize) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(entity_capacity),
            ..Self::new()
        }
    }

    // ==================== Entity Operations ====================

    /// Create a new entity without components.
    ///
    /// # Panics
    ///
    /// Panics if the entity index space is exhausted.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.allocate();
        tracing::trace!(%entity, "created entity");
        entity
    }

    /// Destroy an entity, removing every component it holds.
    ///
    /// Storages are visited in component registration order; each removal
    /// fires that type's `on_destroy` signal first. Returns `false` (and does
    /// nothing) if the entity is null, stale, or already being destroyed.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.entities.begin_destroy(entity) {
            tracing::trace!(%entity, "ignored destroy of invalid entity");
            return false;
        }

        // Handlers may register new component types; re-check the bound
        let mut index = 0;
        while index < self.pools.len() {
            let id = ComponentId::from_raw(index as u32);
            if self.announce_removal(id, entity) {
                self.pools[index].storage.erase(entity);
            }
            index += 1;
        }

        self.entities.deallocate(entity);
        tracing::trace!(%entity, "destroyed entity");
        true
    }

    /// Check if an entity handle refers to a live entity.
    ///
    /// Entities inside their own `destroy_entity` call are still valid, so
    /// destroy handlers can read the components being torn down.
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Check if an entity is currently being destroyed.
    #[must_use]
    pub fn is_destroying(&self, entity: Entity) -> bool {
        self.entities.is_destroying(entity)
    }

    /// Get the number of alive entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.entities.alive_count() as usize
    }

    /// Iterate over all live entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Current handle for a live index, if any.
    ///
    /// Useful for collaborators that stored only the index part.
    #[must_use]
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        self.entities.current(index)
    }

    /// Check if a valid entity holds no components.
    #[must_use]
    pub fn is_orphan(&self, entity: Entity) -> bool {
        self.is_valid(entity) && self.pools.iter().all(|pool| !pool.storage.contains(entity))
    }

    /// Destroy every live entity, firing destroy signals as usual.
    ///
    /// Returns the number of entities destroyed by this call.
    pub fn clear(&mut self) -> usize {
        let live: Vec<Entity> = self.entities.iter().collect();
        let destroyed = live
            .into_iter()
            .filter(|&entity| self.destroy_entity(entity))
            .count();
        tracing::debug!(destroyed, "cleared registry");
        destroyed
    }

    // ==================== Component Types ====================

    /// Register a component type, creating its storage and signals.
    ///
    /// Idempotent. Other operations register lazily, so calling this is only
    /// needed to fix the order in which `destroy_entity` visits storages.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        let id = self.components.register::<T>();
        if id.index() == self.pools.len() {
            self.pools.push(Pool::new::<T>());
        }
        id
    }

    /// Get the component ID for a type, if registered.
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.components.get_id::<T>()
    }

    /// Get the component type registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Typed storage for `T`, if the type is registered.
    #[must_use]
    pub fn storage<T: Component>(&self) -> Option<&SparseSet<T>> {
        let id = self.component_id::<T>()?;
        self.pools[id.index()].storage.as_any().downcast_ref()
    }

    /// Mutable typed storage for `T`, if the type is registered.
    ///
    /// Mutations made through the storage bypass lifecycle signals.
    #[must_use]
    pub fn storage_mut<T: Component>(&mut self) -> Option<&mut SparseSet<T>> {
        let id = self.component_id::<T>()?;
        self.pools[id.index()].storage.as_any_mut().downcast_mut()
    }

    // ==================== Component Operations ====================

    /// Attach `value` to `entity` unless it already has a `T`.
    ///
    /// An existing component is kept and returned untouched (no signal). A new
    /// one fires `on_construct::<T>`. Returns `None` if the entity is not valid
    /// or is being destroyed, or if a construct handler took the component away
    /// again.
    pub fn emplace_component<T: Component>(&mut self, entity: Entity, value: T) -> Option<&mut T> {
        self.get_or_emplace(entity, || value)
    }

    /// Like [`Registry::emplace_component`], building the value only if needed.
    pub fn get_or_emplace<T: Component>(
        &mut self,
        entity: Entity,
        make: impl FnOnce() -> T,
    ) -> Option<&mut T> {
        if !self.accepts_components(entity) {
            return None;
        }

        let id = self.register::<T>();
        let (_, inserted) = self.storage_mut::<T>()?.emplace_with(entity, make);
        if inserted {
            tracing::trace!(%entity, component = std::any::type_name::<T>(), "emplaced component");
            self.publish(id, SignalKind::Construct, entity);
        }
        self.try_get_mut(entity)
    }

    /// Attach `value`, replacing any existing `T`.
    ///
    /// Fires `on_construct::<T>` for a new component, `on_update::<T>` for a
    /// replacement.
    pub fn emplace_or_replace<T: Component>(&mut self, entity: Entity, value: T) -> Option<&mut T> {
        if self.has_component::<T>(entity) {
            self.replace_component(entity, value);
            self.try_get_mut(entity)
        } else {
            self.emplace_component(entity, value)
        }
    }

    /// Replace an existing component and fire `on_update::<T>`.
    ///
    /// Returns `false` if the entity does not have a `T`.
    pub fn replace_component<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        self.patch_component::<T>(entity, |slot| *slot = value)
    }

    /// Mutate an existing component in place, then fire `on_update::<T>`.
    ///
    /// Returns `false` if the entity does not have a `T`.
    pub fn patch_component<T: Component>(
        &mut self,
        entity: Entity,
        patch: impl FnOnce(&mut T),
    ) -> bool {
        let Some(component) = self.try_get_mut::<T>(entity) else {
            return false;
        };
        patch(component);

        if let Some(id) = self.component_id::<T>() {
            self.publish(id, SignalKind::Update, entity);
        }
        true
    }

    /// Remove an entity's `T`, firing `on_destroy::<T>` first.
    ///
    /// Returns whether this call removed a component. Removing an absent
    /// component is a no-op.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> bool {
        let Some(id) = self.component_id::<T>() else {
            return false;
        };
        if !self.is_valid(entity) || !self.announce_removal(id, entity) {
            return false;
        }
        let removed = self.pools[id.index()].storage.erase(entity);
        if removed {
            tracing::trace!(%entity, component = std::any::type_name::<T>(), "removed component");
        }
        removed
    }

    /// Remove and return an entity's `T`, firing `on_destroy::<T>` first.
    pub fn take_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let id = self.component_id::<T>()?;
        if !self.is_valid(entity) || !self.announce_removal(id, entity) {
            return None;
        }
        self.storage_mut::<T>()?.remove(entity)
    }

    /// Check if an entity has a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.try_get::<T>(entity).is_some()
    }

    /// Get an entity's `T`. Stale handles read as absent.
    #[must_use]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.storage::<T>()?.get(entity)
    }

    /// Get an entity's `T` mutably. Does not fire `on_update`.
    #[must_use]
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.storage_mut::<T>()?.get_mut(entity)
    }

    /// Fetch several components at once, e.g. `(Transform, Hierarchy)`.
    #[must_use]
    pub fn try_get_components<S: ComponentSet>(&self, entity: Entity) -> S::Refs<'_> {
        S::fetch(self, entity)
    }

    /// Fetch several components mutably at once.
    ///
    /// # Panics
    ///
    /// Panics if the same component type appears twice in `S`.
    pub fn try_get_components_mut<S: ComponentSet>(&mut self, entity: Entity) -> S::RefsMut<'_> {
        S::fetch_mut(self, entity)
    }

    /// Iterate `(entity, &T)` over every holder of `T`, in packed order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.storage::<T>().into_iter().flat_map(SparseSet::iter)
    }

    /// Number of entities holding a `T`.
    #[must_use]
    pub fn len_of<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, SparseSet::len)
    }

    // ==================== Signals ====================

    /// Signal fired after a `T` is attached to an entity.
    pub fn on_construct<T: Component>(&mut self) -> &mut Signal {
        self.sink::<T>(SignalKind::Construct)
    }

    /// Signal fired after an entity's `T` is replaced or patched.
    pub fn on_update<T: Component>(&mut self) -> &mut Signal {
        self.sink::<T>(SignalKind::Update)
    }

    /// Signal fired before a `T` is removed from an entity.
    pub fn on_destroy<T: Component>(&mut self) -> &mut Signal {
        self.sink::<T>(SignalKind::Destroy)
    }

    /// Signal of the given kind for `T`.
    pub fn sink<T: Component>(&mut self, kind: SignalKind) -> &mut Signal {
        let id = self.register::<T>();
        self.pools[id.index()].signals.get_mut(kind)
    }

    // ==================== Internals ====================

    fn accepts_components(&self, entity: Entity) -> bool {
        let accepts = self.is_valid(entity) && !self.is_destroying(entity);
        if !accepts {
            tracing::trace!(%entity, "rejected component for invalid or dying entity");
        }
        accepts
    }

    /// Fire `on_destroy` for `(id, entity)` if the entity holds the component
    /// and no other removal of the same pair is already in flight.
    ///
    /// Returns whether the caller should now erase the component.
    fn announce_removal(&mut self, id: ComponentId, entity: Entity) -> bool {
        let pair = (id, entity);
        if self.removing.contains(&pair) || !self.pools[id.index()].storage.contains(entity) {
            return false;
        }

        self.removing.push(pair);
        self.publish(id, SignalKind::Destroy, entity);
        if let Some(position) = self.removing.iter().rposition(|&p| p == pair) {
            self.removing.swap_remove(position);
        }
        true
    }

    fn publish(&mut self, id: ComponentId, kind: SignalKind, entity: Entity) {
        let snapshot = self.pools[id.index()].signals.get_mut(kind).snapshot();
        for slot in snapshot {
            if slot.is_active() {
                (slot.handler())(self, entity);
            }
        }
    }

    /// Borrow several storages mutably. `None` if two IDs coincide.
    pub(crate) fn storages_disjoint_mut<const N: usize>(
        &mut self,
        ids: [ComponentId; N],
    ) -> Option<[&mut Box<dyn ErasedStorage>; N]> {
        let pools = self.pools.get_disjoint_mut(ids.map(ComponentId::index)).ok()?;
        Some(pools.map(|pool| &mut pool.storage))
    }
}

/// A plugin that can be added to a registry to register components, connect
/// signal handlers and set up initial state.
///
/// # Example
///
/// ```ignore
/// struct AudioPlugin;
///
/// impl Plugin for AudioPlugin {
///     fn build(&self, registry: &mut Registry) {
///         registry.register::<Emitter>();
///         registry.on_destroy::<Emitter>().connect(|registry, entity| {
///             // stop the voice bound to `entity`
///         });
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.add_plugin(AudioPlugin);
/// ```
pub trait Plugin {
    /// Configure the registry with this plugin's components and handlers.
    fn build(&self, registry: &mut Registry);
}

impl Registry {
    /// Add a plugin to this registry.
    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> &mut Self {
        plugin.build(self);
        self
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entity_count", &self.entities.alive_count())
            .field("component_types", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::{Cell, RefCell},
        rc::Rc,
    };

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    fn counter() -> (Rc<Cell<u32>>, impl Fn(&mut Registry, Entity) + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move |_: &mut Registry, _: Entity| handle.set(handle.get() + 1))
    }

    #[test]
    fn test_create_and_destroy() {
        let mut registry = Registry::new();

        let entity = registry.create_entity();
        assert!(registry.is_valid(entity));
        assert_eq!(registry.alive_count(), 1);

        assert!(registry.destroy_entity(entity));
        assert!(!registry.is_valid(entity));
        assert_eq!(registry.alive_count(), 0);
    }

    #[test]
    fn test_double_destroy_is_noop() {
        let mut registry = Registry::new();

        let entity = registry.create_entity();
        assert!(registry.destroy_entity(entity));
        assert!(!registry.destroy_entity(entity));
        assert!(!registry.destroy_entity(Entity::NULL));

        // The index went back on the free list exactly once
        let a = registry.create_entity();
        let b = registry.create_entity();
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn test_recycled_index_has_newer_generation() {
        let mut registry = Registry::new();

        let old = registry.create_entity();
        registry.emplace_component(old, Health(10));
        registry.destroy_entity(old);

        let new = registry.create_entity();
        assert_eq!(new.index(), old.index());
        assert!(new.generation() > old.generation());

        // The stale handle never sees the new entity's data
        registry.emplace_component(new, Health(99));
        assert_eq!(registry.try_get::<Health>(old), None);
        assert!(!registry.has_component::<Health>(old));
        assert!(!registry.remove_component::<Health>(old));
        assert_eq!(registry.try_get::<Health>(new), Some(&Health(99)));
    }

    #[test]
    fn test_emplace_and_get() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();

        let pos = registry
            .emplace_component(entity, Position { x: 1.0, y: 2.0 })
            .unwrap();
        pos.x = 3.0;

        assert_eq!(
            registry.try_get::<Position>(entity),
            Some(&Position { x: 3.0, y: 2.0 })
        );
        assert!(registry.has_component::<Position>(entity));
        assert!(!registry.has_component::<Velocity>(entity));
    }

    #[test]
    fn test_emplace_existing_keeps_value() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let (constructed, on_construct) = counter();
        registry.on_construct::<Health>().connect(on_construct);

        registry.emplace_component(entity, Health(1));
        let kept = registry.emplace_component(entity, Health(2)).copied();

        assert_eq!(kept, Some(Health(1)));
        assert_eq!(constructed.get(), 1);
    }

    #[test]
    fn test_emplace_on_stale_entity_is_absent() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.destroy_entity(entity);

        assert!(registry.emplace_component(entity, Health(5)).is_none());
        assert!(registry.emplace_component(Entity::NULL, Health(5)).is_none());
        assert_eq!(registry.len_of::<Health>(), 0);
    }

    #[test]
    fn test_remove_component() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace_component(entity, Position { x: 0.0, y: 0.0 });

        assert!(registry.remove_component::<Position>(entity));
        assert!(!registry.remove_component::<Position>(entity));
        assert!(!registry.remove_component::<Velocity>(entity));
        assert!(registry.try_get::<Position>(entity).is_none());
        assert!(registry.is_orphan(entity));
    }

    #[test]
    fn test_take_component() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(7));

        assert_eq!(registry.take_component::<Health>(entity), Some(Health(7)));
        assert_eq!(registry.take_component::<Health>(entity), None);
    }

    #[test]
    fn test_destroy_removes_all_components() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.emplace_component(a, Position { x: 1.0, y: 1.0 });
        registry.emplace_component(a, Velocity { x: 1.0, y: 1.0 });
        registry.emplace_component(b, Position { x: 2.0, y: 2.0 });

        registry.destroy_entity(a);

        assert_eq!(registry.len_of::<Position>(), 1);
        assert_eq!(registry.len_of::<Velocity>(), 0);
        assert_eq!(
            registry.try_get::<Position>(b),
            Some(&Position { x: 2.0, y: 2.0 })
        );
    }

    #[test]
    fn test_signal_timing() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        registry.on_construct::<Health>().connect(move |registry, entity| {
            log.borrow_mut()
                .push(("construct", registry.try_get::<Health>(entity).copied()));
        });
        let log = Rc::clone(&seen);
        registry.on_update::<Health>().connect(move |registry, entity| {
            log.borrow_mut()
                .push(("update", registry.try_get::<Health>(entity).copied()));
        });
        let log = Rc::clone(&seen);
        registry.on_destroy::<Health>().connect(move |registry, entity| {
            log.borrow_mut()
                .push(("destroy", registry.try_get::<Health>(entity).copied()));
        });

        registry.emplace_component(entity, Health(1));
        registry.replace_component(entity, Health(2));
        registry.patch_component::<Health>(entity, |health| health.0 += 1);
        registry.remove_component::<Health>(entity);

        assert_eq!(
            *seen.borrow(),
            vec![
                ("construct", Some(Health(1))),
                ("update", Some(Health(2))),
                ("update", Some(Health(3))),
                ("destroy", Some(Health(3))),
            ]
        );
    }

    #[test]
    fn test_emplace_or_replace_signals() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let (constructed, on_construct) = counter();
        let (updated, on_update) = counter();
        registry.on_construct::<Health>().connect(on_construct);
        registry.on_update::<Health>().connect(on_update);

        registry.emplace_or_replace(entity, Health(1));
        registry.emplace_or_replace(entity, Health(2));

        assert_eq!(constructed.get(), 1);
        assert_eq!(updated.get(), 1);
        assert_eq!(registry.try_get::<Health>(entity), Some(&Health(2)));
    }

    #[test]
    fn test_replace_absent_fails() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();

        assert!(!registry.replace_component(entity, Health(1)));
        assert!(!registry.patch_component::<Health>(entity, |_| {}));
    }

    #[test]
    fn test_destroy_fires_destroy_signal_once_per_component() {
        let mut registry = Registry::new();
        let (destroyed, on_destroy) = counter();
        registry.on_destroy::<Health>().connect(on_destroy);

        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(1));
        registry.destroy_entity(entity);
        registry.destroy_entity(entity);

        assert_eq!(destroyed.get(), 1);
    }

    #[test]
    fn test_handler_connected_during_dispatch_waits_for_next_pass() {
        let mut registry = Registry::new();
        let late_hits = Rc::new(Cell::new(0));

        let late = Rc::clone(&late_hits);
        registry.on_destroy::<Health>().connect(move |registry, _| {
            let late = Rc::clone(&late);
            registry
                .on_destroy::<Health>()
                .connect(move |_, _| late.set(late.get() + 1));
        });

        let first = registry.create_entity();
        registry.emplace_component(first, Health(1));
        registry.destroy_entity(first);
        assert_eq!(late_hits.get(), 0);

        let second = registry.create_entity();
        registry.emplace_component(second, Health(1));
        registry.destroy_entity(second);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn test_handler_disconnected_during_dispatch_is_skipped() {
        let mut registry = Registry::new();
        let (hits, on_destroy) = counter();

        let victim: Rc<RefCell<Option<crate::signal::Connection>>> = Rc::default();
        let target = Rc::clone(&victim);
        registry.on_destroy::<Health>().connect(move |_, _| {
            if let Some(connection) = target.borrow().as_ref() {
                connection.disconnect();
            }
        });
        *victim.borrow_mut() = Some(registry.on_destroy::<Health>().connect(on_destroy));

        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(1));
        registry.destroy_entity(entity);

        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_handler_may_destroy_other_entities() {
        let mut registry = Registry::new();
        let owner = registry.create_entity();
        let owned = registry.create_entity();
        registry.emplace_component(owner, Health(1));
        registry.emplace_component(owned, Health(2));

        registry.on_destroy::<Health>().connect(move |registry, entity| {
            if entity == owner {
                registry.destroy_entity(owned);
            }
        });

        registry.destroy_entity(owner);
        assert!(!registry.is_valid(owned));
        assert_eq!(registry.alive_count(), 0);
        assert_eq!(registry.len_of::<Health>(), 0);
    }

    #[test]
    fn test_nested_destroy_of_same_entity_is_noop() {
        let mut registry = Registry::new();
        let (destroyed, on_destroy) = counter();
        registry.on_destroy::<Health>().connect(on_destroy);
        registry.on_destroy::<Health>().connect(|registry, entity| {
            assert!(registry.is_destroying(entity));
            assert!(!registry.destroy_entity(entity));
            assert!(registry.emplace_component(entity, Position { x: 0.0, y: 0.0 }).is_none());
        });

        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(1));
        assert!(registry.destroy_entity(entity));

        assert_eq!(destroyed.get(), 1);
        assert_eq!(registry.len_of::<Position>(), 0);
    }

    #[test]
    fn test_destroy_from_remove_handler_announces_once() {
        let mut registry = Registry::new();
        let (destroyed, on_destroy) = counter();
        registry.on_destroy::<Health>().connect(on_destroy);
        registry
            .on_destroy::<Health>()
            .connect(|registry, entity| {
                registry.destroy_entity(entity);
            });

        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(1));
        registry.emplace_component(entity, Position { x: 0.0, y: 0.0 });

        assert!(registry.remove_component::<Health>(entity));
        assert!(!registry.is_valid(entity));
        assert_eq!(destroyed.get(), 1);
        assert_eq!(registry.len_of::<Health>(), 0);
        assert_eq!(registry.len_of::<Position>(), 0);
    }

    #[test]
    fn test_try_get_components() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace_component(entity, Position { x: 1.0, y: 2.0 });

        let (pos, vel) = registry.try_get_components::<(Position, Velocity)>(entity);
        assert_eq!(pos, Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(vel, None);
    }

    #[test]
    fn test_try_get_components_mut() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace_component(entity, Position { x: 1.0, y: 2.0 });
        registry.emplace_component(entity, Velocity { x: 0.5, y: 0.5 });

        if let (Some(pos), Some(vel)) =
            registry.try_get_components_mut::<(Position, Velocity)>(entity)
        {
            pos.x += vel.x;
            pos.y += vel.y;
        }

        assert_eq!(
            registry.try_get::<Position>(entity),
            Some(&Position { x: 1.5, y: 2.5 })
        );
    }

    #[test]
    #[should_panic(expected = "distinct component types")]
    fn test_try_get_components_mut_rejects_duplicates() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace_component(entity, Health(1));

        let _ = registry.try_get_components_mut::<(Health, Health)>(entity);
    }

    #[test]
    fn test_iter_and_storage() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.emplace_component(a, Health(1));
        registry.emplace_component(b, Health(2));

        let total: u32 = registry.iter::<Health>().map(|(_, h)| h.0).sum();
        assert_eq!(total, 3);
        assert_eq!(registry.iter::<Velocity>().count(), 0);

        for (_, health) in registry.storage_mut::<Health>().unwrap().iter_mut() {
            health.0 *= 10;
        }
        assert_eq!(registry.try_get::<Health>(b), Some(&Health(20)));
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::new();
        let (destroyed, on_destroy) = counter();
        registry.on_destroy::<Health>().connect(on_destroy);

        for i in 0..5 {
            let entity = registry.create_entity();
            registry.emplace_component(entity, Health(i));
        }

        assert_eq!(registry.clear(), 5);
        assert_eq!(registry.alive_count(), 0);
        assert_eq!(destroyed.get(), 5);
    }

    #[test]
    fn test_registries_are_independent() {
        let mut first = Registry::new();
        let mut second = Registry::new();

        first.register::<Position>();
        let health_first = first.register::<Health>();
        let health_second = second.register::<Health>();

        assert_ne!(health_first, health_second);
        assert_eq!(second.component_id::<Position>(), None);
    }

    #[test]
    fn test_plugin() {
        struct HealthPlugin;

        impl Plugin for HealthPlugin {
            fn build(&self, registry: &mut Registry) {
                registry.register::<Health>();
            }
        }

        let mut registry = Registry::new();
        registry.add_plugin(HealthPlugin);
        assert!(registry.component_id::<Health>().is_some());
    }

    #[test]
    fn test_entity_at() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();

        assert_eq!(registry.entity_at(entity.index()), Some(entity));
        registry.destroy_entity(entity);
        assert_eq!(registry.entity_at(entity.index()), None);
    }
}

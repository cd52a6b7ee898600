//! Component storage - one sparse set per component type.
//!
//! A sparse set pairs an index-addressed lookup table with densely packed
//! arrays:
//!
//! ```text
//! sparse (paged):  index -> slot          [_, 2, _, 0, 1, ...]
//! packed entities: slot  -> Entity        [e3, e4, e1]
//! packed values:   slot  -> T             [v3, v4, v1]
//! ```
//!
//! Insert appends, removal swaps the victim with the last packed element and
//! relinks the moved element's sparse entry, so packed arrays never contain
//! holes. All point operations are O(1).

use std::any::Any;

use crate::entity::{Entity, EntityIndex};

/// Number of sparse slots per page.
pub const PAGE_SIZE: usize = 4096;

/// Sparse slot value meaning "not present".
const TOMBSTONE: u32 = u32::MAX;

type Page = Box<[u32; PAGE_SIZE]>;

/// Paged index -> slot table.
///
/// Pages are allocated on first write, so a storage holding a handful of
/// components for high entity indices stays small.
#[derive(Default)]
struct SparseTable {
    pages: Vec<Option<Page>>,
}

impl SparseTable {
    const fn locate(index: EntityIndex) -> (usize, usize) {
        let index = index as usize;
        (index / PAGE_SIZE, index % PAGE_SIZE)
    }

    fn get(&self, index: EntityIndex) -> Option<usize> {
        let (page, offset) = Self::locate(index);
        let slot = self.pages.get(page)?.as_ref()?[offset];
        (slot != TOMBSTONE).then_some(slot as usize)
    }

    fn set(&mut self, index: EntityIndex, slot: usize) {
        let (page, offset) = Self::locate(index);
        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }
        let page = self.pages[page].get_or_insert_with(|| Box::new([TOMBSTONE; PAGE_SIZE]));
        page[offset] = slot as u32;
    }

    fn clear_slot(&mut self, index: EntityIndex) {
        let (page, offset) = Self::locate(index);
        if let Some(Some(page)) = self.pages.get_mut(page) {
            page[offset] = TOMBSTONE;
        }
    }

    fn page_count(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }
}

/// Sparse-set storage for components of type `T`.
///
/// Lookups compare the full entity (index and generation), so a stale handle
/// whose index has been recycled reads as absent.
///
/// Iteration walks the packed arrays. Removing elements while an iteration is
/// suspended is not supported; use [`SparseSet::remove_all`] for bulk removal.
pub struct SparseSet<T> {
    sparse: SparseTable,
    entities: Vec<Entity>,
    values: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseSet<T> {
    /// Create a new empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sparse: SparseTable::default(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create a storage with pre-allocated packed capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sparse: SparseTable::default(),
            entities: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Number of entities holding this component.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Reserve packed capacity for at least `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        self.values.reserve(additional);
    }

    /// Number of sparse pages currently allocated.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.sparse.page_count()
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = self.sparse.get(entity.index())?;
        (self.entities[slot] == entity).then_some(slot)
    }

    /// Packed slot currently holding `entity`'s component.
    #[must_use]
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        self.slot_of(entity)
    }

    /// Check if the entity has a component in this storage.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot_of(entity).is_some()
    }

    /// Insert `value` for `entity` unless one is already present.
    ///
    /// Returns the stored component and whether it was inserted. An existing
    /// component is kept as is and `value` is dropped.
    pub fn emplace(&mut self, entity: Entity, value: T) -> (&mut T, bool) {
        self.emplace_with(entity, || value)
    }

    /// Like [`SparseSet::emplace`], constructing the value only when inserting.
    pub fn emplace_with(&mut self, entity: Entity, make: impl FnOnce() -> T) -> (&mut T, bool) {
        debug_assert!(!entity.is_null(), "the null entity cannot hold components");

        if let Some(slot) = self.slot_of(entity) {
            return (&mut self.values[slot], false);
        }

        // A stale handle for the same index may still own the sparse slot
        if let Some(slot) = self.sparse.get(entity.index()) {
            let stale = self.entities[slot];
            self.swap_remove_at(slot);
            tracing::warn!(%stale, %entity, "dropped component left behind by a stale handle");
        }

        let slot = self.entities.len();
        self.sparse.set(entity.index(), slot);
        self.entities.push(entity);
        self.values.push(make());
        (&mut self.values[slot], true)
    }

    /// Insert `value`, replacing any existing component.
    ///
    /// Returns the previous value if there was one.
    pub fn insert_or_replace(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slot_of(entity) {
            return Some(std::mem::replace(&mut self.values[slot], value));
        }
        self.emplace(entity, value);
        None
    }

    /// Get the entity's component.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot_of(entity).map(|slot| &self.values[slot])
    }

    /// Get the entity's component mutably.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot_of(entity).map(|slot| &mut self.values[slot])
    }

    /// Remove and return the entity's component.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot_of(entity)?;
        Some(self.swap_remove_at(slot))
    }

    /// Remove the entity's component, returning whether it was present.
    pub fn erase(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    /// Remove the components of every listed entity.
    ///
    /// Absent entities are skipped. Returns how many components were removed.
    pub fn remove_all(&mut self, entities: impl IntoIterator<Item = Entity>) -> usize {
        entities
            .into_iter()
            .filter(|&entity| self.erase(entity))
            .count()
    }

    /// Remove every component.
    pub fn clear(&mut self) {
        for &entity in &self.entities {
            self.sparse.clear_slot(entity.index());
        }
        self.entities.clear();
        self.values.clear();
    }

    fn swap_remove_at(&mut self, slot: usize) -> T {
        let removed = self.entities.swap_remove(slot);
        let value = self.values.swap_remove(slot);

        self.sparse.clear_slot(removed.index());
        if let Some(&moved) = self.entities.get(slot) {
            self.sparse.set(moved.index(), slot);
        }
        value
    }

    /// Entities holding this component, in packed order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Component values in packed order.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Iterate `(entity, &component)` in packed order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.values.iter())
    }

    /// Iterate `(entity, &mut component)` in packed order.
    pub fn iter_mut(&mut self) -> impl ExactSizeIterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.values.iter_mut())
    }
}

impl<T> std::fmt::Debug for SparseSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseSet")
            .field("component", &std::any::type_name::<T>())
            .field("len", &self.len())
            .field("pages", &self.page_count())
            .finish()
    }
}

/// Type-erased view of a storage, used by the registry for whole-entity
/// operations that do not know the component type.
pub trait ErasedStorage: Any {
    /// Check if the entity has a component in this storage.
    fn contains(&self, entity: Entity) -> bool;

    /// Remove the entity's component, returning whether it was present.
    fn erase(&mut self, entity: Entity) -> bool;

    /// Get the number of entities in storage.
    fn len(&self) -> usize;

    /// Check if storage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities holding this component, in packed order.
    fn entities(&self) -> &[Entity];

    /// Remove every component without notifying anyone.
    fn clear(&mut self);

    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Upcast for downcasting to the concrete `SparseSet<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`ErasedStorage::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedStorage for SparseSet<T> {
    fn contains(&self, entity: Entity) -> bool {
        Self::contains(self, entity)
    }

    fn erase(&mut self, entity: Entity) -> bool {
        Self::erase(self, entity)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn entities(&self) -> &[Entity] {
        Self::entities(self)
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Generation;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    fn entity(index: u32) -> Entity {
        Entity::new(index, Generation::new())
    }

    #[test]
    fn test_emplace_get() {
        let mut set = SparseSet::new();

        let (value, inserted) = set.emplace(entity(3), Position { x: 1.0, y: 2.0 });
        assert!(inserted);
        value.x = 5.0;

        assert_eq!(set.get(entity(3)), Some(&Position { x: 5.0, y: 2.0 }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_emplace_existing_keeps_value() {
        let mut set = SparseSet::new();

        set.emplace(entity(1), Position { x: 1.0, y: 1.0 });
        let (value, inserted) = set.emplace(entity(1), Position { x: 9.0, y: 9.0 });

        assert!(!inserted);
        assert_eq!(value, &Position { x: 1.0, y: 1.0 });
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_swap_remove_relinks_moved_element() {
        let mut set = SparseSet::new();

        set.emplace(entity(0), Position { x: 0.0, y: 0.0 });
        set.emplace(entity(1), Position { x: 1.0, y: 1.0 });
        set.emplace(entity(2), Position { x: 2.0, y: 2.0 });

        assert_eq!(set.remove(entity(0)), Some(Position { x: 0.0, y: 0.0 }));

        // Last element moved into slot 0
        assert_eq!(set.entities(), &[entity(2), entity(1)]);
        assert_eq!(set.index_of(entity(2)), Some(0));
        assert_eq!(set.get(entity(2)), Some(&Position { x: 2.0, y: 2.0 }));
        assert_eq!(set.get(entity(1)), Some(&Position { x: 1.0, y: 1.0 }));
        assert!(!set.contains(entity(0)));
    }

    #[test]
    fn test_remove_last_element() {
        let mut set = SparseSet::new();

        set.emplace(entity(0), 10_u32);
        set.emplace(entity(1), 11_u32);

        assert!(set.erase(entity(1)));
        assert_eq!(set.entities(), &[entity(0)]);
        assert_eq!(set.get(entity(0)), Some(&10));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut set = SparseSet::new();
        set.emplace(entity(0), 1_u8);

        assert!(!set.erase(entity(7)));
        assert!(!set.erase(entity(100_000)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_stale_generation_reads_absent() {
        let mut set = SparseSet::new();
        let old = entity(4);
        let new = Entity::new(4, Generation::new().next());

        set.emplace(old, 1_i32);
        assert!(!set.contains(new));
        assert_eq!(set.get(new), None);
        assert!(!set.erase(new));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_emplace_evicts_stale_occupant() {
        let mut set = SparseSet::new();
        let old = entity(4);
        let new = Entity::new(4, Generation::new().next());

        set.emplace(old, 1_i32);
        let (_, inserted) = set.emplace(new, 2_i32);

        assert!(inserted);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(new), Some(&2));
        assert!(!set.contains(old));
    }

    #[test]
    fn test_pages_are_lazy() {
        let mut set = SparseSet::new();

        set.emplace(entity(0), ());
        set.emplace(entity(10 * PAGE_SIZE as u32 + 5), ());

        assert_eq!(set.page_count(), 2);
        assert!(set.contains(entity(10 * PAGE_SIZE as u32 + 5)));
        assert!(!set.contains(entity(5 * PAGE_SIZE as u32)));
    }

    #[test]
    fn test_insert_or_replace() {
        let mut set = SparseSet::new();

        assert_eq!(set.insert_or_replace(entity(2), 1_u32), None);
        assert_eq!(set.insert_or_replace(entity(2), 2_u32), Some(1));
        assert_eq!(set.get(entity(2)), Some(&2));
    }

    #[test]
    fn test_remove_all_counts() {
        let mut set = SparseSet::new();
        for i in 0..5 {
            set.emplace(entity(i), i);
        }

        let removed = set.remove_all([entity(1), entity(3), entity(42)]);
        assert_eq!(removed, 2);
        assert_eq!(set.len(), 3);
        assert!(set.contains(entity(4)));
    }

    #[test]
    fn test_iteration_in_packed_order() {
        let mut set = SparseSet::new();
        set.emplace(entity(5), 'a');
        set.emplace(entity(2), 'b');
        set.emplace(entity(9), 'c');

        let collected: Vec<_> = set.iter().map(|(e, v)| (e.index(), *v)).collect();
        assert_eq!(collected, vec![(5, 'a'), (2, 'b'), (9, 'c')]);

        for (_, value) in set.iter_mut() {
            *value = value.to_ascii_uppercase();
        }
        assert_eq!(set.values(), &['A', 'B', 'C']);
    }

    #[test]
    fn test_clear() {
        let mut set = SparseSet::new();
        set.emplace(entity(1), 1);
        set.emplace(entity(2), 2);

        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(entity(1)));

        set.emplace(entity(2), 3);
        assert_eq!(set.get(entity(2)), Some(&3));
    }

    #[test]
    fn test_values_are_dropped() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        {
            let mut set = SparseSet::new();
            set.emplace(entity(0), Rc::clone(&tracker));
            set.emplace(entity(1), Rc::clone(&tracker));
            set.erase(entity(0));
            assert_eq!(Rc::strong_count(&tracker), 2);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_erased_downcast() {
        let mut boxed: Box<dyn ErasedStorage> = Box::new(SparseSet::<Position>::new());

        let typed = boxed
            .as_any_mut()
            .downcast_mut::<SparseSet<Position>>()
            .unwrap();
        typed.emplace(entity(0), Position { x: 0.0, y: 0.0 });

        assert!(boxed.contains(entity(0)));
        assert_eq!(boxed.len(), 1);
        assert!(boxed.component_name().ends_with("Position"));
        assert!(boxed.erase(entity(0)));
        assert!(boxed.is_empty());
    }
}

//! Entity identifiers with generational indices.
//!
//! An [`Entity`] is an index into the registry's entity table plus the
//! generation that slot had when the handle was minted. Recycling a slot bumps
//! its generation, so copies of a destroyed handle stop validating instead of
//! aliasing whatever entity reuses the index.

use std::fmt;

/// Generation counter to detect stale entity references.
///
/// Wraps on overflow. A slot recycled `2^32` times will hand out a generation
/// an ancient handle may still carry; that is accepted rather than treated as
/// an error.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u32);

impl Generation {
    /// Create a new generation (starts at 0).
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Create a generation from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Increment the generation counter.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Get the raw generation value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Raw entity index into the entity table.
pub type EntityIndex = u32;

/// A handle identifying an entity in a [`Registry`](crate::Registry).
///
/// Two entities are equal iff both index and generation match. The handle owns
/// nothing; whether it still refers to a live entity is a question for the
/// registry (`Registry::is_valid`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    index: EntityIndex,
    generation: Generation,
}

impl Entity {
    /// The reserved null entity. Never aliases a live entity.
    pub const NULL: Entity = Entity {
        index: EntityIndex::MAX,
        generation: Generation(0),
    };

    /// Create an entity from an index and a generation.
    #[must_use]
    pub const fn new(index: EntityIndex, generation: Generation) -> Self {
        Self { index, generation }
    }

    /// Get the entity's index.
    #[must_use]
    pub const fn index(self) -> EntityIndex {
        self.index
    }

    /// Get the entity's generation.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    /// Whether this is the null entity. Only the index is inspected.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == EntityIndex::MAX
    }

    /// Pack entity into a single u64: generation high, index low.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.index as u64)
    }

    /// Unpack entity from a u64.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Entity(null)");
        }
        write!(f, "Entity({}v{})", self.index, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("null");
        }
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

/// Lifecycle of one slot in the entity table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    Alive,
    /// Inside `destroy_entity`: still valid, no longer destroyable or extendable.
    Destroying,
    Free,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: Generation,
    state: SlotState,
}

/// Allocator for entity indices with generation tracking.
///
/// Maintains a free list of recycled slots. The generation of a slot is bumped
/// when it is released, so stale handles fail validation immediately and the
/// next handle minted for the index carries the bumped generation.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free_list: Vec<EntityIndex>,
    alive_count: u32,
}

impl EntityAllocator {
    /// Create a new entity allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            alive_count: 0,
        }
    }

    /// Create an allocator with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            alive_count: 0,
        }
    }

    /// Allocate a new entity, reusing a released index when one is available.
    ///
    /// # Panics
    ///
    /// Panics if every index below `u32::MAX` is in use.
    pub fn allocate(&mut self) -> Entity {
        self.alive_count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = SlotState::Alive;
            return Entity::new(index, slot.generation);
        }

        let index = EntityIndex::try_from(self.slots.len())
            .ok()
            .filter(|&index| index != EntityIndex::MAX)
            .expect("entity index space exhausted");
        self.slots.push(Slot {
            generation: Generation::new(),
            state: SlotState::Alive,
        });
        Entity::new(index, Generation::new())
    }

    /// Move a valid entity into its teardown window.
    ///
    /// Returns `false` if the entity is stale, null, or already being torn down.
    pub(crate) fn begin_destroy(&mut self, entity: Entity) -> bool {
        match self.slot_mut(entity) {
            Some(slot) if slot.state == SlotState::Alive => {
                slot.state = SlotState::Destroying;
                true
            }
            _ => false,
        }
    }

    /// Release an entity's index, making it available for reuse.
    ///
    /// Returns `true` if the entity was valid and released.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.slot_mut(entity) else {
            return false;
        };
        if slot.state == SlotState::Free {
            return false;
        }

        slot.generation = slot.generation.next();
        slot.state = SlotState::Free;
        self.free_list.push(entity.index());
        self.alive_count -= 1;
        true
    }

    /// Check if an entity is alive (including its teardown window).
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.state(entity)
            .is_some_and(|state| state != SlotState::Free)
    }

    /// Check if an entity is being torn down by `destroy_entity`.
    #[must_use]
    pub fn is_destroying(&self, entity: Entity) -> bool {
        self.state(entity) == Some(SlotState::Destroying)
    }

    /// Current handle for a live index, if any.
    #[must_use]
    pub fn current(&self, index: EntityIndex) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        (slot.state != SlotState::Free).then(|| Entity::new(index, slot.generation))
    }

    /// Get the number of currently alive entities.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Get the total number of slots ever allocated (including recycled ones).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over every live entity in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state != SlotState::Free)
            .map(|(index, slot)| Entity::new(index as EntityIndex, slot.generation))
    }

    fn state(&self, entity: Entity) -> Option<SlotState> {
        let slot = self.slots.get(entity.index() as usize)?;
        (slot.generation == entity.generation()).then_some(slot.state)
    }

    fn slot_mut(&mut self, entity: Entity) -> Option<&mut Slot> {
        self.slots
            .get_mut(entity.index() as usize)
            .filter(|slot| slot.generation == entity.generation())
    }
}

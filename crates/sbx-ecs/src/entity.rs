//! Entity identifiers and allocation.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and a slot *index* in the low 32 bits. The generation is bumped
//! every time a slot is released, which allows immediate stale-ID detection.
//!
//! Two values are reserved:
//!
//! - [`Entity::NULL`] has the maximum index and is never handed out. It is the
//!   `Default` value and stands for "no entity".
//! - [`TOMBSTONE_GENERATION`] is never carried by a live entity. Sparse sets
//!   using [`DeletionPolicy::InPlace`](crate::sparse_set::DeletionPolicy::InPlace)
//!   write it into freed dense slots.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Generation value reserved for tombstones. Live entities never reach it.
pub const TOMBSTONE_GENERATION: u32 = u32::MAX;

/// Index value reserved for [`Entity::NULL`] and for the end of an in-place
/// free list.
pub const NULL_INDEX: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// The "no entity" sentinel.
    pub const NULL: Entity = Entity::new(NULL_INDEX, TOMBSTONE_GENERATION);

    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// A tombstone whose index field links to `next` (another dense position,
    /// or [`NULL_INDEX`] at the end of the chain).
    #[inline]
    pub(crate) const fn tombstone(next: u32) -> Self {
        Self::new(next, TOMBSTONE_GENERATION)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this is [`Entity::NULL`].
    #[inline]
    pub const fn is_null(self) -> bool {
        self.index() == NULL_INDEX
    }

    /// Whether this value carries the reserved tombstone generation.
    #[inline]
    pub const fn is_tombstone(self) -> bool {
        self.generation() == TOMBSTONE_GENERATION
    }

    /// Raw `u64` representation.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
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
            f.write_str("Entity(null)")
        } else if self.is_tombstone() {
            write!(f, "Entity(tombstone -> {})", self.index())
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`Entity`] ids with generational tracking.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index. A slot whose generation
/// would reach [`TOMBSTONE_GENERATION`] is retired instead of recycled.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation for each index slot.
    generations: Vec<u32>,
    /// Whether the slot is currently alive.
    alive: Vec<bool>,
    /// Free-list of recyclable indices (FIFO queue).
    free_indices: VecDeque<u32>,
    /// Number of live entities.
    alive_count: usize,
    /// Slots permanently taken out of circulation.
    retired: usize,
}

/// What happened to a slot on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The slot went back on the free list.
    Recycled,
    /// The slot exhausted its generations and will never be reused.
    Retired,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`Entity`].
    ///
    /// A recycled index keeps the generation it was given on release; a
    /// brand-new index starts at generation 0.
    ///
    /// # Panics
    ///
    /// Panics if every index below [`NULL_INDEX`] is in use or retired.
    pub fn allocate(&mut self) -> Entity {
        self.alive_count += 1;
        if let Some(index) = self.free_indices.pop_front() {
            self.alive[index as usize] = true;
            return Entity::new(index, self.generations[index as usize]);
        }
        let index = match u32::try_from(self.generations.len()) {
            Ok(index) if index != NULL_INDEX => index,
            _ => panic!("entity index space exhausted"),
        };
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(index, 0)
    }

    /// Release `entity`, bumping the generation of its slot so that
    /// outstanding handles become stale.
    ///
    /// Returns `None` if the entity was not alive.
    pub fn deallocate(&mut self, entity: Entity) -> Option<Release> {
        if !self.is_alive(entity) {
            return None;
        }
        let idx = entity.index() as usize;
        self.alive[idx] = false;
        self.alive_count -= 1;
        let next = self.generations[idx] + 1;
        self.generations[idx] = next;
        if next == TOMBSTONE_GENERATION {
            self.retired += 1;
            return Some(Release::Retired);
        }
        self.free_indices.push_back(entity.index());
        Some(Release::Recycled)
    }

    /// Returns `true` if `entity` refers to a currently alive slot whose
    /// generation matches.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        idx < self.generations.len()
            && self.alive[idx]
            && self.generations[idx] == entity.generation()
    }

    /// The live identifier stored for `index`, if that slot is alive.
    pub fn live_at(&self, index: u32) -> Option<Entity> {
        let idx = index as usize;
        match self.alive.get(idx) {
            Some(true) => Some(Entity::new(index, self.generations[idx])),
            _ => None,
        }
    }

    /// Iterate every live entity in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (alive, _))| **alive)
            .map(|(idx, (_, &generation))| Entity::new(idx as u32, generation))
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Number of slots ever allocated, alive or not.
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Number of slots retired on generation exhaustion.
    pub fn retired_count(&self) -> usize {
        self.retired
    }

    #[cfg(test)]
    pub(crate) fn force_generation(&mut self, index: u32, generation: u32) {
        self.generations[index as usize] = generation;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

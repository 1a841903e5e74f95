//! Paged sparse set mapping entities to dense positions.
//!
//! The sparse side is a table of fixed-size pages indexed by
//! `entity.index() / page_size`. A page is allocated the first time an entity
//! in its range is inserted and is only released by [`SparseSet::clear`].
//! Every sparse slot holds either a dense position or a null marker, and the
//! two sides always agree: `sparse[e] == i` implies `dense[i] == e`.
//!
//! How the dense side reacts to removal is governed by [`DeletionPolicy`].

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, NULL_INDEX};
use crate::EcsError;

/// Page size used when a component type does not pick its own.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Marker stored in a sparse slot that maps to nothing.
const NULL_POSITION: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// DeletionPolicy
// ---------------------------------------------------------------------------

/// How a sparse set fills the hole left by a removed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Move the last entry into the hole and shrink by one. No holes, but the
    /// relocated entry changes position.
    #[default]
    SwapAndPop,
    /// Leave a tombstone in the hole and thread it onto a free list stored in
    /// the dense array. No live entry ever moves.
    InPlace,
    /// Swap with the last live entry but keep the vacated slot parked past the
    /// live boundary, so the dense array never drops below its peak length.
    SwapOnly,
}

/// Result of a successful [`SparseSet::erase`].
///
/// `position` is where the erased entity lived. `swapped_with` is the position
/// whose entry was moved into `position`; it equals `position` when nothing
/// moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erased {
    pub position: usize,
    pub swapped_with: usize,
}

// ---------------------------------------------------------------------------
// SparseSet
// ---------------------------------------------------------------------------

/// Entity set with O(1) insert, remove and membership test.
#[derive(Debug, Clone)]
pub struct SparseSet {
    /// Lazily allocated pages of dense positions.
    sparse: Vec<Option<Box<[u32]>>>,
    /// Live entities, plus tombstones (in-place) or parked slots (swap-only).
    dense: Vec<Entity>,
    page_size: usize,
    policy: DeletionPolicy,
    /// Head of the in-place free list, or [`NULL_INDEX`] when empty.
    free_head: u32,
    /// Number of live entities.
    live: usize,
    /// Name reported in [`EcsError::NotFound`].
    pool: &'static str,
}

impl SparseSet {
    /// Create an empty set with [`DEFAULT_PAGE_SIZE`].
    pub fn new(policy: DeletionPolicy) -> Self {
        Self::with_page_size(policy, DEFAULT_PAGE_SIZE)
    }

    /// Create an empty set with a custom page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    pub fn with_page_size(policy: DeletionPolicy, page_size: usize) -> Self {
        assert!(page_size > 0, "sparse set page size must be non-zero");
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            page_size,
            policy,
            free_head: NULL_INDEX,
            live: 0,
            pool: "sparse_set",
        }
    }

    /// Set the pool name used in error reports.
    pub(crate) fn named(mut self, pool: &'static str) -> Self {
        self.pool = pool;
        self
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently allocated.
    pub fn allocated_pages(&self) -> usize {
        self.sparse.iter().filter(|p| p.is_some()).count()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Physical length of the dense array, tombstones and parked slots
    /// included.
    pub fn dense_len(&self) -> usize {
        self.dense.len()
    }

    /// The iterable part of the dense array.
    ///
    /// Under [`DeletionPolicy::InPlace`] this may contain tombstones, which
    /// callers must skip with [`Entity::is_tombstone`].
    pub fn as_slice(&self) -> &[Entity] {
        &self.dense[..self.extent()]
    }

    /// Iterate live entities in dense order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.as_slice().iter().copied().filter(|e| !e.is_tombstone())
    }

    fn extent(&self) -> usize {
        match self.policy {
            DeletionPolicy::SwapOnly => self.live,
            DeletionPolicy::SwapAndPop | DeletionPolicy::InPlace => self.dense.len(),
        }
    }

    fn split(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (index / self.page_size, index % self.page_size)
    }

    fn sparse_slot(&self, index: u32) -> Option<u32> {
        let (page, offset) = self.split(index);
        let slot = self.sparse.get(page)?.as_ref()?[offset];
        (slot != NULL_POSITION).then_some(slot)
    }

    /// Mutable access to an existing sparse slot. Never allocates.
    fn sparse_slot_mut(&mut self, index: u32) -> Option<&mut u32> {
        let (page, offset) = self.split(index);
        self.sparse.get_mut(page)?.as_mut().map(|p| &mut p[offset])
    }

    /// Mutable access to a sparse slot, allocating its page on first use.
    fn assure_slot(&mut self, index: u32) -> &mut u32 {
        let (page, offset) = self.split(index);
        if page >= self.sparse.len() {
            self.sparse.resize_with(page + 1, || None);
        }
        let page_size = self.page_size;
        let page = self.sparse[page]
            .get_or_insert_with(|| vec![NULL_POSITION; page_size].into_boxed_slice());
        &mut page[offset]
    }

    /// Whether `entity` (index and generation) is in the set.
    pub fn contains(&self, entity: Entity) -> bool {
        self.index_of(entity).is_some()
    }

    /// Dense position of `entity`, if present.
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        if entity.is_tombstone() {
            return None;
        }
        let pos = self.sparse_slot(entity.index())? as usize;
        (self.dense.get(pos) == Some(&entity)).then_some(pos)
    }

    /// Entity stored at dense position `pos`, if live.
    pub fn entity_at(&self, pos: usize) -> Option<Entity> {
        self.as_slice()
            .get(pos)
            .copied()
            .filter(|e| !e.is_tombstone())
    }

    /// Insert `entity` and return its dense position.
    ///
    /// Under [`DeletionPolicy::InPlace`] the most recently freed slot is reused
    /// first; under [`DeletionPolicy::SwapOnly`] the first parked slot is.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateEntity`] if the set already holds an entity with
    /// the same index, whatever its generation. The occupant must be erased
    /// first.
    pub fn emplace(&mut self, entity: Entity) -> Result<usize, EcsError> {
        if entity.is_tombstone() {
            return Err(EcsError::InvalidEntity { entity });
        }
        if self.sparse_slot(entity.index()).is_some() {
            return Err(EcsError::DuplicateEntity { entity });
        }

        let pos = match self.policy {
            DeletionPolicy::InPlace if self.free_head != NULL_INDEX => {
                let pos = self.free_head as usize;
                self.free_head = self.dense[pos].index();
                self.dense[pos] = entity;
                pos
            }
            DeletionPolicy::SwapOnly if self.live < self.dense.len() => {
                self.dense[self.live] = entity;
                self.live
            }
            _ => {
                self.dense.push(entity);
                self.dense.len() - 1
            }
        };

        *self.assure_slot(entity.index()) = pos as u32;
        self.live += 1;
        Ok(pos)
    }

    /// Remove `entity`, applying the set's [`DeletionPolicy`].
    ///
    /// Under the swap policies the entry formerly at the last live position is
    /// moved into the hole; any position cached for it is stale afterwards.
    pub fn erase(&mut self, entity: Entity) -> Result<Erased, EcsError> {
        let pos = self.index_of(entity).ok_or(EcsError::NotFound {
            entity,
            pool: self.pool,
        })?;

        let erased = match self.policy {
            DeletionPolicy::SwapAndPop => {
                let last = self.dense.len() - 1;
                self.relocate_last(pos, last);
                self.dense.pop();
                Erased {
                    position: pos,
                    swapped_with: last,
                }
            }
            DeletionPolicy::SwapOnly => {
                let last = self.live - 1;
                self.relocate_last(pos, last);
                self.dense[last] = Entity::tombstone(NULL_INDEX);
                Erased {
                    position: pos,
                    swapped_with: last,
                }
            }
            DeletionPolicy::InPlace => {
                self.dense[pos] = Entity::tombstone(self.free_head);
                self.free_head = pos as u32;
                Erased {
                    position: pos,
                    swapped_with: pos,
                }
            }
        };

        if let Some(slot) = self.sparse_slot_mut(entity.index()) {
            *slot = NULL_POSITION;
        }
        self.live -= 1;
        Ok(erased)
    }

    /// Move the entry at `last` into `pos`, rewriting its sparse slot.
    fn relocate_last(&mut self, pos: usize, last: usize) {
        if pos == last {
            return;
        }
        let moved = self.dense[last];
        self.dense.swap(pos, last);
        if let Some(slot) = self.sparse_slot_mut(moved.index()) {
            *slot = pos as u32;
        }
    }

    /// Squeeze tombstones and parked slots out of the dense array.
    ///
    /// Live entries keep their relative order. `on_move(from, to)` is called
    /// for every entry that changes position, so a caller can mirror the move
    /// on a parallel array. Every previously obtained position is stale
    /// afterwards.
    pub fn compact(&mut self, mut on_move: impl FnMut(usize, usize)) {
        match self.policy {
            DeletionPolicy::SwapAndPop => {}
            DeletionPolicy::SwapOnly => self.dense.truncate(self.live),
            DeletionPolicy::InPlace => {
                let mut to = 0;
                for from in 0..self.dense.len() {
                    let entity = self.dense[from];
                    if entity.is_tombstone() {
                        continue;
                    }
                    if from != to {
                        self.dense[to] = entity;
                        if let Some(slot) = self.sparse_slot_mut(entity.index()) {
                            *slot = to as u32;
                        }
                        on_move(from, to);
                    }
                    to += 1;
                }
                self.dense.truncate(to);
                self.free_head = NULL_INDEX;
            }
        }
    }

    /// Release every page and empty the dense array.
    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.free_head = NULL_INDEX;
        self.live = 0;
    }
}

impl Default for SparseSet {
    fn default() -> Self {
        Self::new(DeletionPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    fn filled(policy: DeletionPolicy, n: u32) -> SparseSet {
        let mut set = SparseSet::with_page_size(policy, 4);
        for i in 0..n {
            set.emplace(e(i)).unwrap();
        }
        set
    }

    #[test]
    fn emplace_and_lookup() {
        let mut set = SparseSet::new(DeletionPolicy::SwapAndPop);
        assert_eq!(set.emplace(e(5)).unwrap(), 0);
        assert_eq!(set.emplace(e(2)).unwrap(), 1);
        assert!(set.contains(e(5)));
        assert_eq!(set.index_of(e(2)), Some(1));
        assert!(!set.contains(e(3)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn stale_generation_is_not_contained() {
        let mut set = SparseSet::default();
        set.emplace(Entity::new(1, 3)).unwrap();
        assert!(!set.contains(Entity::new(1, 2)));
        assert!(!set.contains(Entity::new(1, 4)));
        assert!(matches!(
            set.erase(Entity::new(1, 2)),
            Err(EcsError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_emplace_rejected() {
        let mut set = SparseSet::default();
        set.emplace(e(1)).unwrap();
        assert!(matches!(
            set.emplace(e(1)),
            Err(EcsError::DuplicateEntity { .. })
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn newer_generation_cannot_displace_occupant() {
        let mut set = SparseSet::default();
        let old = Entity::new(1, 3);
        let newer = Entity::new(1, 4);
        set.emplace(old).unwrap();
        assert_eq!(
            set.emplace(newer),
            Err(EcsError::DuplicateEntity { entity: newer })
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice(), &[old]);

        // Once the occupant is gone the slot index is free again.
        set.erase(old).unwrap();
        assert_eq!(set.emplace(newer), Ok(0));
        assert!(set.contains(newer));
        assert!(!set.contains(old));
        assert_eq!(set.as_slice(), &[newer]);
    }

    #[test]
    fn pages_allocated_lazily() {
        let mut set = SparseSet::with_page_size(DeletionPolicy::SwapAndPop, 8);
        assert_eq!(set.allocated_pages(), 0);
        set.emplace(e(100)).unwrap();
        assert_eq!(set.allocated_pages(), 1);
        set.emplace(e(101)).unwrap();
        assert_eq!(set.allocated_pages(), 1);
        set.emplace(e(3)).unwrap();
        assert_eq!(set.allocated_pages(), 2);
        // Lookups into never-touched pages are simply misses.
        assert!(!set.contains(e(50)));
        assert!(!set.contains(e(10_000)));
    }

    #[test]
    fn erase_missing_is_not_found() {
        let mut set = SparseSet::default();
        assert!(matches!(set.erase(e(0)), Err(EcsError::NotFound { .. })));
    }

    #[test]
    fn swap_and_pop_relocates_only_last() {
        let mut set = filled(DeletionPolicy::SwapAndPop, 5);
        let erased = set.erase(e(1)).unwrap();
        assert_eq!(
            erased,
            Erased {
                position: 1,
                swapped_with: 4
            }
        );
        assert_eq!(set.as_slice(), &[e(0), e(4), e(2), e(3)]);
        assert_eq!(set.index_of(e(4)), Some(1));
        assert_eq!(set.index_of(e(0)), Some(0));
        assert_eq!(set.index_of(e(2)), Some(2));
        assert_eq!(set.index_of(e(3)), Some(3));
        assert_eq!(set.dense_len(), 4);
    }

    #[test]
    fn swap_and_pop_erase_last() {
        let mut set = filled(DeletionPolicy::SwapAndPop, 3);
        set.erase(e(2)).unwrap();
        assert_eq!(set.as_slice(), &[e(0), e(1)]);
    }

    #[test]
    fn in_place_leaves_positions_stable() {
        let mut set = filled(DeletionPolicy::InPlace, 5);
        set.erase(e(1)).unwrap();
        set.erase(e(3)).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.dense_len(), 5);
        assert_eq!(set.index_of(e(0)), Some(0));
        assert_eq!(set.index_of(e(2)), Some(2));
        assert_eq!(set.index_of(e(4)), Some(4));
        assert!(set.as_slice()[1].is_tombstone());
        assert!(set.as_slice()[3].is_tombstone());
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![e(0), e(2), e(4)]);
    }

    #[test]
    fn in_place_reuses_most_recent_hole_first() {
        let mut set = filled(DeletionPolicy::InPlace, 5);
        set.erase(e(1)).unwrap();
        set.erase(e(3)).unwrap();
        assert_eq!(set.emplace(e(10)).unwrap(), 3);
        assert_eq!(set.emplace(e(11)).unwrap(), 1);
        assert_eq!(set.emplace(e(12)).unwrap(), 5);
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn swap_only_parks_slots() {
        let mut set = filled(DeletionPolicy::SwapOnly, 4);
        set.erase(e(0)).unwrap();
        assert_eq!(set.as_slice(), &[e(3), e(1), e(2)]);
        assert_eq!(set.dense_len(), 4);
        assert_eq!(set.emplace(e(9)).unwrap(), 3);
        assert_eq!(set.dense_len(), 4);
        assert_eq!(set.index_of(e(9)), Some(3));
    }

    #[test]
    fn compact_in_place_preserves_order() {
        let mut set = filled(DeletionPolicy::InPlace, 6);
        set.erase(e(0)).unwrap();
        set.erase(e(3)).unwrap();
        let mut moves = Vec::new();
        set.compact(|from, to| moves.push((from, to)));
        assert_eq!(set.as_slice(), &[e(1), e(2), e(4), e(5)]);
        assert_eq!(moves, vec![(1, 0), (2, 1), (4, 2), (5, 3)]);
        assert_eq!(set.index_of(e(5)), Some(3));
        // The free list is gone; the next insert appends.
        assert_eq!(set.emplace(e(7)).unwrap(), 4);
    }

    #[test]
    fn clear_releases_pages() {
        let mut set = filled(DeletionPolicy::InPlace, 9);
        set.erase(e(4)).unwrap();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.dense_len(), 0);
        assert_eq!(set.allocated_pages(), 0);
        assert!(!set.contains(e(0)));
        assert_eq!(set.emplace(e(0)).unwrap(), 0);
    }

    #[test]
    fn tombstone_cannot_be_inserted() {
        let mut set = SparseSet::default();
        assert!(set.emplace(Entity::NULL).is_err());
        assert!(!set.contains(Entity::NULL));
    }
}

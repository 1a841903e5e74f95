//! Typed component containers.
//!
//! A [`Storage<T>`] pairs a [`SparseSet`] with a value array that is kept in
//! lock-step with the set's dense array: position `i` of the value array
//! belongs to the entity at dense position `i`. Every removal mirrors the
//! set's swap or tombstone on the values, so the two never drift apart.
//!
//! The registry keeps storages of different types side by side behind the
//! object-safe [`AnyStorage`] trait.

use std::any::Any;

use crate::component::Component;
use crate::entity::Entity;
use crate::sparse_set::{DeletionPolicy, Erased, SparseSet};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Container for every value of one component type.
#[derive(Debug, Clone)]
pub struct Storage<T> {
    set: SparseSet,
    /// Parallel to the dense array. `None` exactly where the dense array
    /// holds a tombstone or a parked slot.
    values: Vec<Option<T>>,
}

impl<T: Component> Storage<T> {
    /// Create a storage configured from `T`'s associated constants.
    pub fn new() -> Self {
        Self::with_policy(T::DELETION_POLICY, T::PAGE_SIZE)
    }
}

impl<T: Component> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Storage<T> {
    /// Create a storage with an explicit policy and page size.
    pub fn with_policy(policy: DeletionPolicy, page_size: usize) -> Self {
        Self {
            set: SparseSet::with_page_size(policy, page_size).named(std::any::type_name::<T>()),
            values: Vec::new(),
        }
    }

    /// The underlying entity set.
    pub fn set(&self) -> &SparseSet {
        &self.set
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.set.policy()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.set.contains(entity)
    }

    /// Insert or overwrite the value for `entity`.
    ///
    /// Returns a reference to the stored value. Inserting for an entity that
    /// already has a value replaces it in place; nothing moves.
    pub fn insert(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        let pos = match self.set.index_of(entity) {
            Some(pos) => pos,
            None => {
                let pos = self.set.emplace(entity)?;
                if pos == self.values.len() {
                    self.values.push(None);
                }
                pos
            }
        };
        Ok(self.values[pos].insert(value))
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        let pos = self.set.index_of(entity)?;
        self.values[pos].as_ref()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let pos = self.set.index_of(entity)?;
        self.values[pos].as_mut()
    }

    /// Value at dense position `pos`, skipping the sparse lookup.
    pub fn value_at(&self, pos: usize) -> Option<&T> {
        self.values.get(pos)?.as_ref()
    }

    pub fn value_at_mut(&mut self, pos: usize) -> Option<&mut T> {
        self.values.get_mut(pos)?.as_mut()
    }

    /// Remove and return the value for `entity`.
    pub fn remove(&mut self, entity: Entity) -> Result<T, EcsError> {
        let erased = self.set.erase(entity)?;
        self.take_erased(erased)
            .ok_or_else(|| EcsError::not_found::<T>(entity))
    }

    /// Mirror an erase on the value array.
    fn take_erased(&mut self, erased: Erased) -> Option<T> {
        let Erased {
            position,
            swapped_with,
        } = erased;
        match self.set.policy() {
            DeletionPolicy::SwapAndPop => self.values.swap_remove(position),
            DeletionPolicy::SwapOnly => {
                self.values.swap(position, swapped_with);
                self.values[swapped_with].take()
            }
            DeletionPolicy::InPlace => self.values[position].take(),
        }
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Under [`DeletionPolicy::InPlace`] entries are visited in dense order and
    /// every kept entry stays where it is. The swap policies visit from the
    /// back so that relocations only ever involve already-visited entries.
    pub fn retain(&mut self, mut keep: impl FnMut(Entity, &mut T) -> bool) {
        let extent = self.set.as_slice().len();
        let mut visit = |storage: &mut Self, pos: usize| {
            let Some(entity) = storage.set.entity_at(pos) else {
                return;
            };
            let Some(value) = storage.values[pos].as_mut() else {
                return;
            };
            if !keep(entity, value) {
                if let Ok(erased) = storage.set.erase(entity) {
                    storage.take_erased(erased);
                }
            }
        };
        if self.set.policy() == DeletionPolicy::InPlace {
            for pos in 0..extent {
                visit(self, pos);
            }
        } else {
            for pos in (0..extent).rev() {
                visit(self, pos);
            }
        }
    }

    /// Squeeze tombstones and parked slots out; see [`SparseSet::compact`].
    pub fn compact(&mut self) {
        let values = &mut self.values;
        self.set.compact(|from, to| values.swap(from, to));
        self.values.truncate(self.set.dense_len());
    }

    /// Remove every entity and value.
    pub fn clear(&mut self) {
        self.set.clear();
        self.values.clear();
    }

    /// Live entities in dense order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.set.iter()
    }

    /// Live values in dense order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.set
            .as_slice()
            .iter()
            .zip(&self.values)
            .filter_map(|(&entity, value)| Some((entity, value.as_ref()?)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.set
            .as_slice()
            .iter()
            .zip(&mut self.values)
            .filter_map(|(&entity, value)| Some((entity, value.as_mut()?)))
    }
}

// ---------------------------------------------------------------------------
// AnyStorage
// ---------------------------------------------------------------------------

/// Type-erased view of a [`Storage<T>`], used by the registry to hold
/// containers of different component types in one table.
pub trait AnyStorage: Send + Sync {
    /// The untyped entity set.
    fn set(&self) -> &SparseSet;
    /// Remove `entity` if present, dropping its value.
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn contains(&self, entity: Entity) -> bool {
        self.set().contains(entity)
    }

    fn len(&self) -> usize {
        self.set().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Component> AnyStorage for Storage<T> {
    fn set(&self) -> &SparseSet {
        &self.set
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_ok()
    }

    fn clear(&mut self) {
        Storage::clear(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

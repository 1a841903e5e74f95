//! The [`Registry`] is the top-level container of the engine. It owns the
//! entity allocator, the component type table and one container per component
//! type ever used with it.

use tracing::{debug, trace, warn};

use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId, Label};
use crate::entity::{Entity, EntityAllocator, Release};
use crate::storage::{AnyStorage, Storage};
use crate::view::{View, ViewMut, ViewQuery};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owner of every entity and component it manages.
///
/// Containers are created lazily the first time a component type is used and
/// live until the registry is dropped. Dropping the registry invalidates every
/// [`Entity`] obtained from it.
#[derive(Default)]
pub struct Registry {
    allocator: EntityAllocator,
    pub(crate) components: ComponentRegistry,
    /// Indexed by [`ComponentTypeId`].
    storages: Vec<Box<dyn AnyStorage>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Allocate a new entity with no components.
    pub fn create(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        trace!(%entity, "entity created");
        entity
    }

    /// Allocate a new entity and attach a [`Label`] to it.
    pub fn create_entity(&mut self, label: impl Into<Label>) -> Entity {
        let entity = self.create();
        // A fresh id is valid and its index is absent from every container
        // (destroy and clear empty them), so the insert cannot be refused.
        let attached = self.storage_or_insert::<Label>().insert(entity, label.into());
        debug_assert!(attached.is_ok(), "fresh entity {entity} refused its label");
        entity
    }

    /// Destroy `entity`, dropping every component it owns.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if the entity is stale or was never
    /// allocated.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity { entity });
        }
        for storage in &mut self.storages {
            storage.remove_entity(entity);
        }
        self.release(entity)
    }

    fn release(&mut self, entity: Entity) -> Result<(), EcsError> {
        match self.allocator.deallocate(entity) {
            Some(Release::Recycled) => {
                trace!(%entity, "entity destroyed");
                Ok(())
            }
            Some(Release::Retired) => {
                warn!(
                    %entity,
                    retired = self.allocator.retired_count(),
                    "entity slot exhausted its generations and was retired"
                );
                Ok(())
            }
            None => Err(EcsError::InvalidEntity { entity }),
        }
    }

    /// Whether `entity` is alive in this registry.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Iterate every live entity in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Number of entity slots retired on generation exhaustion.
    pub fn retired_count(&self) -> usize {
        self.allocator.retired_count()
    }

    /// Drop every component and destroy every live entity.
    ///
    /// Generations are bumped as for [`destroy_entity`](Self::destroy_entity),
    /// so handles from before the clear stay invalid after slots are reused.
    pub fn clear(&mut self) {
        for storage in &mut self.storages {
            storage.clear();
        }
        let live: Vec<Entity> = self.allocator.iter().collect();
        let count = live.len();
        for entity in live {
            if let Err(error) = self.release(entity) {
                warn!(%entity, %error, "failed to release entity during clear");
            }
        }
        debug!(entities = count, "registry cleared");
    }

    // -- containers ---------------------------------------------------------

    /// Create the container for `T` now instead of on first use.
    pub fn register_component<T: Component>(&mut self) -> ComponentTypeId {
        self.storage_or_insert::<T>();
        self.components.register::<T>().0
    }

    /// Id assigned to `T`, if its container exists.
    pub fn component_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.components.lookup::<T>()
    }

    /// Metadata for every component type seen so far, in id order.
    pub fn component_infos(&self) -> &[ComponentInfo] {
        self.components.infos()
    }

    /// The container for `T`, if it exists.
    pub fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        let id = self.components.lookup::<T>()?;
        self.storages[id.slot()].as_any().downcast_ref()
    }

    /// Mutable access to the container for `T`, if it exists.
    ///
    /// Crate-private: [`Storage::insert`] does not know which ids are alive,
    /// so callers outside go through [`add_component`](Self::add_component).
    pub(crate) fn storage_mut<T: Component>(&mut self) -> Option<&mut Storage<T>> {
        let id = self.components.lookup::<T>()?;
        self.storages[id.slot()].as_any_mut().downcast_mut()
    }

    /// The container for `T`, created on first use.
    pub(crate) fn storage_or_insert<T: Component>(&mut self) -> &mut Storage<T> {
        let (id, fresh) = self.components.register::<T>();
        if fresh {
            debug!(
                component = std::any::type_name::<T>(),
                id = ?id,
                policy = ?T::DELETION_POLICY,
                page_size = T::PAGE_SIZE,
                "component container created"
            );
            self.storages.push(Box::new(Storage::<T>::new()));
        }
        match self.storages[id.slot()].as_any_mut().downcast_mut() {
            Some(storage) => storage,
            None => panic!(
                "component table out of sync for {}",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Number of entities owning a `T`.
    pub fn component_count<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, Storage::len)
    }

    /// Mutable access to several containers at once, in the order of `ids`.
    ///
    /// `ids` must not repeat an id; a repeated id yields `None` past its
    /// first occurrence.
    pub(crate) fn pools_mut(
        &mut self,
        ids: &[ComponentTypeId],
    ) -> Vec<Option<&mut (dyn AnyStorage + 'static)>> {
        let mut pools: Vec<Option<&mut (dyn AnyStorage + 'static)>> =
            ids.iter().map(|_| None).collect();
        for (slot, storage) in self.storages.iter_mut().enumerate() {
            if let Some(k) = ids.iter().position(|id| id.slot() == slot) {
                pools[k] = Some(&mut **storage);
            }
        }
        pools
    }

    // -- component access ---------------------------------------------------

    /// Attach `value` to `entity`, overwriting any existing `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if the entity is stale.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, EcsError> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity { entity });
        }
        self.storage_or_insert::<T>().insert(entity, value)
    }

    /// Detach and return the `T` owned by `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if the entity is stale, or
    /// [`EcsError::NotFound`] if it owns no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity { entity });
        }
        self.storage_mut::<T>()
            .ok_or_else(|| EcsError::not_found::<T>(entity))?
            .remove(entity)
    }

    /// Whether `entity` currently owns a `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.storage::<T>().is_some_and(|s| s.contains(entity))
    }

    /// The `T` owned by `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotFound`] if the entity owns no `T`, including
    /// when the entity is stale.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        self.storage::<T>()
            .and_then(|s| s.get(entity))
            .ok_or_else(|| EcsError::not_found::<T>(entity))
    }

    /// Mutable access to the `T` owned by `entity`.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.storage_mut::<T>()
            .and_then(|s| s.get_mut(entity))
            .ok_or_else(|| EcsError::not_found::<T>(entity))
    }

    /// Keep only the `T`s for which `keep` returns `true`; see
    /// [`Storage::retain`].
    ///
    /// Entries can only be dropped here, never added, so no stale id can
    /// enter the container. Returns the number of entries removed.
    pub fn retain_components<T: Component>(
        &mut self,
        keep: impl FnMut(Entity, &mut T) -> bool,
    ) -> usize {
        let Some(storage) = self.storage_mut::<T>() else {
            return 0;
        };
        let before = storage.len();
        storage.retain(keep);
        before - storage.len()
    }

    /// Squeeze the holes out of `T`'s container; see [`Storage::compact`].
    pub fn compact_components<T: Component>(&mut self) {
        if let Some(storage) = self.storage_mut::<T>() {
            storage.compact();
        }
    }

    /// Run `patch` on the `T` owned by `entity` and return its result.
    pub fn patch_component<T: Component, R>(
        &mut self,
        entity: Entity,
        patch: impl FnOnce(&mut T) -> R,
    ) -> Result<R, EcsError> {
        self.get_component_mut::<T>(entity).map(patch)
    }

    /// The diagnostic label of `entity`, if it has one.
    pub fn label(&self, entity: Entity) -> Option<&str> {
        self.get_component::<Label>(entity).ok().map(|l| l.0.as_str())
    }

    // -- views --------------------------------------------------------------

    /// Read-only view over every entity owning all of `Q`'s component types.
    pub fn view<Q: ViewQuery>(&self) -> View<'_, Q> {
        View::new(self)
    }

    /// Mutable view over every entity owning all of `Q`'s component types.
    pub fn view_mut<Q: ViewQuery>(&mut self) -> ViewMut<'_, Q> {
        ViewMut::new(self)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.allocator.alive_count())
            .field("slots", &self.allocator.slot_count())
            .field("retired", &self.allocator.retired_count())
            .field(
                "components",
                &self
                    .components
                    .infos()
                    .iter()
                    .map(|info| (info.name, self.storages[info.id.slot()].len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

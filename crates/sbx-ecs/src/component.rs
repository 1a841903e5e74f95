//! Component types and their registration metadata.
//!
//! Any `Send + Sync + 'static` type becomes a component by implementing
//! [`Component`]. The trait's associated constants pick the storage layout for
//! that type; the defaults suit most components.
//!
//! The first time a registry sees a component type it assigns it a
//! [`ComponentTypeId`] through its [`ComponentRegistry`]. That id indexes the
//! registry's container table for the rest of the registry's life.

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::sparse_set::{DeletionPolicy, DEFAULT_PAGE_SIZE};

// ---------------------------------------------------------------------------
// Component trait
// ---------------------------------------------------------------------------

/// A plain data value that can be attached to an entity.
///
/// ```
/// use sbx_ecs::prelude::*;
///
/// struct Transform { x: f32, y: f32 }
/// impl Component for Transform {}
///
/// // Stable positions: safe to remove from while other entries are visited.
/// struct Particle { ttl: u32 }
/// impl Component for Particle {
///     const DELETION_POLICY: DeletionPolicy = DeletionPolicy::InPlace;
///     const PAGE_SIZE: usize = 4096;
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// Deletion policy of this type's container.
    const DELETION_POLICY: DeletionPolicy = DeletionPolicy::SwapAndPop;
    /// Number of sparse slots per page in this type's container.
    const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE;
}

/// Diagnostic name attached by [`Registry::create_entity`](crate::registry::Registry::create_entity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Label(pub String);

impl Component for Label {}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// `std::any::type_name::<T>()`
    pub name: &'static str,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` used as the downcast key.
    pub type_id: TypeId,
    /// `T::DELETION_POLICY`
    pub policy: DeletionPolicy,
    /// `T::PAGE_SIZE`
    pub page_size: usize,
}

impl ComponentInfo {
    fn of<T: Component>(id: ComponentTypeId) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
            policy: T::DELETION_POLICY,
            page_size: T::PAGE_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type is registered once; later registrations return the existing id.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, returning its id and whether it was newly assigned.
    pub fn register<T: Component>(&mut self) -> (ComponentTypeId, bool) {
        if let Some(id) = self.lookup::<T>() {
            return (id, false);
        }
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo::of::<T>(id));
        self.by_type.insert(TypeId::of::<T>(), id);
        (id, true)
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.slot())
    }

    /// All registered types in id order.
    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

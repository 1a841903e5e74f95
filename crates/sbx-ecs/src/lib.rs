//! SBX ECS -- sparse-set Entity Component System.
//!
//! Every component type lives in its own container: a paged sparse array
//! mapping entity index to dense position, a packed array of entity ids, and
//! a parallel array of values. Entities are generational ids, so a handle to a
//! destroyed entity is detected as stale instead of aliasing whatever reuses
//! its slot. Views intersect containers by walking the smallest one.
//!
//! # Quick Start
//!
//! ```
//! use sbx_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! let mut registry = Registry::new();
//! let entity = registry.create_entity("player");
//! registry.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! registry.add_component(entity, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//!
//! registry
//!     .view_mut::<(Position, Velocity)>()
//!     .for_each(|_, (pos, vel)| pos.x += vel.dx);
//!
//! assert_eq!(
//!     registry.get_component::<Position>(entity),
//!     Ok(&Position { x: 1.0, y: 0.0 })
//! );
//! assert_eq!(registry.label(entity), Some("player"));
//!
//! registry.destroy_entity(entity).unwrap();
//! assert!(!registry.is_valid(entity));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod registry;
pub mod sparse_set;
pub mod storage;
pub mod view;

use entity::Entity;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity is stale (its slot was released) or was never allocated.
    #[error("entity {entity} is not valid (stale, retired or never allocated)")]
    InvalidEntity { entity: Entity },

    /// The entity is already a member of the container.
    #[error("entity {entity} is already present in the container")]
    DuplicateEntity { entity: Entity },

    /// The entity has no entry in the named container.
    #[error("entity {entity} has no entry in '{pool}'")]
    NotFound { entity: Entity, pool: &'static str },
}

impl EcsError {
    pub(crate) fn not_found<T: ?Sized>(entity: Entity) -> Self {
        Self::NotFound {
            entity,
            pool: std::any::type_name::<T>(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentInfo, ComponentTypeId, Label};
    pub use crate::entity::Entity;
    pub use crate::registry::Registry;
    pub use crate::sparse_set::{DeletionPolicy, SparseSet};
    pub use crate::storage::Storage;
    pub use crate::view::{View, ViewIter, ViewMut, ViewQuery};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

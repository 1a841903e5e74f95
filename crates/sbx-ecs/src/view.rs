//! Views: multi-component queries over a [`Registry`].
//!
//! A view over `(T1, .., Tn)` walks the dense array of the smallest of the
//! requested containers (the *driver*) and keeps each entity that every other
//! requested container also holds and no excluded container holds. Nothing is
//! collected up front: each step is one dense read plus a handful of O(1)
//! sparse lookups, so issuing a fresh view every frame is cheap.
//!
//! ```
//! use sbx_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Transform(f32);
//! impl Component for Transform {}
//!
//! struct StaticMesh(u32);
//! impl Component for StaticMesh {}
//!
//! struct Hidden;
//! impl Component for Hidden {}
//!
//! let mut registry = Registry::new();
//! let a = registry.create_entity("a");
//! registry.add_component(a, Transform(1.0)).unwrap();
//! registry.add_component(a, StaticMesh(7)).unwrap();
//! let b = registry.create_entity("b");
//! registry.add_component(b, Transform(2.0)).unwrap();
//! registry.add_component(b, StaticMesh(8)).unwrap();
//! registry.add_component(b, Hidden).unwrap();
//!
//! let drawn: Vec<_> = registry
//!     .view::<(StaticMesh, Transform)>()
//!     .exclude::<Hidden>()
//!     .iter()
//!     .map(|(entity, (mesh, _))| (entity, mesh.0))
//!     .collect();
//! assert_eq!(drawn, vec![(a, 7)]);
//!
//! registry
//!     .view_mut::<(Transform,)>()
//!     .for_each(|_, (transform,)| transform.0 *= 10.0);
//! assert_eq!(registry.get_component::<Transform>(b), Ok(&Transform(20.0)));
//! ```
//!
//! Views borrow the registry, so a structural change (adding or removing a
//! component, destroying an entity) cannot happen while one is alive. Removal
//! during a pass goes through [`Registry::retain_components`], which keeps every other
//! position stable for [`DeletionPolicy::InPlace`](crate::sparse_set::DeletionPolicy::InPlace)
//! containers.

use std::marker::PhantomData;

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::Entity;
use crate::registry::Registry;
use crate::sparse_set::SparseSet;
use crate::storage::{AnyStorage, Storage};

/// Driver index that matches no pool, forcing a sparse lookup for every
/// element.
const NO_DRIVER: usize = usize::MAX;

// ---------------------------------------------------------------------------
// ViewQuery trait -- describes a tuple of component types
// ---------------------------------------------------------------------------

/// A tuple of component types that a view can iterate: `(A,)`, `(A, B)`, ...
pub trait ViewQuery: 'static {
    /// One borrowed container per element.
    type Pools<'a>: Copy;
    /// The per-entity output: one shared reference per element.
    type Item<'a>;

    /// Ids of every element's container, or `None` if any is missing.
    fn type_ids(components: &ComponentRegistry) -> Option<Vec<ComponentTypeId>>;
    /// Borrow every element's container, or `None` if any is missing.
    fn fetch_pools(registry: &Registry) -> Option<Self::Pools<'_>>;
    /// The entity sets of the borrowed containers, in element order.
    fn sets<'a>(pools: Self::Pools<'a>) -> Vec<&'a SparseSet>;
    /// Fetch the values of `entity`. The driver container is read at dense
    /// position `pos`; the others through their sparse arrays.
    fn fetch<'a>(
        pools: Self::Pools<'a>,
        driver: usize,
        pos: usize,
        entity: Entity,
    ) -> Option<Self::Item<'a>>;
}

/// Index of the smallest set; the first one wins a tie.
fn pick_driver(lens: &[usize]) -> usize {
    lens.iter()
        .enumerate()
        .min_by_key(|(_, len)| **len)
        .map_or(0, |(idx, _)| idx)
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// The membership tests applied to each driver entity.
#[derive(Debug, Clone, Default)]
struct Filter<'a> {
    /// Requested sets other than the driver.
    include: Vec<&'a SparseSet>,
    exclude: Vec<&'a SparseSet>,
}

impl Filter<'_> {
    #[inline]
    fn accepts(&self, entity: Entity) -> bool {
        !entity.is_tombstone()
            && self.include.iter().all(|set| set.contains(entity))
            && !self.exclude.iter().any(|set| set.contains(entity))
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Read-only view over the entities owning every component in `Q`.
///
/// If any container in `Q` has never been created the view is empty.
pub struct View<'a, Q: ViewQuery> {
    registry: &'a Registry,
    pools: Option<Q::Pools<'a>>,
    driver: Option<&'a SparseSet>,
    driver_idx: usize,
    filter: Filter<'a>,
}

impl<'a, Q: ViewQuery> View<'a, Q> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        let pools = Q::fetch_pools(registry);
        let mut view = Self {
            registry,
            pools,
            driver: None,
            driver_idx: 0,
            filter: Filter::default(),
        };
        if let Some(pools) = pools {
            let mut sets = Q::sets(pools);
            let lens: Vec<usize> = sets.iter().map(|s| s.len()).collect();
            let driver_idx = pick_driver(&lens);
            view.driver = Some(sets.remove(driver_idx));
            view.driver_idx = driver_idx;
            view.filter.include = sets;
        }
        view
    }

    /// Also drop every entity that owns an `E`.
    ///
    /// Excluding a type whose container does not exist excludes nothing.
    pub fn exclude<E: Component>(mut self) -> Self {
        if let Some(storage) = self.registry.storage::<E>() {
            self.filter.exclude.push(storage.set());
        }
        self
    }

    /// Upper bound on the number of matches: the driver's live count.
    pub fn size_hint(&self) -> usize {
        self.driver.map_or(0, SparseSet::len)
    }

    /// Whether `entity` would be yielded by this view.
    pub fn contains(&self, entity: Entity) -> bool {
        self.driver.is_some_and(|d| d.contains(entity)) && self.filter.accepts(entity)
    }

    /// The values `entity` would be yielded with, if it matches.
    pub fn get(&self, entity: Entity) -> Option<Q::Item<'a>> {
        if !self.contains(entity) {
            return None;
        }
        Q::fetch(self.pools?, NO_DRIVER, 0, entity)
    }

    /// Iterate the matches.
    pub fn iter(&self) -> ViewIter<'a, Q> {
        let entities: &'a [Entity] = self.driver.map_or(&[][..], SparseSet::as_slice);
        ViewIter {
            entities: entities.iter().enumerate(),
            pools: self.pools,
            driver_idx: self.driver_idx,
            filter: self.filter.clone(),
        }
    }

    /// Call `f` for every match.
    pub fn each(&self, mut f: impl FnMut(Entity, Q::Item<'a>)) {
        for (entity, item) in self.iter() {
            f(entity, item);
        }
    }
}

impl<'a, Q: ViewQuery> IntoIterator for View<'a, Q> {
    type Item = (Entity, Q::Item<'a>);
    type IntoIter = ViewIter<'a, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, Q: ViewQuery> IntoIterator for &View<'a, Q> {
    type Item = (Entity, Q::Item<'a>);
    type IntoIter = ViewIter<'a, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`View`].
///
/// Walks the driver's dense array as it was when the iterator was created;
/// the borrow on the registry guarantees it does not change underneath.
pub struct ViewIter<'a, Q: ViewQuery> {
    entities: std::iter::Enumerate<std::slice::Iter<'a, Entity>>,
    pools: Option<Q::Pools<'a>>,
    driver_idx: usize,
    filter: Filter<'a>,
}

impl<'a, Q: ViewQuery> Iterator for ViewIter<'a, Q> {
    type Item = (Entity, Q::Item<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let pools = self.pools?;
        for (pos, &entity) in self.entities.by_ref() {
            if !self.filter.accepts(entity) {
                continue;
            }
            if let Some(item) = Q::fetch(pools, self.driver_idx, pos, entity) {
                return Some((entity, item));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len()))
    }
}

// ---------------------------------------------------------------------------
// ViewMut
// ---------------------------------------------------------------------------

/// Mutable view over the entities owning every component in `Q`.
///
/// Matches are visited through [`ViewMut::for_each`], which hands out one
/// `&mut` per requested component. A type may appear only once in `Q`.
pub struct ViewMut<'w, Q: ViewQuery> {
    registry: &'w mut Registry,
    excluded: Vec<ComponentTypeId>,
    _query: PhantomData<Q>,
}

impl<'w, Q: ViewQuery> ViewMut<'w, Q> {
    pub(crate) fn new(registry: &'w mut Registry) -> Self {
        Self {
            registry,
            excluded: Vec::new(),
            _query: PhantomData,
        }
    }

    /// Also skip every entity that owns an `E`.
    pub fn exclude<E: Component>(mut self) -> Self {
        if let Some(id) = self.registry.component_id::<E>() {
            if !self.excluded.contains(&id) {
                self.excluded.push(id);
            }
        }
        self
    }

    /// Borrow the requested containers and the excluded ones side by side.
    ///
    /// Returns `None` when the view is empty by construction: a requested
    /// container is missing, or an excluded type is also requested.
    fn split(
        &mut self,
    ) -> Option<(
        Vec<Option<&mut (dyn AnyStorage + 'static)>>,
        Vec<&SparseSet>,
    )> {
        let ids = Q::type_ids(&self.registry.components)?;
        for (i, id) in ids.iter().enumerate() {
            assert!(
                !ids[..i].contains(id),
                "mutable view contains duplicate access to the same component type"
            );
        }
        if self.excluded.iter().any(|id| ids.contains(id)) {
            return None;
        }
        let requested = ids.len();
        let mut all = ids;
        all.extend_from_slice(&self.excluded);

        let mut pools = self.registry.pools_mut(&all);
        let excluded = pools
            .split_off(requested)
            .into_iter()
            .flatten()
            .map(|storage| storage.set())
            .collect();
        Some((pools, excluded))
    }
}

fn downcast<'a, T: Component>(
    pool: Option<&'a mut (dyn AnyStorage + 'static)>,
) -> Option<&'a mut Storage<T>> {
    pool?.as_any_mut().downcast_mut()
}

// ---------------------------------------------------------------------------
// Tuple impls
// ---------------------------------------------------------------------------

macro_rules! impl_view_query {
    ($(($T:ident, $idx:tt, $var:ident)),+) => {
        impl<$($T: Component),+> ViewQuery for ($($T,)+) {
            type Pools<'a> = ($(&'a Storage<$T>,)+);
            type Item<'a> = ($(&'a $T,)+);

            fn type_ids(components: &ComponentRegistry) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$(components.lookup::<$T>()?),+])
            }

            fn fetch_pools(registry: &Registry) -> Option<Self::Pools<'_>> {
                Some(($(registry.storage::<$T>()?,)+))
            }

            fn sets<'a>(pools: Self::Pools<'a>) -> Vec<&'a SparseSet> {
                vec![$(pools.$idx.set()),+]
            }

            fn fetch<'a>(
                pools: Self::Pools<'a>,
                driver: usize,
                pos: usize,
                entity: Entity,
            ) -> Option<Self::Item<'a>> {
                Some(($(
                    if driver == $idx {
                        pools.$idx.value_at(pos)?
                    } else {
                        pools.$idx.get(entity)?
                    },
                )+))
            }
        }

        impl<'w, $($T: Component),+> ViewMut<'w, ($($T,)+)> {
            /// Call `f` with mutable access to the components of every match.
            ///
            /// # Panics
            ///
            /// Panics if the same component type is requested twice.
            pub fn for_each(mut self, mut f: impl FnMut(Entity, ($(&mut $T,)+))) {
                let Some((pools, excluded)) = self.split() else {
                    return;
                };
                let mut pools = pools.into_iter();
                $(
                    let Some($var) = downcast::<$T>(pools.next().flatten()) else {
                        return;
                    };
                )+

                let driver = pick_driver(&[$($var.len()),+]);
                let extent = match driver {
                    $($idx => $var.set().as_slice().len(),)+
                    _ => 0,
                };
                for pos in 0..extent {
                    let entity = match driver {
                        $($idx => $var.set().as_slice()[pos],)+
                        _ => return,
                    };
                    if entity.is_tombstone()
                        || !($($var.contains(entity))&&+)
                        || excluded.iter().any(|set| set.contains(entity))
                    {
                        continue;
                    }
                    let item = ($(
                        {
                            let value = if driver == $idx {
                                $var.value_at_mut(pos)
                            } else {
                                $var.get_mut(entity)
                            };
                            match value {
                                Some(value) => value,
                                None => continue,
                            }
                        },
                    )+);
                    f(entity, item);
                }
            }
        }
    };
}

impl_view_query!((A, 0, a));
impl_view_query!((A, 0, a), (B, 1, b));
impl_view_query!((A, 0, a), (B, 1, b), (C, 2, c));
impl_view_query!((A, 0, a), (B, 1, b), (C, 2, c), (D, 3, d));
impl_view_query!((A, 0, a), (B, 1, b), (C, 2, c), (D, 3, d), (E, 4, e));

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

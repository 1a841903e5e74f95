//! Registry-level behaviour: entity lifecycle, component access and views.

use sbx_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position(i32);
impl Component for Position {}

#[derive(Debug, Clone, PartialEq)]
struct Velocity(i32);
impl Component for Velocity {}

#[derive(Debug, Clone, PartialEq)]
struct Transform {
    x: f32,
    y: f32,
}
impl Component for Transform {}

#[derive(Debug, Clone, PartialEq)]
struct StaticMesh(&'static str);
impl Component for StaticMesh {}

#[derive(Debug, Clone, PartialEq)]
struct Disabled;
impl Component for Disabled {}

#[derive(Debug, Clone, PartialEq)]
struct Particle(u32);
impl Component for Particle {
    const DELETION_POLICY: DeletionPolicy = DeletionPolicy::InPlace;
    const PAGE_SIZE: usize = 16;
}

#[derive(Debug, Clone, PartialEq)]
struct Marker(u8);
impl Component for Marker {
    const DELETION_POLICY: DeletionPolicy = DeletionPolicy::SwapOnly;
}

// -- entity lifecycle -------------------------------------------------------

#[test]
fn destroyed_entity_leaves_view_and_lookups() {
    let mut registry = Registry::new();
    let e: Vec<Entity> = (0..3).map(|_| registry.create()).collect();
    for (i, &entity) in e.iter().enumerate() {
        registry.add_component(entity, Position(i as i32)).unwrap();
    }
    registry.destroy_entity(e[1]).unwrap();

    let mut seen: Vec<(Entity, i32)> = registry
        .view::<(Position,)>()
        .iter()
        .map(|(entity, (p,))| (entity, p.0))
        .collect();
    seen.sort();
    assert_eq!(seen, vec![(e[0], 0), (e[2], 2)]);
    assert!(matches!(
        registry.get_component::<Position>(e[1]),
        Err(EcsError::NotFound { .. })
    ));
}

#[test]
fn recycled_slot_gets_a_distinct_identifier() {
    let mut registry = Registry::new();
    let e0 = registry.create();
    registry.destroy_entity(e0).unwrap();
    let e1 = registry.create();

    assert_ne!(e0, e1);
    assert_eq!(e0.index(), e1.index());
    assert!(e1.generation() > e0.generation());
    assert!(!registry.is_valid(e0));
    assert!(registry.is_valid(e1));
}

#[test]
fn double_destroy_reports_invalid_entity() {
    let mut registry = Registry::new();
    let e = registry.create_entity("crate");
    registry.destroy_entity(e).unwrap();
    assert_eq!(
        registry.destroy_entity(e),
        Err(EcsError::InvalidEntity { entity: e })
    );
}

#[test]
fn null_entity_is_never_valid() {
    let mut registry = Registry::new();
    let _ = registry.create();
    assert!(!registry.is_valid(Entity::NULL));
    assert!(registry.destroy_entity(Entity::NULL).is_err());
    assert!(!registry.has_component::<Label>(Entity::NULL));
}

#[test]
fn labels_follow_their_entity() {
    let mut registry = Registry::new();
    let camera = registry.create_entity("camera");
    let sun = registry.create_entity(String::from("sun"));
    assert_eq!(registry.label(camera), Some("camera"));
    assert_eq!(registry.label(sun), Some("sun"));

    registry.destroy_entity(camera).unwrap();
    assert_eq!(registry.label(camera), None);
    let reused = registry.create();
    assert_eq!(registry.label(reused), None);
}

#[test]
fn entity_count_tracks_creates_and_destroys() {
    let mut registry = Registry::new();
    let a = registry.create();
    let b = registry.create();
    let _c = registry.create();
    assert_eq!(registry.entity_count(), 3);
    registry.destroy_entity(a).unwrap();
    registry.destroy_entity(b).unwrap();
    assert_eq!(registry.entity_count(), 1);
    assert_eq!(registry.entities().count(), 1);
}

// -- component access -------------------------------------------------------

#[test]
fn add_then_get_round_trips() {
    let mut registry = Registry::new();
    let e = registry.create();
    let stored = registry
        .add_component(e, Transform { x: 3.0, y: -1.5 })
        .unwrap();
    stored.y = 4.0;
    assert_eq!(
        registry.get_component::<Transform>(e),
        Ok(&Transform { x: 3.0, y: 4.0 })
    );
}

#[test]
fn add_component_overwrites_existing_value() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.add_component(e, Position(1)).unwrap();
    registry.add_component(e, Position(2)).unwrap();
    assert_eq!(registry.get_component::<Position>(e), Ok(&Position(2)));
    assert_eq!(registry.component_count::<Position>(), 1);
}

#[test]
fn removal_is_ok_then_not_found() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.add_component(e, Velocity(5)).unwrap();
    assert_eq!(registry.remove_component::<Velocity>(e), Ok(Velocity(5)));
    assert!(matches!(
        registry.remove_component::<Velocity>(e),
        Err(EcsError::NotFound { .. })
    ));
    assert!(!registry.has_component::<Velocity>(e));
}

#[test]
fn stale_handle_cannot_reach_new_owner_components() {
    let mut registry = Registry::new();
    let old = registry.create();
    registry.destroy_entity(old).unwrap();
    let new = registry.create();
    registry.add_component(new, Position(7)).unwrap();

    assert!(!registry.has_component::<Position>(old));
    assert!(registry.get_component::<Position>(old).is_err());
    assert!(registry.get_component_mut::<Position>(old).is_err());
    assert_eq!(
        registry.remove_component::<Position>(old),
        Err(EcsError::InvalidEntity { entity: old })
    );
    assert_eq!(registry.get_component::<Position>(new), Ok(&Position(7)));
}

#[test]
fn patch_component_mutates_in_place() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.add_component(e, Velocity(1)).unwrap();
    let doubled = registry
        .patch_component::<Velocity, _>(e, |v| {
            v.0 *= 2;
            v.0
        })
        .unwrap();
    assert_eq!(doubled, 2);
    assert_eq!(registry.get_component::<Velocity>(e), Ok(&Velocity(2)));
}

#[test]
fn per_type_storage_configuration_is_applied() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.add_component(e, Particle(1)).unwrap();
    registry.add_component(e, Marker(1)).unwrap();
    registry.add_component(e, Position(1)).unwrap();

    assert_eq!(
        registry.storage::<Particle>().unwrap().policy(),
        DeletionPolicy::InPlace
    );
    assert_eq!(registry.storage::<Particle>().unwrap().set().page_size(), 16);
    assert_eq!(
        registry.storage::<Marker>().unwrap().policy(),
        DeletionPolicy::SwapOnly
    );
    assert_eq!(
        registry.storage::<Position>().unwrap().policy(),
        DeletionPolicy::SwapAndPop
    );

    let info = registry
        .component_infos()
        .iter()
        .find(|info| info.name.ends_with("Particle"))
        .unwrap();
    assert_eq!(info.page_size, 16);
}

// -- deletion policies through the registry ---------------------------------

#[test]
fn in_place_removal_keeps_other_positions() {
    let mut registry = Registry::new();
    let e: Vec<Entity> = (0..5).map(|_| registry.create()).collect();
    for (i, &entity) in e.iter().enumerate() {
        registry.add_component(entity, Particle(i as u32)).unwrap();
    }
    let before: Vec<Option<usize>> = e
        .iter()
        .map(|&entity| registry.storage::<Particle>().unwrap().set().index_of(entity))
        .collect();

    registry.remove_component::<Particle>(e[1]).unwrap();
    registry.destroy_entity(e[3]).unwrap();

    let set = registry.storage::<Particle>().unwrap().set();
    for &i in &[0usize, 2, 4] {
        assert_eq!(set.index_of(e[i]), before[i]);
    }
    assert_eq!(set.len(), 3);
}

#[test]
fn swap_and_pop_moves_only_the_last_entry() {
    let mut registry = Registry::new();
    let e: Vec<Entity> = (0..4).map(|_| registry.create()).collect();
    for (i, &entity) in e.iter().enumerate() {
        registry.add_component(entity, Position(i as i32)).unwrap();
    }
    registry.remove_component::<Position>(e[1]).unwrap();

    let set = registry.storage::<Position>().unwrap().set();
    assert_eq!(set.index_of(e[0]), Some(0));
    assert_eq!(set.index_of(e[3]), Some(1));
    assert_eq!(set.index_of(e[2]), Some(2));
    assert_eq!(registry.get_component::<Position>(e[3]), Ok(&Position(3)));
}

#[test]
fn swap_only_entries_can_be_readded() {
    let mut registry = Registry::new();
    let a = registry.create();
    let b = registry.create();
    registry.add_component(a, Marker(1)).unwrap();
    registry.add_component(b, Marker(2)).unwrap();
    registry.remove_component::<Marker>(a).unwrap();
    assert_eq!(registry.component_count::<Marker>(), 1);

    registry.add_component(a, Marker(3)).unwrap();
    assert_eq!(registry.get_component::<Marker>(a), Ok(&Marker(3)));
    assert_eq!(registry.get_component::<Marker>(b), Ok(&Marker(2)));
    let seen: Vec<Entity> = registry.view::<(Marker,)>().iter().map(|(e, _)| e).collect();
    assert_eq!(seen.len(), 2);
}

// -- views ------------------------------------------------------------------

#[test]
fn view_matches_component_ownership() {
    let mut registry = Registry::new();
    let mut entities = Vec::new();
    for i in 0..30 {
        let e = registry.create();
        if i % 2 == 0 {
            registry.add_component(e, Position(i)).unwrap();
        }
        if i % 3 == 0 {
            registry.add_component(e, Velocity(i)).unwrap();
        }
        if i % 5 == 0 {
            registry.add_component(e, Disabled).unwrap();
        }
        entities.push(e);
    }

    let both = registry.view::<(Position, Velocity)>();
    let filtered = registry.view::<(Position,)>().exclude::<Disabled>();
    for &e in &entities {
        let has_pos = registry.has_component::<Position>(e);
        let has_vel = registry.has_component::<Velocity>(e);
        let disabled = registry.has_component::<Disabled>(e);
        assert_eq!(both.contains(e), has_pos && has_vel);
        assert_eq!(filtered.contains(e), has_pos && !disabled);
    }
    assert_eq!(both.iter().count(), 5);
    assert!(filtered.iter().all(|(e, _)| !registry.has_component::<Disabled>(e)));
}

#[test]
fn scene_gathers_draw_data_each_frame() {
    let mut registry = Registry::new();
    let cube = registry.create_entity("cube");
    registry
        .add_component(cube, Transform { x: 0.0, y: 0.0 })
        .unwrap();
    registry.add_component(cube, StaticMesh("cube.obj")).unwrap();
    let hidden = registry.create_entity("hidden");
    registry
        .add_component(hidden, Transform { x: 1.0, y: 1.0 })
        .unwrap();
    registry.add_component(hidden, StaticMesh("tree.obj")).unwrap();
    registry.add_component(hidden, Disabled).unwrap();

    for frame in 0..3 {
        registry
            .view_mut::<(Transform,)>()
            .for_each(|_, (t,)| t.x += 1.0);
        let draws: Vec<(&str, f32)> = registry
            .view::<(StaticMesh, Transform)>()
            .exclude::<Disabled>()
            .iter()
            .map(|(_, (mesh, t))| (mesh.0, t.x))
            .collect();
        assert_eq!(draws, vec![("cube.obj", (frame + 1) as f32)]);
    }

    registry.destroy_entity(cube).unwrap();
    assert_eq!(
        registry
            .view::<(StaticMesh, Transform)>()
            .exclude::<Disabled>()
            .iter()
            .count(),
        0
    );
}

#[test]
fn view_over_unknown_type_is_empty_not_an_error() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.add_component(e, Position(1)).unwrap();
    assert_eq!(registry.view::<(Position, StaticMesh)>().iter().count(), 0);
    assert_eq!(registry.view::<(StaticMesh,)>().size_hint(), 0);
}

#[test]
fn clear_resets_registry() {
    let mut registry = Registry::new();
    for i in 0..10 {
        let e = registry.create_entity(format!("e{i}"));
        registry.add_component(e, Position(i)).unwrap();
    }
    let old = registry.entities().next().unwrap();
    registry.clear();
    assert_eq!(registry.entity_count(), 0);
    assert_eq!(registry.component_count::<Position>(), 0);
    assert!(!registry.is_valid(old));
    assert_eq!(registry.view::<(Position,)>().iter().count(), 0);
}

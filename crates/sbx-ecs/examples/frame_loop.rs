//! Headless frame loop over a small scene.
//!
//! Spawns a few meshes and a batch of short-lived particles, then runs a fixed
//! number of frames. Each frame integrates velocities, expires particles and
//! gathers draw data with a `(StaticMesh, Transform)` view the way a renderer
//! would.
//!
//! Run with: `RUST_LOG=sbx_ecs=trace cargo run --example frame_loop`

use sbx_ecs::prelude::*;

const FRAMES: u32 = 5;
const DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform {
    x: f32,
    y: f32,
}
impl Component for Transform {}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

#[derive(Debug, Clone)]
struct StaticMesh {
    asset: &'static str,
}
impl Component for StaticMesh {}

#[derive(Debug, Clone, Copy)]
struct Hidden;
impl Component for Hidden {}

/// Frames left before a particle is destroyed.
#[derive(Debug, Clone, Copy)]
struct Lifetime(u32);
impl Component for Lifetime {
    const DELETION_POLICY: DeletionPolicy = DeletionPolicy::InPlace;
}

fn spawn_scene(registry: &mut Registry) -> Result<(), EcsError> {
    for (i, asset) in ["crate.obj", "barrel.obj", "lamp.obj"].into_iter().enumerate() {
        let e = registry.create_entity(asset);
        registry.add_component(
            e,
            Transform {
                x: i as f32 * 2.0,
                y: 0.0,
            },
        )?;
        registry.add_component(e, StaticMesh { asset })?;
        if asset == "lamp.obj" {
            registry.add_component(e, Hidden)?;
        }
    }

    for i in 0..8u32 {
        let e = registry.create_entity(format!("spark-{i}"));
        registry.add_component(e, Transform { x: 0.0, y: 1.0 })?;
        registry.add_component(
            e,
            Velocity {
                dx: i as f32 - 4.0,
                dy: 3.0,
            },
        )?;
        registry.add_component(e, Lifetime(1 + i % 4))?;
    }
    Ok(())
}

fn integrate(registry: &mut Registry) {
    registry
        .view_mut::<(Transform, Velocity)>()
        .for_each(|_, (t, v)| {
            t.x += v.dx * DT;
            t.y += v.dy * DT;
        });
}

/// Count down lifetimes and destroy the particles that ran out.
fn expire(registry: &mut Registry) -> Result<usize, EcsError> {
    let mut expired = Vec::new();
    registry.retain_components::<Lifetime>(|e, life| {
        if life.0 == 0 {
            expired.push(e);
            return false;
        }
        life.0 -= 1;
        true
    });
    for &e in &expired {
        registry.destroy_entity(e)?;
    }
    Ok(expired.len())
}

fn draw(registry: &Registry, frame: u32) {
    for (e, (mesh, t)) in registry
        .view::<(StaticMesh, Transform)>()
        .exclude::<Hidden>()
    {
        tracing::info!(
            frame,
            entity = %e,
            label = registry.label(e).unwrap_or("-"),
            asset = mesh.asset,
            x = t.x,
            y = t.y,
            "draw"
        );
    }
}

fn main() -> Result<(), EcsError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut registry = Registry::new();
    spawn_scene(&mut registry)?;

    for frame in 0..FRAMES {
        integrate(&mut registry);
        let expired = expire(&mut registry)?;
        draw(&registry, frame);
        tracing::info!(
            frame,
            entities = registry.entity_count(),
            particles = registry.component_count::<Lifetime>(),
            expired,
            "frame done"
        );
    }

    // Recycled slots come back with a new generation.
    let reused = registry.create_entity("late-spark");
    tracing::info!(entity = %reused, slots_retired = registry.retired_count(), "spawned");
    Ok(())
}

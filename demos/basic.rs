//! Example: spawn, migrate, query, defer

use chunk_ecs::debug::WorldInspector;
use chunk_ecs::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Health(u32);

fn main() -> Result<()> {
    let mut world = World::new();

    println!("Creating entities...");
    let mover = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.5 }))?;
    let fighter = world.spawn((
        Position { x: 10.0, y: 20.0 },
        Velocity { x: -1.0, y: 2.0 },
        Health(100),
    ))?;
    let statue = world.spawn((Position { x: 5.0, y: 5.0 },))?;
    println!("Spawned {mover:?}, {fighter:?}, {statue:?}");

    // Moves the statue into the {Position, Health} archetype
    world.insert_one(statue, Health(1))?;

    for _ in 0..3 {
        world
            .query_mut::<(&mut Position, &Velocity)>()?
            .for_each(|(pos, vel)| {
                pos.x += vel.x;
                pos.y += vel.y;
            });
    }

    let mut commands = CommandBuffer::new();
    world
        .query_filtered::<(EntityId, &Health)>(Filter::new().without::<Velocity>())?
        .for_each(|(entity, health)| {
            if health.0 < 10 {
                commands.despawn(entity);
            }
        });
    world.flush_commands(commands)?;

    for (entity, pos) in world.query::<(EntityId, &Position)>()? {
        println!("{entity:?} at ({:.1}, {:.1})", pos.x, pos.y);
    }

    for info in WorldInspector::archetype_summary(&world) {
        println!(
            "Archetype {}: {} entities in {} chunks, components {:?}",
            info.id, info.entity_count, info.chunk_count, info.components
        );
    }
    println!("Memory: {:?}", world.memory_stats());
    Ok(())
}

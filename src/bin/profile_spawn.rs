use std::time::Instant;

use chunk_ecs::prelude::*;

#[derive(Debug, Clone)]
struct Position(f32, f32, f32);

#[derive(Debug, Clone)]
struct Velocity(f32, f32, f32);

#[derive(Debug, Clone)]
struct Health(u32);

#[tracing::instrument(skip(world))]
fn profile_spawns(world: &mut World, count: usize) -> Result<Vec<EntityId>> {
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        if i % 1_000 == 0 {
            tracing::info!("Spawning entity {}/{}", i, count);
        }
        entities.push(world.spawn((
            Position(1.0, 2.0, 3.0),
            Velocity(1.0, 0.0, 0.0),
            Health(100),
        ))?);
    }
    Ok(entities)
}

#[tracing::instrument(skip(world, entities))]
fn profile_migrations(world: &mut World, entities: &[EntityId]) -> Result<()> {
    for &entity in entities.iter().step_by(2) {
        world.remove_one::<Velocity>(entity)?;
    }
    for &entity in entities.iter().step_by(2) {
        world.insert_one(entity, Velocity(0.0, 1.0, 0.0))?;
    }
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _guard = chunk_ecs::profiling::init_json_file("trace.json")?;

    let mut world = World::new();

    println!("Warming up...");
    {
        let _span = tracing::info_span!("warmup").entered();
        for _ in 0..1000 {
            world.spawn((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0)))?;
        }
    }

    println!("Profiling spawn with 3 components...");
    let start = Instant::now();
    let entities = profile_spawns(&mut world, 10_000)?;
    println!("Spawn 10k entities complete in: {:?}", start.elapsed());

    let start = Instant::now();
    profile_migrations(&mut world, &entities)?;
    println!("Migrate 10k entities complete in: {:?}", start.elapsed());
    Ok(())
}

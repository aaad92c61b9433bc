use chunk_ecs::prelude::*;
use chunk_ecs::ComponentRegistry;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Big([u64; 4]);
struct First;
struct Second;
struct Third;

#[test]
fn test_chunk_boundary_allocates_next_chunk() -> Result<()> {
    let mut world = World::with_config(WorldConfig::default().with_chunk_bytes(400))?;
    let first = world.spawn((Big([0; 4]),))?;
    let archetype = world.location(first)?.archetype_id;
    let capacity = world.archetype(archetype).unwrap().chunk_capacity();
    assert_eq!(capacity, 400 / (32 + std::mem::size_of::<EntityId>()));

    for _ in 1..capacity - 1 {
        world.spawn((Big([1; 4]),))?;
    }
    assert_eq!(world.archetype(archetype).unwrap().chunks().len(), 1);

    // Exactly one more fits
    let last = world.spawn((Big([2; 4]),))?;
    assert_eq!(world.location(last)?.slot, capacity - 1);
    assert_eq!(world.archetype(archetype).unwrap().chunks().len(), 1);

    let overflow = world.spawn((Big([3; 4]),))?;
    let location = world.location(overflow)?;
    assert_eq!((location.chunk_index, location.slot), (1, 0));
    assert_eq!(world.query::<&Big>()?.count(), capacity + 1);
    Ok(())
}

#[test]
fn test_registry_capacity_exceeded() -> Result<()> {
    let mut world = World::with_config(WorldConfig::default().with_max_component_types(2))?;
    let e = world.spawn((First, Second))?;

    let err = world.insert(e, (Third,)).unwrap_err();
    assert_eq!(err, EcsError::CapacityExceeded { registered: 2, capacity: 2 });
    assert!(world.spawn((Third,)).is_err());
    assert!(world.query::<&Third>().is_err());

    // Registered types keep working
    assert!(world.has::<First>(e)?);
    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    assert!(matches!(
        World::with_config(WorldConfig::default().with_chunk_bytes(0)),
        Err(EcsError::InvalidConfig(_))
    ));
    assert!(matches!(
        World::with_config(WorldConfig::default().with_max_component_types(0)),
        Err(EcsError::InvalidConfig(_))
    ));
}

#[test]
fn test_config_from_json() -> Result<()> {
    let config = WorldConfig::from_json_str(r#"{ "chunk_bytes": 128, "compact_empty_chunks": false }"#)?;
    let mut world = World::with_config(config)?;
    let e = world.spawn((Big([9; 4]),))?;
    let archetype = world.location(e)?.archetype_id;
    assert_eq!(world.archetype(archetype).unwrap().chunk_capacity(), 3);
    assert!(!world.config().compact_empty_chunks);
    Ok(())
}

#[test]
fn test_shared_registry_gives_same_ids() -> Result<()> {
    let registry = Arc::new(ComponentRegistry::new());
    let w1 = World::with_registry(Arc::clone(&registry), WorldConfig::default())?;
    let w2 = World::with_registry(Arc::clone(&registry), WorldConfig::default())?;
    assert_eq!(w2.component_id::<Second>()?, w1.component_id::<Second>()?);
    assert_eq!(registry.len(), 1);
    Ok(())
}

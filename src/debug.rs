use crate::entity::{ArchetypeId, EntityId};
use crate::error::Result;
use crate::world::World;

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    /// Get total entity count
    pub fn entity_count(world: &World) -> usize {
        world.entity_count()
    }

    /// Get archetype summary
    pub fn archetype_summary(world: &World) -> Vec<ArchetypeInfo> {
        let registry = world.registry();
        world
            .archetypes()
            .iter()
            .map(|archetype| ArchetypeInfo {
                id: archetype.id(),
                components: archetype
                    .signature()
                    .ones()
                    .map(|id| registry.name(id))
                    .collect(),
                entity_count: archetype.len(),
                chunk_count: archetype.chunks().len(),
                chunk_capacity: archetype.chunk_capacity(),
            })
            .collect()
    }

    /// Log world summary at debug level
    pub fn log_summary(world: &World) {
        let stats = world.memory_stats();
        tracing::debug!(
            entities = world.entity_count(),
            archetypes = world.archetype_count(),
            chunk_bytes = stats.chunk_memory,
            "world summary"
        );
        for info in Self::archetype_summary(world) {
            tracing::debug!(
                archetype = info.id,
                entities = info.entity_count,
                chunks = info.chunk_count,
                components = ?info.components,
                "archetype"
            );
        }
    }

    /// Component names and location of one entity
    pub fn describe_entity(world: &World, entity: EntityId) -> Result<EntityInfo> {
        let location = world.location(entity)?;
        let registry = world.registry();
        Ok(EntityInfo {
            archetype: location.archetype_id,
            chunk_index: location.chunk_index,
            slot: location.slot,
            components: world
                .signature_of(entity)?
                .ones()
                .map(|id| registry.name(id))
                .collect(),
        })
    }
}

/// Archetype information for debugging
#[derive(Clone, Debug)]
pub struct ArchetypeInfo {
    pub id: ArchetypeId,
    pub components: Vec<&'static str>,
    pub entity_count: usize,
    pub chunk_count: usize,
    pub chunk_capacity: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    pub archetype: ArchetypeId,
    pub chunk_index: usize,
    pub slot: usize,
    pub components: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Label(&'static str);
    struct Score(u32);

    #[test]
    fn test_world_inspector() {
        let mut world = World::new();
        assert_eq!(WorldInspector::entity_count(&world), 0);

        let e = world.spawn((Label("a"), Score(1))).unwrap();
        world.spawn((Score(2),)).unwrap();

        let summary = WorldInspector::archetype_summary(&world);
        assert_eq!(summary.len(), 3);
        let pair = summary.iter().find(|info| info.components.len() == 2).unwrap();
        assert_eq!(pair.entity_count, 1);
        assert_eq!(pair.chunk_count, 1);

        let info = WorldInspector::describe_entity(&world, e).unwrap();
        assert_eq!((info.chunk_index, info.slot), (0, 0));
        assert!(info.components.iter().any(|name| name.ends_with("Label")));
        WorldInspector::log_summary(&world);
    }
}

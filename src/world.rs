// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: central entity and archetype storage
//!
//! The world owns the archetype table, the entity allocator and the
//! entity-location table. Every storage move updates the location table in
//! the same call, including the entity swapped into a vacated slot.
//!
//! Structural changes take `&mut World` and queries borrow the world, so the
//! borrow checker rules out structural changes during iteration.

use std::any::type_name;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeRemoval};
use crate::bitset::Signature;
use crate::chunk::Chunk;
use crate::command::CommandBuffer;
use crate::component::{Bundle, Component, MAX_BUNDLE_COMPONENTS};
use crate::config::WorldConfig;
use crate::entity::{ArchetypeId, EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::observer::{EntityEvent, Observer, ObserverId, ObserverRegistry};
use crate::query::{Access, ArchetypeFilter, Filter, Query, QueryFetch, QueryMut, ReadOnlyFetch};
use crate::registry::{ComponentId, ComponentRegistry};

fn next_world_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Memory held by a world's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub chunk_memory: usize,
    pub entity_index_memory: usize,
    pub total_memory: usize,
}

/// Central ECS world
pub struct World {
    id: u64,
    config: WorldConfig,
    registry: Arc<ComponentRegistry>,

    /// Entity locations keyed by SlotMap IDs
    entity_locations: SlotMap<EntityId, EntityLocation>,

    /// All archetypes in the world; never removed
    archetypes: Vec<Archetype>,

    /// Signature hash -> archetypes with that hash
    archetype_index: FxHashMap<u64, SmallVec<[ArchetypeId; 1]>>,

    /// Cache for single-component archetype transitions (from, component, added)
    transitions: AHashMap<(ArchetypeId, ComponentId, bool), ArchetypeId>,

    /// Observer registry for lifecycle events
    observers: ObserverRegistry,
}

impl World {
    /// Create a new, empty world with default configuration.
    pub fn new() -> Self {
        Self::build(WorldConfig::default(), Arc::new(ComponentRegistry::new()))
    }

    /// World with its own registry capped at `config.max_component_types`
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let registry = ComponentRegistry::with_capacity(config.max_component_types)?;
        Ok(Self::build(config, Arc::new(registry)))
    }

    /// World sharing a component registry with other worlds
    pub fn with_registry(registry: Arc<ComponentRegistry>, config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, registry))
    }

    fn build(config: WorldConfig, registry: Arc<ComponentRegistry>) -> Self {
        let mut world = Self {
            id: next_world_id(),
            entity_locations: SlotMap::with_capacity_and_key(config.initial_entity_capacity),
            archetypes: Vec::with_capacity(config.initial_archetype_capacity),
            archetype_index: FxHashMap::default(),
            transitions: AHashMap::with_capacity(128),
            observers: ObserverRegistry::new(),
            registry,
            config,
        };
        // Archetype 0 holds entities with no components
        world.insert_archetype(Signature::EMPTY, SmallVec::new());
        world
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Registered id of `T`, registering it on first use
    pub fn component_id<T: Component>(&self) -> Result<ComponentId> {
        self.registry.register::<T>()
    }

    /// Spawn a new entity with the given bundle of components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let ids = B::component_ids(&self.registry)?;
        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "world.spawn",
            bundle_components = ids.len(),
            archetype_count = self.archetypes.len()
        )
        .entered();

        let signature = Signature::from_ids(&ids);
        let arch_id = self.get_or_create_archetype(&signature)?;
        let entity = self.entity_locations.insert(EntityLocation::PENDING);

        let archetype = &mut self.archetypes[arch_id];
        let (chunk_index, slot) = archetype.allocate(entity);
        let chunk = &mut archetype.chunks_mut()[chunk_index];
        let ptrs = slot_ptrs(chunk, &ids, slot);
        // SAFETY: one freshly claimed slot per bundle field, in field order
        unsafe { bundle.write_components(&ptrs) };

        self.entity_locations[entity] = EntityLocation {
            archetype_id: arch_id,
            chunk_index,
            slot,
        };

        if !self.observers.is_empty() {
            self.observers.notify(EntityEvent::Spawned(entity));
            for &id in &ids {
                self.observers.notify(EntityEvent::ComponentAdded(entity, id));
            }
        }
        Ok(entity)
    }

    /// Spawn multiple entities with the same component bundle in a batch
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let bundles = bundles.into_iter();
        let mut entities = Vec::with_capacity(bundles.size_hint().0);
        for bundle in bundles {
            entities.push(self.spawn(bundle)?);
        }
        Ok(entities)
    }

    /// Despawn entity immediately
    ///
    /// Removes the entity and drops all its components.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.despawn").entered();

        let location = self
            .entity_locations
            .remove(entity)
            .ok_or(EcsError::InvalidEntity(entity))?;
        let archetype = &mut self.archetypes[location.archetype_id];
        let signature = *archetype.signature();
        let removal = archetype.remove_at(location.chunk_index, location.slot);
        self.apply_removal(location.archetype_id, location.chunk_index, removal);

        if !self.observers.is_empty() {
            if self.config.notify_removed_on_despawn {
                for id in signature.ones() {
                    self.observers.notify(EntityEvent::ComponentRemoved(entity, id));
                }
            }
            self.observers.notify(EntityEvent::Despawned(entity));
        }
        Ok(())
    }

    /// Add components to an entity, moving it to the archetype for its new
    /// signature. Fails with `DuplicateComponent` if it already has any of them.
    pub fn insert<B: Bundle>(&mut self, entity: EntityId, bundle: B) -> Result<()> {
        let location = self.location(entity)?;
        let ids = B::component_ids(&self.registry)?;

        let src_signature = *self.archetypes[location.archetype_id].signature();
        let mut dst_signature = src_signature;
        for &id in &ids {
            if src_signature.contains(id) {
                return Err(EcsError::DuplicateComponent(self.registry.name(id)));
            }
            dst_signature.set(id);
        }

        let dst = if let [id] = ids[..] {
            self.transition(location.archetype_id, id, true, &dst_signature)?
        } else {
            self.get_or_create_archetype(&dst_signature)?
        };

        self.migrate(entity, location, dst, |_, _, dst_chunk, dst_slot| {
            let ptrs = slot_ptrs(dst_chunk, &ids, dst_slot);
            // SAFETY: the added columns of the new slot are still unwritten
            unsafe { bundle.write_components(&ptrs) };
        });

        if !self.observers.is_empty() {
            for &id in &ids {
                self.observers.notify(EntityEvent::ComponentAdded(entity, id));
            }
        }
        Ok(())
    }

    /// Add a single component
    pub fn insert_one<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        self.insert(entity, (component,))
    }

    /// Remove components from an entity and return their values.
    ///
    /// Fails with `MissingComponent` if the entity lacks any of them.
    pub fn remove<B: Bundle>(&mut self, entity: EntityId) -> Result<B> {
        let location = self.location(entity)?;
        let ids = B::component_ids(&self.registry)?;

        let src_signature = *self.archetypes[location.archetype_id].signature();
        let mut dst_signature = src_signature;
        for &id in &ids {
            if !src_signature.contains(id) {
                return Err(EcsError::MissingComponent(self.registry.name(id)));
            }
            dst_signature.clear(id);
        }

        let dst = if let [id] = ids[..] {
            self.transition(location.archetype_id, id, false, &dst_signature)?
        } else {
            self.get_or_create_archetype(&dst_signature)?
        };

        let removed = self.migrate(entity, location, dst, |src_chunk, src_slot, _, _| {
            let ptrs: SmallVec<[*const u8; MAX_BUNDLE_COMPONENTS]> = slot_ptrs(src_chunk, &ids, src_slot)
                .into_iter()
                .map(|ptr| ptr as *const u8)
                .collect();
            // SAFETY: removed columns of the source slot are initialized and
            // are not dropped when the slot is vacated
            unsafe { B::read_components(&ptrs) }
        });

        if !self.observers.is_empty() {
            for &id in &ids {
                self.observers.notify(EntityEvent::ComponentRemoved(entity, id));
            }
        }
        Ok(removed)
    }

    /// Remove a single component and return it
    pub fn remove_one<T: Component>(&mut self, entity: EntityId) -> Result<T> {
        self.remove::<(T,)>(entity).map(|(value,)| value)
    }

    /// Move `entity` from `src` into a new slot of archetype `dst_id`.
    ///
    /// Shared components are moved bitwise, then `finish` fills added columns
    /// or reads removed ones before the source slot is vacated.
    fn migrate<R>(
        &mut self,
        entity: EntityId,
        src: EntityLocation,
        dst_id: ArchetypeId,
        finish: impl FnOnce(&Chunk, usize, &mut Chunk, usize) -> R,
    ) -> R {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.migrate", from = src.archetype_id, to = dst_id).entered();
        debug_assert_ne!(src.archetype_id, dst_id);

        let (src_arch, dst_arch) = pair_mut(&mut self.archetypes, src.archetype_id, dst_id);
        let (dst_chunk_index, dst_slot) = dst_arch.allocate(entity);

        let out = {
            let src_chunk = &src_arch.chunks()[src.chunk_index];
            let dst_chunk = &mut dst_arch.chunks_mut()[dst_chunk_index];
            // SAFETY: src slot is live, dst slot was just claimed
            unsafe { Chunk::move_shared(src_chunk, src.slot, dst_chunk, dst_slot) };
            finish(src_chunk, src.slot, dst_chunk, dst_slot)
        };

        let removal = src_arch.remove_moved(src.chunk_index, src.slot);
        self.apply_removal(src.archetype_id, src.chunk_index, removal);

        self.entity_locations[entity] = EntityLocation {
            archetype_id: dst_id,
            chunk_index: dst_chunk_index,
            slot: dst_slot,
        };
        tracing::trace!(
            ?entity,
            from = src.archetype_id,
            to = dst_id,
            "moved entity between archetypes"
        );
        out
    }

    /// Write back locations changed by a removal from `(arch_id, chunk_index)`
    fn apply_removal(&mut self, arch_id: ArchetypeId, chunk_index: usize, removal: ArchetypeRemoval) {
        if let Some((swapped, slot)) = removal.swapped {
            if let Some(location) = self.entity_locations.get_mut(swapped) {
                location.chunk_index = chunk_index;
                location.slot = slot;
            }
        }
        if let Some(relocated) = removal.relocated_chunk {
            for &moved in self.archetypes[arch_id].chunks()[relocated].entities() {
                if let Some(location) = self.entity_locations.get_mut(moved) {
                    location.chunk_index = relocated;
                }
            }
        }
    }

    fn transition(
        &mut self,
        from: ArchetypeId,
        id: ComponentId,
        added: bool,
        signature: &Signature,
    ) -> Result<ArchetypeId> {
        if let Some(&to) = self.transitions.get(&(from, id, added)) {
            return Ok(to);
        }
        let to = self.get_or_create_archetype(signature)?;
        self.transitions.insert((from, id, added), to);
        Ok(to)
    }

    /// Archetype for `signature`, creating it on first request.
    ///
    /// The table is keyed by signature hash; a hit is only reused after the
    /// full bit vectors compare equal.
    pub fn get_or_create_archetype(&mut self, signature: &Signature) -> Result<ArchetypeId> {
        if let Some(id) = self.find_archetype(signature) {
            return Ok(id);
        }

        let mut components = SmallVec::new();
        for id in signature.ones() {
            let info = self
                .registry
                .info(id)
                .ok_or(EcsError::MissingComponent("<unregistered>"))?;
            components.push(info);
        }
        Ok(self.insert_archetype(*signature, components))
    }

    /// Existing archetype for `signature`, if any
    pub fn find_archetype(&self, signature: &Signature) -> Option<ArchetypeId> {
        self.archetype_index
            .get(&signature.hash_value())?
            .iter()
            .copied()
            .find(|&id| self.archetypes[id].signature() == signature)
    }

    fn insert_archetype(
        &mut self,
        signature: Signature,
        components: SmallVec<[crate::registry::ComponentInfo; 8]>,
    ) -> ArchetypeId {
        let id = self.archetypes.len();
        let archetype = Archetype::new(
            id,
            signature,
            components,
            self.config.chunk_bytes,
            self.config.compact_empty_chunks,
        );
        tracing::debug!(
            archetype = id,
            components = signature.len(),
            chunk_capacity = archetype.chunk_capacity(),
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.archetype_index
            .entry(signature.hash_value())
            .or_default()
            .push(id);
        id
    }

    /// Check if an entity is alive
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entity_locations.contains_key(entity)
    }

    /// Get entity location
    pub fn location(&self, entity: EntityId) -> Result<EntityLocation> {
        self.entity_locations
            .get(entity)
            .copied()
            .ok_or(EcsError::InvalidEntity(entity))
    }

    /// Current component set of an entity
    pub fn signature_of(&self, entity: EntityId) -> Result<Signature> {
        let location = self.location(entity)?;
        Ok(*self.archetypes[location.archetype_id].signature())
    }

    /// Check if entity has a specific component
    pub fn has<T: Component>(&self, entity: EntityId) -> Result<bool> {
        let location = self.location(entity)?;
        Ok(self
            .registry
            .id_of::<T>()
            .is_some_and(|id| self.archetypes[location.archetype_id].has_component(id)))
    }

    /// Get immutable reference to a component on an entity
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T> {
        let location = self.location(entity)?;
        let missing = EcsError::MissingComponent(type_name::<T>());
        let id = self.registry.id_of::<T>().ok_or(missing.clone())?;
        self.archetypes[location.archetype_id].chunks()[location.chunk_index]
            .get::<T>(id, location.slot)
            .ok_or(missing)
    }

    /// Get mutable reference to a component on an entity
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T> {
        let location = self.location(entity)?;
        let missing = EcsError::MissingComponent(type_name::<T>());
        let id = self.registry.id_of::<T>().ok_or(missing.clone())?;
        self.archetypes[location.archetype_id].chunks_mut()[location.chunk_index]
            .get_mut::<T>(id, location.slot)
            .ok_or(missing)
    }

    /// Fetch one entity's row through its location
    ///
    /// `world.row::<(EntityId, &Position, Option<&Velocity>)>(e)`
    pub fn row<Q: ReadOnlyFetch>(&self, entity: EntityId) -> Result<Q::Item<'_>> {
        // SAFETY: read-only fetch through a shared borrow
        unsafe { self.fetch_row::<Q>(entity) }
    }

    /// Mutable variant of [`World::row`]
    pub fn row_mut<Q: QueryFetch>(&mut self, entity: EntityId) -> Result<Q::Item<'_>> {
        // SAFETY: &mut self is exclusive and Access rejects aliasing fetches
        unsafe { self.fetch_row::<Q>(entity) }
    }

    unsafe fn fetch_row<Q: QueryFetch>(&self, entity: EntityId) -> Result<Q::Item<'_>> {
        let location = self.location(entity)?;
        let mut access = Access::default();
        let init = Q::init(&self.registry, &mut access)?;

        let archetype = &self.archetypes[location.archetype_id];
        if let Some(missing) = access.required.difference(archetype.signature()).ones().next() {
            return Err(EcsError::MissingComponent(self.registry.name(missing)));
        }
        let chunk = &archetype.chunks()[location.chunk_index];
        let state = Q::prepare(&init, chunk);
        Ok(Q::fetch(state, location.slot))
    }

    /// Read-only query over all entities matching `Q`
    pub fn query<Q: ReadOnlyFetch>(&self) -> Result<Query<'_, Q>> {
        Query::new(self, Filter::new())
    }

    /// Read-only query with extra with/without/any constraints
    pub fn query_filtered<Q: ReadOnlyFetch>(&self, filter: Filter) -> Result<Query<'_, Q>> {
        Query::new(self, filter)
    }

    /// Query that may write components in place
    pub fn query_mut<Q: QueryFetch>(&mut self) -> Result<QueryMut<'_, Q>> {
        QueryMut::new(self, Filter::new())
    }

    pub fn query_mut_filtered<Q: QueryFetch>(&mut self, filter: Filter) -> Result<QueryMut<'_, Q>> {
        QueryMut::new(self, filter)
    }

    /// Archetypes whose signature satisfies `filter`
    pub fn matching_archetypes<'a>(
        &'a self,
        filter: &'a ArchetypeFilter,
    ) -> impl Iterator<Item = &'a Archetype> + 'a {
        self.archetypes
            .iter()
            .filter(move |archetype| filter.matches(archetype.signature()))
    }

    /// Register an observer for lifecycle events
    pub fn add_observer(&mut self, observer: impl Observer + 'static) -> ObserverId {
        self.observers.register(Box::new(observer))
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id).is_some()
    }

    /// Apply deferred commands in recording order, stopping at the first error
    pub fn flush_commands(&mut self, buffer: CommandBuffer) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.flush_commands", queued = buffer.len()).entered();

        for command in buffer {
            command.apply(self)?;
        }
        Ok(())
    }

    /// Get archetype by ID
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Get all archetypes
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    /// Get memory usage statistics
    pub fn memory_stats(&self) -> MemoryStats {
        let chunk_memory = self.archetypes.iter().map(Archetype::reserved_bytes).sum();
        let entity_index_memory =
            self.entity_locations.capacity() * std::mem::size_of::<EntityLocation>();

        MemoryStats {
            chunk_memory,
            entity_index_memory,
            total_memory: chunk_memory + entity_index_memory,
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot pointers for `ids` in `chunk`, in the same order
fn slot_ptrs(chunk: &Chunk, ids: &[ComponentId], slot: usize) -> SmallVec<[*mut u8; MAX_BUNDLE_COMPONENTS]> {
    ids.iter()
        .map(|&id| match chunk.column_index(id) {
            // SAFETY: column exists and slot is below capacity
            Some(column) => unsafe { chunk.slot_ptr(column, slot) },
            None => unreachable!("archetype signature lacks a bundle component"),
        })
        .collect()
}

/// Two distinct archetypes borrowed mutably at once
fn pair_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

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

//! Query system with archetype filtering
//!
//! A query resolves its component types to ids once, selects every
//! archetype whose signature satisfies the filter, then walks the chunks of
//! those archetypes. Per chunk it looks up one base pointer per component
//! and visits slots `[0, len)`, so the inner loop never consults the
//! registry or the lookup table.

use std::marker::PhantomData;

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::Archetype;
use crate::bitset::Signature;
use crate::chunk::Chunk;
use crate::component::Component;
use crate::entity::{ArchetypeId, EntityId};
use crate::error::{EcsError, Result};
use crate::registry::{ComponentId, ComponentRegistry};
use crate::world::World;

type MatchedArchetypes = SmallVec<[ArchetypeId; 16]>;

/// Components a query requires, reads and writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Access {
    /// Components an archetype must have to match
    pub required: Signature,
    pub reads: Signature,
    pub writes: Signature,
}

impl Access {
    /// Record a shared read; fails if the same query already writes `id`
    pub fn add_read(&mut self, id: ComponentId, name: &'static str) -> Result<()> {
        if self.writes.contains(id) {
            return Err(EcsError::ConflictingAccess(name));
        }
        self.reads.set(id);
        Ok(())
    }

    /// Record an exclusive write; fails on any other access to `id`
    pub fn add_write(&mut self, id: ComponentId, name: &'static str) -> Result<()> {
        if self.reads.contains(id) || self.writes.contains(id) {
            return Err(EcsError::ConflictingAccess(name));
        }
        self.writes.set(id);
        Ok(())
    }
}

/// Types that can be fetched from a chunk row
///
/// # Safety
/// `init` must declare in `access` every component `fetch` touches, with
/// writes marked as writes, and must put every non-optional component in
/// `access.required`. The query engine relies on this to hand out
/// non-aliasing references.
pub unsafe trait QueryFetch {
    /// Value produced for one entity
    type Item<'w>;
    /// Resolved component ids
    type Init: Copy + Send + Sync + 'static;
    /// Per-chunk base pointers
    type State: Copy;

    fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<Self::Init>;

    /// # Safety
    /// `chunk` must belong to an archetype containing `access.required`.
    unsafe fn prepare(init: &Self::Init, chunk: &Chunk) -> Self::State;

    /// # Safety
    /// `slot` must be live in the prepared chunk and the caller must hold
    /// the access declared by `init` for `'w`.
    unsafe fn fetch<'w>(state: Self::State, slot: usize) -> Self::Item<'w>;
}

/// Fetches that never write, usable through a shared world borrow
///
/// # Safety
/// `init` must not record any writes.
pub unsafe trait ReadOnlyFetch: QueryFetch {}

unsafe impl<'a, T: Component> QueryFetch for &'a T {
    type Item<'w> = &'w T;
    type Init = ComponentId;
    type State = *const T;

    fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<ComponentId> {
        let id = registry.register::<T>()?;
        access.add_read(id, std::any::type_name::<T>())?;
        access.required.set(id);
        Ok(id)
    }

    #[inline]
    unsafe fn prepare(init: &ComponentId, chunk: &Chunk) -> *const T {
        chunk.first_ptr::<T>(*init)
    }

    #[inline]
    unsafe fn fetch<'w>(state: *const T, slot: usize) -> &'w T {
        &*state.add(slot)
    }
}

unsafe impl<'a, T: Component> ReadOnlyFetch for &'a T {}

unsafe impl<'a, T: Component> QueryFetch for &'a mut T {
    type Item<'w> = &'w mut T;
    type Init = ComponentId;
    type State = *mut T;

    fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<ComponentId> {
        let id = registry.register::<T>()?;
        access.add_write(id, std::any::type_name::<T>())?;
        access.required.set(id);
        Ok(id)
    }

    #[inline]
    unsafe fn prepare(init: &ComponentId, chunk: &Chunk) -> *mut T {
        chunk.first_ptr::<T>(*init)
    }

    #[inline]
    unsafe fn fetch<'w>(state: *mut T, slot: usize) -> &'w mut T {
        &mut *state.add(slot)
    }
}

unsafe impl<'a, T: Component> QueryFetch for Option<&'a T> {
    type Item<'w> = Option<&'w T>;
    type Init = ComponentId;
    type State = Option<*const T>;

    fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<ComponentId> {
        let id = registry.register::<T>()?;
        access.add_read(id, std::any::type_name::<T>())?;
        Ok(id)
    }

    #[inline]
    unsafe fn prepare(init: &ComponentId, chunk: &Chunk) -> Option<*const T> {
        chunk
            .column_index(*init)
            .map(|column| chunk.column_base_unchecked(column) as *const T)
    }

    #[inline]
    unsafe fn fetch<'w>(state: Option<*const T>, slot: usize) -> Option<&'w T> {
        state.map(|base| &*base.add(slot))
    }
}

unsafe impl<'a, T: Component> ReadOnlyFetch for Option<&'a T> {}

unsafe impl<'a, T: Component> QueryFetch for Option<&'a mut T> {
    type Item<'w> = Option<&'w mut T>;
    type Init = ComponentId;
    type State = Option<*mut T>;

    fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<ComponentId> {
        let id = registry.register::<T>()?;
        access.add_write(id, std::any::type_name::<T>())?;
        Ok(id)
    }

    #[inline]
    unsafe fn prepare(init: &ComponentId, chunk: &Chunk) -> Option<*mut T> {
        chunk
            .column_index(*init)
            .map(|column| chunk.column_base_unchecked(column) as *mut T)
    }

    #[inline]
    unsafe fn fetch<'w>(state: Option<*mut T>, slot: usize) -> Option<&'w mut T> {
        state.map(|base| &mut *base.add(slot))
    }
}

/// Entity handle of each row
unsafe impl QueryFetch for EntityId {
    type Item<'w> = EntityId;
    type Init = ();
    type State = *const EntityId;

    fn init(_registry: &ComponentRegistry, _access: &mut Access) -> Result<()> {
        Ok(())
    }

    #[inline]
    unsafe fn prepare(_init: &(), chunk: &Chunk) -> *const EntityId {
        chunk.entities().as_ptr()
    }

    #[inline]
    unsafe fn fetch<'w>(state: *const EntityId, slot: usize) -> Self::Item<'w> {
        *state.add(slot)
    }
}

unsafe impl ReadOnlyFetch for EntityId {}

macro_rules! impl_query_fetch_tuple {
    ($($Q:ident),*) => {
        #[allow(non_snake_case)]
        unsafe impl<$($Q: QueryFetch),*> QueryFetch for ($($Q,)*) {
            type Item<'w> = ($(<$Q as QueryFetch>::Item<'w>,)*);
            type Init = ($($Q::Init,)*);
            type State = ($($Q::State,)*);

            fn init(registry: &ComponentRegistry, access: &mut Access) -> Result<Self::Init> {
                Ok(($($Q::init(registry, access)?,)*))
            }

            #[inline]
            unsafe fn prepare(init: &Self::Init, chunk: &Chunk) -> Self::State {
                let ($($Q,)*) = init;
                ($($Q::prepare($Q, chunk),)*)
            }

            #[inline]
            unsafe fn fetch<'w>(state: Self::State, slot: usize) -> Self::Item<'w> {
                let ($($Q,)*) = state;
                ($($Q::fetch($Q, slot),)*)
            }
        }

        unsafe impl<$($Q: ReadOnlyFetch),*> ReadOnlyFetch for ($($Q,)*) {}
    };
}

impl_query_fetch_tuple!(A);
impl_query_fetch_tuple!(A, B);
impl_query_fetch_tuple!(A, B, C);
impl_query_fetch_tuple!(A, B, C, D);
impl_query_fetch_tuple!(A, B, C, D, E);
impl_query_fetch_tuple!(A, B, C, D, E, F);
impl_query_fetch_tuple!(A, B, C, D, E, F, G);
impl_query_fetch_tuple!(A, B, C, D, E, F, G, H);
impl_query_fetch_tuple!(A, B, C, D, E, F, G, H, I);
impl_query_fetch_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_query_fetch_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_query_fetch_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

/// Signature test applied to every archetype
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchetypeFilter {
    /// Every one of these must be present
    pub all: Signature,
    /// None of these may be present
    pub none: Signature,
    /// At least one of these must be present, unless empty
    pub any: Signature,
}

impl ArchetypeFilter {
    #[inline]
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.is_superset(&self.all)
            && signature.is_disjoint(&self.none)
            && (self.any.is_empty() || signature.intersects(&self.any))
    }
}

type Resolver = fn(&ComponentRegistry) -> Result<ComponentId>;

/// Extra archetype constraints on top of what the fetch requires
///
/// ```ignore
/// let filter = Filter::new().with::<Player>().without::<Dead>();
/// ```
#[derive(Clone, Default)]
pub struct Filter {
    with: SmallVec<[Resolver; 4]>,
    without: SmallVec<[Resolver; 4]>,
    any: SmallVec<[Resolver; 4]>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T` without fetching it
    pub fn with<T: Component>(mut self) -> Self {
        self.with.push(ComponentRegistry::register::<T>);
        self
    }

    /// Exclude archetypes containing `T`
    pub fn without<T: Component>(mut self) -> Self {
        self.without.push(ComponentRegistry::register::<T>);
        self
    }

    /// Add `T` to the set of which at least one must be present
    pub fn any_of<T: Component>(mut self) -> Self {
        self.any.push(ComponentRegistry::register::<T>);
        self
    }

    /// Resolve type constraints to ids and merge with a fetch's requirements
    pub fn resolve(&self, registry: &ComponentRegistry, access: &Access) -> Result<ArchetypeFilter> {
        let mut filter = ArchetypeFilter {
            all: access.required,
            ..ArchetypeFilter::default()
        };
        for resolve in &self.with {
            filter.all.set(resolve(registry)?);
        }
        for resolve in &self.without {
            filter.none.set(resolve(registry)?);
        }
        for resolve in &self.any {
            filter.any.set(resolve(registry)?);
        }
        Ok(filter)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("with", &self.with.len())
            .field("without", &self.without.len())
            .field("any", &self.any.len())
            .finish()
    }
}

fn resolve_query<Q: QueryFetch>(
    registry: &ComponentRegistry,
    filter: &Filter,
) -> Result<(Q::Init, ArchetypeFilter)> {
    let mut access = Access::default();
    let init = Q::init(registry, &mut access)?;
    let archetype_filter = filter.resolve(registry, &access)?;
    Ok((init, archetype_filter))
}

fn match_archetypes(archetypes: &[Archetype], filter: &ArchetypeFilter, out: &mut MatchedArchetypes) {
    out.extend(
        archetypes
            .iter()
            .filter(|archetype| filter.matches(archetype.signature()))
            .map(Archetype::id),
    );
}

fn matched_len(archetypes: &[Archetype], matched: &[ArchetypeId]) -> usize {
    matched.iter().map(|&id| archetypes[id].len()).sum()
}

/// Rows of one non-empty chunk
///
/// Batches of one query cover disjoint chunks, so they can be handed to
/// different threads.
pub struct ChunkRows<'a, Q: QueryFetch> {
    entities: &'a [EntityId],
    state: Q::State,
    slot: usize,
}

// SAFETY: batches only yield references to Send + Sync components of their
// own chunk, and no two batches share a chunk.
unsafe impl<'a, Q: QueryFetch> Send for ChunkRows<'a, Q> {}

impl<'a, Q: QueryFetch> ChunkRows<'a, Q> {
    /// # Safety
    /// `chunk` must match the query and the caller must hold its access for `'a`.
    unsafe fn new(init: &Q::Init, chunk: &'a Chunk) -> Self {
        Self {
            entities: chunk.entities(),
            state: Q::prepare(init, chunk),
            slot: 0,
        }
    }

    /// Entity handles of the chunk, in slot order
    pub fn entities(&self) -> &'a [EntityId] {
        self.entities
    }
}

impl<'a, Q: QueryFetch> Iterator for ChunkRows<'a, Q> {
    type Item = Q::Item<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.slot >= self.entities.len() {
            return None;
        }
        let slot = self.slot;
        self.slot += 1;
        // SAFETY: slot is live; access was established when the batch was built
        Some(unsafe { Q::fetch(self.state, slot) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entities.len() - self.slot;
        (remaining, Some(remaining))
    }
}

impl<'a, Q: QueryFetch> ExactSizeIterator for ChunkRows<'a, Q> {}

/// # Safety
/// The caller must hold the access `Q` declares over every matched chunk for `'a`.
unsafe fn collect_chunks<'a, Q: QueryFetch>(
    archetypes: &'a [Archetype],
    matched: &[ArchetypeId],
    init: &Q::Init,
) -> Vec<ChunkRows<'a, Q>> {
    matched
        .iter()
        .flat_map(|&id| archetypes[id].chunks())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| ChunkRows::new(init, chunk))
        .collect()
}

/// Visit every row of the matched chunks in order, without collecting batches
///
/// # Safety
/// The caller must hold the access `Q` declares for `'a`.
unsafe fn for_each_row<'a, Q: QueryFetch, F: FnMut(Q::Item<'a>)>(
    archetypes: &'a [Archetype],
    matched: &[ArchetypeId],
    init: &Q::Init,
    mut func: F,
) {
    for &id in matched {
        for chunk in archetypes[id].chunks().iter().filter(|chunk| !chunk.is_empty()) {
            ChunkRows::<'a, Q>::new(init, chunk).for_each(&mut func);
        }
    }
}

/// Iterator over all rows of a query
pub struct QueryIter<'a, Q: QueryFetch> {
    archetypes: &'a [Archetype],
    matched: MatchedArchetypes,
    init: Q::Init,
    archetype_pos: usize,
    chunk_pos: usize,
    current: Option<ChunkRows<'a, Q>>,
    remaining: usize,
}

impl<'a, Q: QueryFetch> QueryIter<'a, Q> {
    /// # Safety
    /// The caller must hold the access `Q` declares for `'a`.
    unsafe fn new(archetypes: &'a [Archetype], matched: MatchedArchetypes, init: Q::Init) -> Self {
        let remaining = matched_len(archetypes, &matched);
        Self {
            archetypes,
            matched,
            init,
            archetype_pos: 0,
            chunk_pos: 0,
            current: None,
            remaining,
        }
    }
}

impl<'a, Q: QueryFetch> Iterator for QueryIter<'a, Q> {
    type Item = Q::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rows) = &mut self.current {
                if let Some(item) = rows.next() {
                    self.remaining -= 1;
                    return Some(item);
                }
                self.current = None;
            }

            let archetypes = self.archetypes;
            let archetype = archetypes.get(*self.matched.get(self.archetype_pos)?)?;
            match archetype.chunks().get(self.chunk_pos) {
                Some(chunk) => {
                    self.chunk_pos += 1;
                    if !chunk.is_empty() {
                        // SAFETY: access was handed to this iterator on creation
                        self.current = Some(unsafe { ChunkRows::new(&self.init, chunk) });
                    }
                }
                None => {
                    self.archetype_pos += 1;
                    self.chunk_pos = 0;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, Q: QueryFetch> ExactSizeIterator for QueryIter<'a, Q> {}

/// Read-only query over a shared world borrow
pub struct Query<'w, Q: ReadOnlyFetch> {
    archetypes: &'w [Archetype],
    init: Q::Init,
    matched: MatchedArchetypes,
}

impl<'w, Q: ReadOnlyFetch> Query<'w, Q> {
    pub(crate) fn new(world: &'w World, filter: Filter) -> Result<Self> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("query.new", query = std::any::type_name::<Q>()).entered();

        let (init, archetype_filter) = resolve_query::<Q>(world.registry(), &filter)?;
        let mut matched = MatchedArchetypes::new();
        match_archetypes(world.archetypes(), &archetype_filter, &mut matched);
        Ok(Self {
            archetypes: world.archetypes(),
            init,
            matched,
        })
    }

    /// Archetypes this query visits
    pub fn matched_archetypes(&self) -> &[ArchetypeId] {
        &self.matched
    }

    /// Count matching entities
    pub fn count(&self) -> usize {
        matched_len(self.archetypes, &self.matched)
    }

    pub fn iter(&self) -> QueryIter<'w, Q> {
        // SAFETY: read-only fetch over a shared world borrow
        unsafe { QueryIter::new(self.archetypes, self.matched.clone(), self.init) }
    }

    pub fn for_each<F>(&self, func: F)
    where
        F: FnMut(Q::Item<'w>),
    {
        // SAFETY: read-only fetch over a shared world borrow
        unsafe { for_each_row::<Q, F>(self.archetypes, &self.matched, &self.init, func) }
    }

    /// One batch per non-empty matching chunk
    pub fn chunks(&self) -> Vec<ChunkRows<'w, Q>> {
        // SAFETY: read-only fetch over a shared world borrow
        unsafe { collect_chunks(self.archetypes, &self.matched, &self.init) }
    }

    pub fn for_each_chunk<F>(&self, func: F)
    where
        F: FnMut(ChunkRows<'w, Q>),
    {
        self.chunks().into_iter().for_each(func);
    }

    /// Parallel iteration, one task per chunk
    #[cfg(feature = "parallel")]
    pub fn par_for_each<F>(&self, func: F)
    where
        F: Fn(Q::Item<'w>) + Send + Sync,
    {
        use rayon::prelude::*;

        self.chunks()
            .into_par_iter()
            .for_each(|rows| rows.for_each(&func));
    }
}

impl<'w, Q: ReadOnlyFetch> IntoIterator for Query<'w, Q> {
    type Item = Q::Item<'w>;
    type IntoIter = QueryIter<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        // SAFETY: read-only fetch over a shared world borrow
        unsafe { QueryIter::new(self.archetypes, self.matched, self.init) }
    }
}

/// Query holding the world exclusively, so it may write components
///
/// Items borrow the query, so no two passes overlap.
pub struct QueryMut<'w, Q: QueryFetch> {
    archetypes: &'w [Archetype],
    init: Q::Init,
    matched: MatchedArchetypes,
    _world: PhantomData<&'w mut World>,
}

impl<'w, Q: QueryFetch> QueryMut<'w, Q> {
    pub(crate) fn new(world: &'w mut World, filter: Filter) -> Result<Self> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("query_mut.new", query = std::any::type_name::<Q>()).entered();

        let world: &'w World = world;
        let (init, archetype_filter) = resolve_query::<Q>(world.registry(), &filter)?;
        let mut matched = MatchedArchetypes::new();
        match_archetypes(world.archetypes(), &archetype_filter, &mut matched);
        Ok(Self {
            archetypes: world.archetypes(),
            init,
            matched,
            _world: PhantomData,
        })
    }

    pub fn matched_archetypes(&self) -> &[ArchetypeId] {
        &self.matched
    }

    /// Count matching entities
    pub fn count(&self) -> usize {
        matched_len(self.archetypes, &self.matched)
    }

    pub fn iter(&mut self) -> QueryIter<'_, Q> {
        // SAFETY: the world is borrowed exclusively and items borrow self
        unsafe { QueryIter::new(self.archetypes, self.matched.clone(), self.init) }
    }

    pub fn for_each<'a, F>(&'a mut self, func: F)
    where
        F: FnMut(Q::Item<'a>),
    {
        // SAFETY: the world is borrowed exclusively and items borrow self
        unsafe { for_each_row::<Q, F>(self.archetypes, &self.matched, &self.init, func) }
    }

    /// One batch per non-empty matching chunk
    ///
    /// Batches cover disjoint chunks and may be processed on any thread.
    pub fn chunks(&mut self) -> Vec<ChunkRows<'_, Q>> {
        // SAFETY: the world is borrowed exclusively and batches borrow self
        unsafe { collect_chunks(self.archetypes, &self.matched, &self.init) }
    }

    pub fn for_each_chunk<'a, F>(&'a mut self, func: F)
    where
        F: FnMut(ChunkRows<'a, Q>),
    {
        self.chunks().into_iter().for_each(func);
    }

    /// Parallel iteration, one task per chunk
    #[cfg(feature = "parallel")]
    pub fn par_for_each<'a, F>(&'a mut self, func: F)
    where
        F: Fn(Q::Item<'a>) + Send + Sync,
    {
        use rayon::prelude::*;

        self.chunks()
            .into_par_iter()
            .for_each(|rows| rows.for_each(&func));
    }
}

/// Cached query state
///
/// Keeps the resolved ids and matched archetypes between runs. Archetypes
/// are never removed, so an update only inspects the ones created since the
/// previous run.
pub struct QueryState<Q: QueryFetch> {
    world_id: u64,
    init: Q::Init,
    filter: ArchetypeFilter,
    matched: MatchedArchetypes,
    archetypes_seen: usize,
}

impl<Q: QueryFetch> QueryState<Q> {
    pub fn new(world: &World) -> Result<Self> {
        Self::with_filter(world, Filter::new())
    }

    pub fn with_filter(world: &World, filter: Filter) -> Result<Self> {
        let (init, filter) = resolve_query::<Q>(world.registry(), &filter)?;
        let mut state = Self {
            world_id: world.id(),
            init,
            filter,
            matched: MatchedArchetypes::new(),
            archetypes_seen: 0,
        };
        state.update(world)?;
        Ok(state)
    }

    /// Pick up archetypes created since the last update
    pub fn update(&mut self, world: &World) -> Result<()> {
        if world.id() != self.world_id {
            return Err(EcsError::WorldMismatch);
        }
        let archetypes = world.archetypes();
        if self.archetypes_seen < archetypes.len() {
            let before = self.matched.len();
            match_archetypes(&archetypes[self.archetypes_seen..], &self.filter, &mut self.matched);
            tracing::trace!(
                query = std::any::type_name::<Q>(),
                scanned = archetypes.len() - self.archetypes_seen,
                newly_matched = self.matched.len() - before,
                "updated query state"
            );
            self.archetypes_seen = archetypes.len();
        }
        Ok(())
    }

    pub fn matched_archetypes(&self) -> &[ArchetypeId] {
        &self.matched
    }

    /// Read-only pass through the cached state
    pub fn query<'w>(&mut self, world: &'w World) -> Result<Query<'w, Q>>
    where
        Q: ReadOnlyFetch,
    {
        self.update(world)?;
        Ok(Query {
            archetypes: world.archetypes(),
            init: self.init,
            matched: self.matched.clone(),
        })
    }

    pub fn query_mut<'w>(&mut self, world: &'w mut World) -> Result<QueryMut<'w, Q>> {
        self.update(world)?;
        let world: &'w World = world;
        Ok(QueryMut {
            archetypes: world.archetypes(),
            init: self.init,
            matched: self.matched.clone(),
            _world: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Frozen;

    #[test]
    fn test_aliasing_access_rejected() {
        let mut world = World::new();
        world.spawn((Position(0.0),)).unwrap();

        let err = world.query_mut::<(&Position, &mut Position)>().err();
        assert!(matches!(err, Some(EcsError::ConflictingAccess(_))));
        let err = world.query_mut::<(&mut Position, Option<&mut Position>)>().err();
        assert!(matches!(err, Some(EcsError::ConflictingAccess(_))));
        // Two shared reads are fine
        assert!(world.query::<(&Position, Option<&Position>)>().is_ok());
    }

    #[test]
    fn test_archetype_filter_matches() {
        let registry = ComponentRegistry::new();
        let p = registry.register::<Position>().unwrap();
        let v = registry.register::<Velocity>().unwrap();
        let f = registry.register::<Frozen>().unwrap();

        let filter = ArchetypeFilter {
            all: Signature::from_ids(&[p]),
            none: Signature::from_ids(&[f]),
            any: Signature::EMPTY,
        };
        assert!(filter.matches(&Signature::from_ids(&[p])));
        assert!(filter.matches(&Signature::from_ids(&[p, v])));
        assert!(!filter.matches(&Signature::from_ids(&[p, f])));
        assert!(!filter.matches(&Signature::from_ids(&[v])));

        let any = ArchetypeFilter {
            any: Signature::from_ids(&[v, f]),
            ..ArchetypeFilter::default()
        };
        assert!(any.matches(&Signature::from_ids(&[f])));
        assert!(!any.matches(&Signature::from_ids(&[p])));
    }

    #[test]
    fn test_mutation_visible_after_pass() {
        let mut world = World::new();
        let e = world.spawn((Position(1.0), Velocity(2.0))).unwrap();
        world.spawn((Position(5.0),)).unwrap();

        let mut query = world.query_mut::<(&mut Position, &Velocity)>().unwrap();
        assert_eq!(query.count(), 1);
        query.for_each(|(pos, vel)| pos.0 += vel.0);

        assert_eq!(world.get::<Position>(e).unwrap(), &Position(3.0));
    }

    #[test]
    fn test_for_each_skips_empty_chunks() {
        use crate::config::WorldConfig;

        let config = WorldConfig::default().with_chunk_bytes(64).with_compaction(false);
        let mut world = World::with_config(config).unwrap();
        let entities = world
            .spawn_batch((0..15).map(|i| (Position(i as f32),)))
            .unwrap();
        let per_chunk = world.archetype(1).unwrap().chunk_capacity();
        for &e in &entities[..per_chunk] {
            world.despawn(e).unwrap();
        }
        assert!(world.archetype(1).unwrap().chunks()[0].is_empty());

        world.query_mut::<&mut Position>().unwrap().for_each(|p| p.0 += 100.0);

        let mut seen = Vec::new();
        world.query::<&Position>().unwrap().for_each(|p| seen.push(p.0 as usize));
        seen.sort_unstable();
        assert_eq!(seen, (per_chunk + 100..115).collect::<Vec<_>>());
    }

    #[test]
    fn test_optional_fetch() {
        let mut world = World::new();
        world.spawn((Position(1.0), Velocity(1.0))).unwrap();
        world.spawn((Position(2.0),)).unwrap();

        let query = world.query::<(&Position, Option<&Velocity>)>().unwrap();
        let mut rows: Vec<_> = query.iter().map(|(p, v)| (p.0, v.copied())).collect();
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(rows, vec![(1.0, Some(Velocity(1.0))), (2.0, None)]);
    }

    #[test]
    fn test_iter_is_exact_size() {
        let mut world = World::new();
        for i in 0..10 {
            world.spawn((Position(i as f32),)).unwrap();
        }
        let query = world.query::<&Position>().unwrap();
        let mut iter = query.iter();
        assert_eq!(iter.len(), 10);
        iter.next();
        assert_eq!(iter.len(), 9);
    }

    #[test]
    fn test_query_state_picks_up_new_archetypes() {
        let mut world = World::new();
        world.spawn((Position(0.0),)).unwrap();
        let mut state = QueryState::<&Position>::new(&world).unwrap();
        assert_eq!(state.matched_archetypes().len(), 1);

        world.spawn((Position(1.0), Velocity(0.0))).unwrap();
        world.spawn((Velocity(0.0),)).unwrap();
        assert_eq!(state.query(&world).unwrap().count(), 2);
        assert_eq!(state.matched_archetypes().len(), 2);
    }

    #[test]
    fn test_query_state_rejects_other_world() {
        let world = World::new();
        let other = World::new();
        let mut state = QueryState::<EntityId>::new(&world).unwrap();
        assert_eq!(state.update(&other), Err(EcsError::WorldMismatch));
    }
}

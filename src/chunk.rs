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

//! Fixed-capacity struct-of-arrays blocks
//!
//! A [`Chunk`] stores up to `capacity` entities of a single archetype: one
//! type-erased array per component plus the entity handle array. Live
//! entities are packed into `[0, len)`; removal swaps the last live entity
//! into the hole so the arrays never contain gaps.
//!
//! Every chunk of an archetype shares one [`ChunkLayout`], which holds the
//! component-id to column lookup table and the capacity derived from the
//! configured byte budget.

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::ptr::NonNull;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::bitset::Signature;
use crate::component::Component;
use crate::config::MAX_CHUNK_BYTES;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::query::{Access, QueryFetch, ReadOnlyFetch};
use crate::registry::{ComponentId, ComponentInfo, ComponentRegistry};

const NO_COLUMN: u16 = u16::MAX;

/// Column layout shared by all chunks of one archetype
#[derive(Debug)]
pub struct ChunkLayout {
    components: SmallVec<[ComponentInfo; 8]>,
    column_of: Box<[u16]>,
    entity_width: usize,
    capacity: usize,
}

impl ChunkLayout {
    /// Build a layout for `components` (ascending id order) within a byte budget
    ///
    /// Budgets above [`MAX_CHUNK_BYTES`] are clamped to it.
    pub fn new(components: SmallVec<[ComponentInfo; 8]>, chunk_bytes: usize) -> Self {
        let table_len = components
            .iter()
            .map(|info| info.id.index() + 1)
            .max()
            .unwrap_or(0);
        let mut column_of = vec![NO_COLUMN; table_len].into_boxed_slice();
        for (column, info) in components.iter().enumerate() {
            column_of[info.id.index()] = column as u16;
        }

        let entity_width = std::mem::size_of::<EntityId>()
            + components.iter().map(ComponentInfo::size).sum::<usize>();
        let capacity = (chunk_bytes.min(MAX_CHUNK_BYTES) / entity_width).max(1);

        Self {
            components,
            column_of,
            entity_width,
            capacity,
        }
    }

    /// Local column for a component id
    #[inline]
    pub fn column_of(&self, id: ComponentId) -> Option<usize> {
        match self.column_of.get(id.index()) {
            Some(&column) if column != NO_COLUMN => Some(column as usize),
            _ => None,
        }
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    /// Bytes one entity occupies across all arrays
    pub fn entity_width(&self) -> usize {
        self.entity_width
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn column_layout(&self, column: usize) -> Layout {
        let info = &self.components[column];
        match Layout::from_size_align(info.size() * self.capacity, info.layout.align()) {
            Ok(layout) => layout,
            Err(_) => panic!("chunk column for {} overflows isize", info.name),
        }
    }
}

/// Outcome of a swap-remove
///
/// `swapped` names the entity that was moved into the vacated slot, if any,
/// together with that slot. Callers must write it back to the entity's
/// location or the location table goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRemove {
    pub removed: EntityId,
    pub swapped: Option<(EntityId, usize)>,
}

/// Struct-of-arrays block of entities sharing one archetype
pub struct Chunk {
    layout: Arc<ChunkLayout>,
    entities: Vec<EntityId>,
    columns: SmallVec<[NonNull<u8>; 8]>,
}

// SAFETY: columns only ever hold `Component` values, which are Send + Sync,
// and the chunk exclusively owns its allocations.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    /// Allocate an empty chunk with every column sized to the layout capacity
    pub fn new(layout: Arc<ChunkLayout>) -> Self {
        let mut columns = SmallVec::with_capacity(layout.components.len());
        for column in 0..layout.components.len() {
            let col_layout = layout.column_layout(column);
            let ptr = if col_layout.size() == 0 {
                // Zero-sized storage: any aligned, non-null address works
                unsafe { NonNull::new_unchecked(col_layout.align() as *mut u8) }
            } else {
                // SAFETY: layout has non-zero size
                let raw = unsafe { alloc::alloc(col_layout) };
                match NonNull::new(raw) {
                    Some(ptr) => ptr,
                    None => alloc::handle_alloc_error(col_layout),
                }
            };
            columns.push(ptr);
        }

        Self {
            entities: Vec::with_capacity(layout.capacity),
            layout,
            columns,
        }
    }

    pub fn layout(&self) -> &Arc<ChunkLayout> {
        &self.layout
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    /// Number of live entities
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() == self.layout.capacity
    }

    /// Entity handles of live slots
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn entity(&self, slot: usize) -> Option<EntityId> {
        self.entities.get(slot).copied()
    }

    /// True iff every id has a column here
    pub fn has(&self, ids: &[ComponentId]) -> bool {
        ids.iter().all(|&id| self.layout.column_of(id).is_some())
    }

    #[inline]
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.layout.column_of(id)
    }

    /// Pointer to element 0 of a column
    ///
    /// # Safety
    /// `column` must be below the layout's column count.
    #[inline]
    pub unsafe fn column_base_unchecked(&self, column: usize) -> *mut u8 {
        self.columns.get_unchecked(column).as_ptr()
    }

    /// Pointer to element 0 of `T`'s array, typed
    ///
    /// # Safety
    /// The chunk must store `id`, and `id` must be the registered id of `T`.
    /// The archetype match done by the query engine guarantees both.
    #[inline]
    pub unsafe fn first_ptr<T: Component>(&self, id: ComponentId) -> *mut T {
        let column = *self.layout.column_of.get_unchecked(id.index()) as usize;
        self.column_base_unchecked(column) as *mut T
    }

    /// Pointer to one slot of one column
    ///
    /// # Safety
    /// `column` must be valid and `slot` below capacity.
    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, column: usize, slot: usize) -> *mut u8 {
        let size = self.layout.components.get_unchecked(column).size();
        self.column_base_unchecked(column).add(slot * size)
    }

    fn typed_column<T: Component>(&self, id: ComponentId) -> Option<usize> {
        let column = self.layout.column_of(id)?;
        (self.layout.components[column].type_id == TypeId::of::<T>()).then_some(column)
    }

    /// Checked read of one component
    pub fn get<T: Component>(&self, id: ComponentId, slot: usize) -> Option<&T> {
        if slot >= self.len() {
            return None;
        }
        let column = self.typed_column::<T>(id)?;
        // SAFETY: type, column and slot were checked above
        Some(unsafe { &*(self.slot_ptr(column, slot) as *const T) })
    }

    /// Checked write access to one component
    pub fn get_mut<T: Component>(&mut self, id: ComponentId, slot: usize) -> Option<&mut T> {
        if slot >= self.len() {
            return None;
        }
        let column = self.typed_column::<T>(id)?;
        // SAFETY: type, column and slot were checked above; &mut self is exclusive
        Some(unsafe { &mut *(self.slot_ptr(column, slot) as *mut T) })
    }

    /// Live elements of `T`'s array
    pub fn slice<T: Component>(&self, id: ComponentId) -> Option<&[T]> {
        let column = self.typed_column::<T>(id)?;
        // SAFETY: slots [0, len) are initialized values of T
        Some(unsafe {
            std::slice::from_raw_parts(self.column_base_unchecked(column) as *const T, self.len())
        })
    }

    pub fn slice_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut [T]> {
        let column = self.typed_column::<T>(id)?;
        // SAFETY: as above, with exclusive access through &mut self
        Some(unsafe {
            std::slice::from_raw_parts_mut(self.column_base_unchecked(column) as *mut T, self.len())
        })
    }

    /// Entity handle and fetched components at `slot`
    ///
    /// `None` if `slot` is not live; `MissingComponent` if the chunk lacks a
    /// required component of `Q`.
    pub fn row<Q: ReadOnlyFetch>(
        &self,
        registry: &ComponentRegistry,
        slot: usize,
    ) -> Result<Option<(EntityId, Q::Item<'_>)>> {
        let mut access = Access::default();
        let init = Q::init(registry, &mut access)?;
        if let Some(missing) = access.required.ones().find(|&id| self.layout.column_of(id).is_none()) {
            return Err(EcsError::MissingComponent(registry.name(missing)));
        }
        // `registry` may not be the one this chunk was built from
        for id in access.reads.union(&access.writes).ones() {
            let Some(column) = self.layout.column_of(id) else {
                continue;
            };
            let expected = registry.info(id).map(|info| info.type_id);
            if expected != Some(self.layout.components[column].type_id) {
                return Err(EcsError::MissingComponent(registry.name(id)));
            }
        }
        let Some(entity) = self.entity(slot) else {
            return Ok(None);
        };
        // SAFETY: required columns exist with the fetched types, slot is live,
        // fetch is read-only
        let item = unsafe { Q::fetch(Q::prepare(&init, self), slot) };
        Ok(Some((entity, item)))
    }

    /// Claim slot `len` for `entity` and return it.
    ///
    /// Component values of the new slot are uninitialized; the caller must
    /// write every column before the chunk is read or dropped.
    pub(crate) fn push(&mut self, entity: EntityId) -> usize {
        assert!(!self.is_full(), "push into a full chunk");
        let slot = self.entities.len();
        self.entities.push(entity);
        slot
    }

    /// Remove `slot`, dropping its component values, and swap the last live
    /// entity into it.
    pub fn remove_at(&mut self, slot: usize) -> SwapRemove {
        self.swap_remove(slot, true)
    }

    /// Like [`Chunk::remove_at`] but leaves the slot's values undropped,
    /// for when they were already moved to another chunk.
    pub(crate) fn remove_moved(&mut self, slot: usize) -> SwapRemove {
        self.swap_remove(slot, false)
    }

    fn swap_remove(&mut self, slot: usize, drop_values: bool) -> SwapRemove {
        let len = self.len();
        assert!(slot < len, "slot {slot} out of bounds (len {len})");
        let last = len - 1;

        for (column, info) in self.layout.components.iter().enumerate() {
            let size = info.size();
            // SAFETY: slot and last are live slots of an allocated column
            unsafe {
                let base = self.column_base_unchecked(column);
                let hole = base.add(slot * size);
                if drop_values {
                    if let Some(drop_fn) = info.drop_fn {
                        drop_fn(hole);
                    }
                }
                if slot != last && size > 0 {
                    std::ptr::copy_nonoverlapping(base.add(last * size), hole, size);
                }
            }
        }

        let removed = self.entities.swap_remove(slot);
        let swapped = self.entities.get(slot).map(|&entity| (entity, slot));
        SwapRemove { removed, swapped }
    }

    /// Bitwise-move every component `src` and `dst` share from `src_slot`
    /// into `dst_slot`. Returns the ids that were moved.
    ///
    /// # Safety
    /// `src_slot` must be live in `src`, `dst_slot` live and unwritten in
    /// `dst`. The moved source values must not be dropped afterwards.
    pub(crate) unsafe fn move_shared(
        src: &Chunk,
        src_slot: usize,
        dst: &mut Chunk,
        dst_slot: usize,
    ) -> Signature {
        let mut moved = Signature::EMPTY;
        for (dst_column, info) in dst.layout.components.iter().enumerate() {
            if let Some(src_column) = src.layout.column_of(info.id) {
                let size = info.size();
                if size > 0 {
                    std::ptr::copy_nonoverlapping(
                        src.slot_ptr(src_column, src_slot),
                        dst.slot_ptr(dst_column, dst_slot),
                        size,
                    );
                }
                moved.set(info.id);
            }
        }
        moved
    }

    /// Total bytes reserved by this chunk's arrays
    pub fn reserved_bytes(&self) -> usize {
        self.layout.capacity * self.layout.entity_width
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let len = self.len();
        for column in 0..self.columns.len() {
            let info = self.layout.components[column];
            unsafe {
                if let Some(drop_fn) = info.drop_fn {
                    for slot in 0..len {
                        drop_fn(self.slot_ptr(column, slot));
                    }
                }
                let col_layout = self.layout.column_layout(column);
                if col_layout.size() > 0 {
                    alloc::dealloc(self.columns[column].as_ptr(), col_layout);
                }
            }
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("columns", &self.columns.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;
    use crate::registry::ComponentRegistry;
    use slotmap::SlotMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(u32);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn layout_for(registry: &ComponentRegistry, ids: &[ComponentId], bytes: usize) -> Arc<ChunkLayout> {
        let infos = ids.iter().map(|&id| registry.info(id).unwrap()).collect();
        Arc::new(ChunkLayout::new(infos, bytes))
    }

    fn write<T: Component>(chunk: &mut Chunk, id: ComponentId, slot: usize, value: T) {
        let column = chunk.column_index(id).unwrap();
        unsafe { std::ptr::write(chunk.slot_ptr(column, slot) as *mut T, value) };
    }

    #[test]
    fn test_capacity_from_byte_budget() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>().unwrap();
        let layout = layout_for(&registry, &[pos], 1024);
        let width = std::mem::size_of::<EntityId>() + std::mem::size_of::<Position>();
        assert_eq!(layout.entity_width(), width);
        assert_eq!(layout.capacity(), 1024 / width);

        // A budget smaller than one entity still yields one slot
        let tiny = layout_for(&registry, &[pos], 1);
        assert_eq!(tiny.capacity(), 1);

        let huge = layout_for(&registry, &[pos], usize::MAX);
        assert_eq!(huge.capacity(), MAX_CHUNK_BYTES / width);
    }

    #[test]
    fn test_has_and_column_lookup() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>().unwrap();
        let hp = registry.register::<Health>().unwrap();
        let other = registry.register::<u64>().unwrap();

        let chunk = Chunk::new(layout_for(&registry, &[pos, hp], 4096));
        assert!(chunk.has(&[pos, hp]));
        assert!(!chunk.has(&[pos, other]));
        assert_eq!(chunk.column_index(hp), Some(1));
        assert_eq!(chunk.column_index(other), None);
    }

    #[test]
    fn test_swap_remove_moves_last_into_hole() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>().unwrap();
        let hp = registry.register::<Health>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let (e1, e2, e3) = (keys.insert(()), keys.insert(()), keys.insert(()));

        let mut chunk = Chunk::new(layout_for(&registry, &[pos, hp], 4096));
        for (i, entity) in [e1, e2, e3].into_iter().enumerate() {
            let slot = chunk.push(entity);
            assert_eq!(slot, i);
            write(&mut chunk, pos, slot, Position { x: i as f32, y: 0.0 });
            write(&mut chunk, hp, slot, Health(i as u32 * 10));
        }

        let result = chunk.remove_at(1);
        assert_eq!(result.removed, e2);
        assert_eq!(result.swapped, Some((e3, 1)));
        assert_eq!(chunk.entities(), &[e1, e3]);
        assert_eq!(chunk.get::<Position>(pos, 0), Some(&Position { x: 0.0, y: 0.0 }));
        assert_eq!(chunk.get::<Position>(pos, 1), Some(&Position { x: 2.0, y: 0.0 }));
        assert_eq!(chunk.get::<Health>(hp, 1), Some(&Health(20)));

        // Removing the last live slot is a plain decrement
        let result = chunk.remove_at(1);
        assert_eq!(result.swapped, None);
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.get::<Health>(hp, 1), None);
    }

    #[test]
    fn test_typed_access_checks_type() {
        let registry = ComponentRegistry::new();
        let hp = registry.register::<Health>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut chunk = Chunk::new(layout_for(&registry, &[hp], 4096));
        let slot = chunk.push(keys.insert(()));
        write(&mut chunk, hp, slot, Health(7));

        assert!(chunk.get::<u32>(hp, slot).is_none());
        chunk.get_mut::<Health>(hp, slot).unwrap().0 = 8;
        assert_eq!(chunk.slice::<Health>(hp).unwrap(), &[Health(8)]);
    }

    #[test]
    fn test_row_reads_one_slot() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>().unwrap();
        let hp = registry.register::<Health>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut chunk = Chunk::new(layout_for(&registry, &[pos, hp], 4096));
        let e = keys.insert(());
        let slot = chunk.push(e);
        write(&mut chunk, pos, slot, Position { x: 1.0, y: 2.0 });
        write(&mut chunk, hp, slot, Health(3));

        let row = chunk.row::<(&Position, &Health)>(&registry, slot).unwrap();
        assert_eq!(row, Some((e, (&Position { x: 1.0, y: 2.0 }, &Health(3)))));
        assert_eq!(chunk.row::<&Health>(&registry, 1).unwrap(), None);
        assert!(matches!(
            chunk.row::<&u64>(&registry, slot),
            Err(EcsError::MissingComponent(_))
        ));
    }

    #[test]
    fn test_row_rejects_ids_from_another_registry() {
        let registry = ComponentRegistry::new();
        let hp = registry.register::<Health>().unwrap();
        registry.register::<Position>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut chunk = Chunk::new(layout_for(&registry, &[hp], 4096));
        let slot = chunk.push(keys.insert(()));
        write(&mut chunk, hp, slot, Health(0xDEAD));

        // Position gets the id that Health has in the chunk's registry
        let other = ComponentRegistry::new();
        assert_eq!(other.register::<Position>().unwrap(), hp);
        assert!(matches!(
            chunk.row::<&Position>(&other, slot),
            Err(EcsError::MissingComponent(_))
        ));
        assert!(matches!(
            chunk.row::<Option<&Position>>(&other, slot),
            Err(EcsError::MissingComponent(_))
        ));
        assert_eq!(chunk.row::<&Health>(&registry, slot).unwrap().map(|(_, h)| h.0), Some(0xDEAD));
    }

    #[test]
    fn test_drops_removed_and_remaining_values() {
        let registry = ComponentRegistry::new();
        let tracked = registry.register::<Tracked>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let before = DROPS.load(Ordering::SeqCst);

        {
            let mut chunk = Chunk::new(layout_for(&registry, &[tracked], 4096));
            for i in 0..3 {
                let slot = chunk.push(keys.insert(()));
                write(&mut chunk, tracked, slot, Tracked(i));
            }
            chunk.remove_at(0);
            assert_eq!(DROPS.load(Ordering::SeqCst) - before, 1);
            assert_eq!(chunk.get::<Tracked>(tracked, 0).unwrap().0, 2);
        }

        assert_eq!(DROPS.load(Ordering::SeqCst) - before, 3);
    }

    #[test]
    fn test_zero_sized_components() {
        struct Marker;
        let registry = ComponentRegistry::new();
        let marker = registry.register::<Marker>().unwrap();
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut chunk = Chunk::new(layout_for(&registry, &[marker], 256));

        let a = chunk.push(keys.insert(()));
        let b = chunk.push(keys.insert(()));
        write(&mut chunk, marker, a, Marker);
        write(&mut chunk, marker, b, Marker);
        assert!(chunk.get::<Marker>(marker, 1).is_some());
        chunk.remove_at(0);
        assert_eq!(chunk.len(), 1);
    }
}

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

//! Archetype storage with chunk placement and removal

use std::sync::Arc;

use smallvec::SmallVec;

use crate::bitset::Signature;
use crate::chunk::{Chunk, ChunkLayout};
use crate::entity::{ArchetypeId, EntityId};
use crate::registry::{ComponentId, ComponentInfo};

/// Result of removing an entity from an archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchetypeRemoval {
    pub removed: EntityId,
    /// Entity moved into the vacated slot, with that slot
    pub swapped: Option<(EntityId, usize)>,
    /// Chunk index whose entities all changed chunk after compaction
    pub relocated_chunk: Option<usize>,
}

/// All entities sharing one exact signature, packed into chunks
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    layout: Arc<ChunkLayout>,
    chunks: Vec<Chunk>,
    len: usize,
    compact_empty_chunks: bool,
}

impl Archetype {
    /// Create new archetype
    ///
    /// `components` must list the infos of every id in `signature`.
    pub fn new(
        id: ArchetypeId,
        signature: Signature,
        mut components: SmallVec<[ComponentInfo; 8]>,
        chunk_bytes: usize,
        compact_empty_chunks: bool,
    ) -> Self {
        components.sort_by_key(|info| info.id);
        debug_assert_eq!(components.len(), signature.len());
        Self {
            id,
            signature,
            layout: Arc::new(ChunkLayout::new(components, chunk_bytes)),
            chunks: Vec::new(),
            len: 0,
            compact_empty_chunks,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn has_component(&self, id: ComponentId) -> bool {
        self.signature.contains(id)
    }

    pub fn components(&self) -> &[ComponentInfo] {
        self.layout.components()
    }

    pub fn layout(&self) -> &Arc<ChunkLayout> {
        &self.layout
    }

    /// Slots per chunk
    pub fn chunk_capacity(&self) -> usize {
        self.layout.capacity()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub(crate) fn chunk_mut(&mut self, index: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(index)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Place `entity` in the last chunk, or a fresh one if that is full.
    ///
    /// Returns `(chunk_index, slot)`; component values of the slot are left
    /// for the caller to write.
    pub(crate) fn allocate(&mut self, entity: EntityId) -> (usize, usize) {
        let needs_chunk = self.chunks.last().map_or(true, Chunk::is_full);
        if needs_chunk {
            self.chunks.push(Chunk::new(Arc::clone(&self.layout)));
            tracing::debug!(
                archetype = self.id,
                chunks = self.chunks.len(),
                capacity = self.layout.capacity(),
                "allocated chunk"
            );
        }

        let chunk_index = self.chunks.len() - 1;
        let slot = self.chunks[chunk_index].push(entity);
        self.len += 1;
        (chunk_index, slot)
    }

    /// Remove the entity at `(chunk_index, slot)`, dropping its components
    pub(crate) fn remove_at(&mut self, chunk_index: usize, slot: usize) -> ArchetypeRemoval {
        self.remove_inner(chunk_index, slot, true)
    }

    /// Remove an entity whose component values were already moved out
    pub(crate) fn remove_moved(&mut self, chunk_index: usize, slot: usize) -> ArchetypeRemoval {
        self.remove_inner(chunk_index, slot, false)
    }

    fn remove_inner(&mut self, chunk_index: usize, slot: usize, drop_values: bool) -> ArchetypeRemoval {
        let chunk = &mut self.chunks[chunk_index];
        let result = if drop_values {
            chunk.remove_at(slot)
        } else {
            chunk.remove_moved(slot)
        };
        self.len -= 1;

        let relocated_chunk = if self.compact_empty_chunks && self.chunks[chunk_index].is_empty() {
            self.compact(chunk_index)
        } else {
            None
        };

        ArchetypeRemoval {
            removed: result.removed,
            swapped: result.swapped,
            relocated_chunk,
        }
    }

    /// Move the emptied chunk to the tail so only the last chunk may be empty.
    ///
    /// Returns the index that received a different, non-empty chunk.
    fn compact(&mut self, emptied: usize) -> Option<usize> {
        let mut last = self.chunks.len() - 1;
        if emptied == last {
            return None;
        }
        // Keep at most one spare chunk around
        if self.chunks[last].is_empty() {
            self.chunks.pop();
            last -= 1;
            if emptied == last {
                return None;
            }
        }
        self.chunks.swap(emptied, last);
        Some(emptied)
    }

    /// Number of chunks holding at least one entity
    pub fn occupied_chunks(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.is_empty()).count()
    }

    /// Bytes reserved across all chunks
    pub fn reserved_bytes(&self) -> usize {
        self.chunks.iter().map(Chunk::reserved_bytes).sum()
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;
    use slotmap::SlotMap;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Value(u64);

    fn archetype(chunk_bytes: usize, compact: bool) -> (Archetype, ComponentId) {
        let registry = ComponentRegistry::new();
        let id = registry.register::<Value>().unwrap();
        let infos = SmallVec::from_slice(&[registry.info(id).unwrap()]);
        (
            Archetype::new(0, Signature::from_ids(&[id]), infos, chunk_bytes, compact),
            id,
        )
    }

    fn fill(arch: &mut Archetype, id: ComponentId, keys: &mut SlotMap<EntityId, ()>, n: usize) -> Vec<(EntityId, usize, usize)> {
        (0..n)
            .map(|i| {
                let entity = keys.insert(());
                let (chunk, slot) = arch.allocate(entity);
                let c = arch.chunk_mut(chunk).unwrap();
                let column = c.column_index(id).unwrap();
                unsafe { std::ptr::write(c.slot_ptr(column, slot) as *mut Value, Value(i as u64)) };
                (entity, chunk, slot)
            })
            .collect()
    }

    #[test]
    fn test_archetype_creation() {
        let (arch, id) = archetype(1024, true);
        assert!(arch.has_component(id));
        assert_eq!(arch.len(), 0);
        assert!(arch.chunks().is_empty());
        // 8-byte entity handle + 8-byte value
        assert_eq!(arch.chunk_capacity(), 64);
    }

    #[test]
    fn test_capacity_boundary_allocates_next_chunk() {
        let (mut arch, id) = archetype(64, true);
        let capacity = arch.chunk_capacity();
        assert_eq!(capacity, 4);
        let mut keys = SlotMap::with_key();

        let placed = fill(&mut arch, id, &mut keys, capacity - 1);
        assert!(placed.iter().all(|&(_, chunk, _)| chunk == 0));
        assert_eq!(arch.chunks().len(), 1);

        // Exactly one more fits in chunk 0
        let placed = fill(&mut arch, id, &mut keys, 1);
        assert_eq!((placed[0].1, placed[0].2), (0, capacity - 1));
        assert!(arch.chunks()[0].is_full());

        let placed = fill(&mut arch, id, &mut keys, 1);
        assert_eq!((placed[0].1, placed[0].2), (1, 0));
        assert_eq!(arch.len(), capacity + 1);
    }

    #[test]
    fn test_compaction_relocates_tail_chunk() {
        let (mut arch, id) = archetype(64, true);
        let mut keys = SlotMap::with_key();
        let placed = fill(&mut arch, id, &mut keys, 6); // chunks: [4, 2]

        for &(_, chunk, _) in placed.iter().take(4) {
            assert_eq!(chunk, 0);
        }
        let mut relocated = None;
        for _ in 0..4 {
            relocated = arch.remove_at(0, 0).relocated_chunk;
        }
        // Chunk 0 emptied; the two-entity tail chunk moved into index 0
        assert_eq!(relocated, Some(0));
        assert_eq!(arch.chunks()[0].len(), 2);
        assert_eq!(arch.chunks()[0].entities(), &[placed[4].0, placed[5].0]);
        assert!(arch.chunks()[1].is_empty());
        assert_eq!(arch.len(), 2);
    }

    #[test]
    fn test_no_compaction_when_disabled() {
        let (mut arch, id) = archetype(64, false);
        let mut keys = SlotMap::with_key();
        fill(&mut arch, id, &mut keys, 6);
        for _ in 0..4 {
            assert_eq!(arch.remove_at(0, 0).relocated_chunk, None);
        }
        assert!(arch.chunks()[0].is_empty());
        assert_eq!(arch.occupied_chunks(), 1);
    }

    #[test]
    fn test_removing_last_entity_keeps_one_spare_chunk() {
        let (mut arch, id) = archetype(64, true);
        let mut keys = SlotMap::with_key();
        fill(&mut arch, id, &mut keys, 5); // chunks: [4, 1]
        let removal = arch.remove_at(1, 0);
        assert_eq!(removal.swapped, None);
        assert_eq!(removal.relocated_chunk, None);

        // Emptying chunk 0 drops the spare tail instead of shuffling
        for _ in 0..4 {
            arch.remove_at(0, 0);
        }
        assert_eq!(arch.chunks().len(), 1);
        assert!(arch.is_empty());
    }
}

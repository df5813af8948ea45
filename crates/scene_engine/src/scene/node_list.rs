//! Chunked slot allocator for scene nodes
//!
//! Nodes are stored in 64-slot chunks with a `u64` occupancy bitfield.
//! Allocation takes the first clear bit of the first chunk with room;
//! freeing clears the bit and never compacts, so an index stays valid
//! until its node is freed. Chunks are appended and never released, and
//! each chunk is the unit of work handed to a step worker.

use std::fmt;

use super::error::SceneError;
use super::node::SceneNode;

/// Slots per chunk
pub const CHUNK_SLOTS: usize = 64;

const SLOT_BITS: u32 = CHUNK_SLOTS.trailing_zeros();
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;
const MAX_CHUNKS: usize = (u32::MAX >> SLOT_BITS) as usize + 1;

/// Stable node handle encoding `(chunk, slot)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    fn new(chunk: usize, slot: usize) -> Self {
        debug_assert!(slot < CHUNK_SLOTS);
        Self(((chunk as u32) << SLOT_BITS) | slot as u32)
    }

    /// Rebuild an index from its raw encoding
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw encoding
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Chunk part
    pub fn chunk(self) -> usize {
        (self.0 >> SLOT_BITS) as usize
    }

    /// Slot part
    pub fn slot(self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk(), self.slot())
    }
}

/// Fixed block of 64 node slots
pub struct NodeChunk {
    index: usize,
    occupied: u64,
    slots: [Option<SceneNode>; CHUNK_SLOTS],
}

impl NodeChunk {
    fn new(index: usize) -> Self {
        Self {
            index,
            occupied: 0,
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Position of this chunk in the list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Occupancy bitfield; bit `i` set means slot `i` is live
    pub fn occupancy(&self) -> u64 {
        self.occupied
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.occupied.count_ones() as usize
    }

    /// No live nodes
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Every slot taken
    pub fn is_full(&self) -> bool {
        self.occupied == u64::MAX
    }

    fn first_free(&self) -> Option<usize> {
        let slot = self.occupied.trailing_ones() as usize;
        (slot < CHUNK_SLOTS).then_some(slot)
    }

    fn is_occupied(&self, slot: usize) -> bool {
        slot < CHUNK_SLOTS && self.occupied & (1 << slot) != 0
    }

    /// Iterate live nodes with their indices
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &SceneNode)> + '_ {
        let chunk = self.index;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(slot, node)| Some((NodeIndex::new(chunk, slot), node.as_ref()?)))
    }

    /// Mutably iterate live nodes with their indices
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeIndex, &mut SceneNode)> + '_ {
        let chunk = self.index;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(slot, node)| Some((NodeIndex::new(chunk, slot), node.as_mut()?)))
    }
}

/// Growable list of node chunks
pub struct SceneNodeList {
    chunks: Vec<Box<NodeChunk>>,
    live: usize,
    // No chunk before this one has a free slot
    search_start: usize,
}

impl SceneNodeList {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            live: 0,
            search_start: 0,
        }
    }

    /// Create a list with `chunks` chunks allocated up front
    pub fn with_chunks(chunks: usize) -> Self {
        let mut list = Self::new();
        for _ in 0..chunks {
            if list.grow().is_err() {
                log::warn!("Could not preallocate {} node chunks", chunks);
                break;
            }
        }
        list
    }

    /// Allocate a slot and construct a node in it
    pub fn allocate(&mut self, node_id: u64, name: &str) -> Result<NodeIndex, SceneError> {
        let chunk_index = match (self.search_start..self.chunks.len())
            .find(|&c| !self.chunks[c].is_full())
        {
            Some(chunk_index) => chunk_index,
            None => self.grow()?,
        };
        self.search_start = chunk_index;

        let chunk = &mut self.chunks[chunk_index];
        let slot = chunk.first_free().ok_or(SceneError::AllocationFailed)?;
        chunk.slots[slot] = Some(SceneNode::new(node_id, name));
        chunk.occupied |= 1 << slot;
        self.live += 1;

        Ok(NodeIndex::new(chunk_index, slot))
    }

    /// Release a slot; returns the node that lived there
    ///
    /// Freeing an already free index is a no-op.
    pub fn free(&mut self, index: NodeIndex) -> Option<SceneNode> {
        let chunk = self.chunks.get_mut(index.chunk())?;
        if !chunk.is_occupied(index.slot()) {
            return None;
        }

        chunk.occupied &= !(1 << index.slot());
        self.live -= 1;
        self.search_start = self.search_start.min(index.chunk());
        chunk.slots[index.slot()].take()
    }

    /// Look up a live node
    pub fn get(&self, index: NodeIndex) -> Option<&SceneNode> {
        let chunk = self.chunks.get(index.chunk())?;
        if !chunk.is_occupied(index.slot()) {
            return None;
        }
        chunk.slots[index.slot()].as_ref()
    }

    /// Look up a live node mutably
    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut SceneNode> {
        let chunk = self.chunks.get_mut(index.chunk())?;
        if !chunk.is_occupied(index.slot()) {
            return None;
        }
        chunk.slots[index.slot()].as_mut()
    }

    /// Iterate live nodes in chunk/slot order
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &SceneNode)> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }

    /// Mutable access to every chunk, for distributing step work
    pub fn chunks_mut(&mut self) -> impl Iterator<Item = &mut NodeChunk> + '_ {
        self.chunks.iter_mut().map(|chunk| &mut **chunk)
    }

    /// Live node count
    pub fn len(&self) -> usize {
        self.live
    }

    /// No live nodes
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocated chunk count
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total slot capacity
    pub fn capacity(&self) -> usize {
        self.chunks.len() * CHUNK_SLOTS
    }

    fn grow(&mut self) -> Result<usize, SceneError> {
        let index = self.chunks.len();
        if index >= MAX_CHUNKS {
            log::error!("Node index space exhausted at {} chunks", index);
            return Err(SceneError::AllocationFailed);
        }
        self.chunks
            .try_reserve(1)
            .map_err(|_| SceneError::AllocationFailed)?;
        self.chunks.push(Box::new(NodeChunk::new(index)));
        log::trace!("Node list grew to {} chunks", self.chunks.len());
        Ok(index)
    }
}

impl Default for SceneNodeList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_index_encoding() {
        let index = NodeIndex::new(3, 17);
        assert_eq!(index.chunk(), 3);
        assert_eq!(index.slot(), 17);
        assert_eq!(NodeIndex::from_raw(index.raw()), index);
    }

    #[test]
    fn test_allocation_fills_first_chunk_then_grows() {
        let mut list = SceneNodeList::new();
        for id in 0..CHUNK_SLOTS as u64 {
            let index = list.allocate(id, "n").unwrap();
            assert_eq!(index.chunk(), 0);
            assert_eq!(index.slot(), id as usize);
        }
        assert_eq!(list.chunk_count(), 1);

        let overflow = list.allocate(999, "n").unwrap();
        assert_eq!(overflow.chunk(), 1);
        assert_eq!(overflow.slot(), 0);
        assert_eq!(list.capacity(), 2 * CHUNK_SLOTS);
    }

    #[test]
    fn test_free_slot_is_reused_without_compaction() {
        let mut list = SceneNodeList::new();
        let a = list.allocate(1, "a").unwrap();
        let b = list.allocate(2, "b").unwrap();
        let c = list.allocate(3, "c").unwrap();

        assert_eq!(list.free(b).unwrap().id(), 2);
        assert!(list.get(b).is_none());
        assert_eq!(list.get(a).unwrap().id(), 1);
        assert_eq!(list.get(c).unwrap().id(), 3);

        let d = list.allocate(4, "d").unwrap();
        assert_eq!(d, b);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_double_free_is_noop() {
        let mut list = SceneNodeList::new();
        let a = list.allocate(1, "a").unwrap();
        assert!(list.free(a).is_some());
        assert!(list.free(a).is_none());
        assert_eq!(list.len(), 0);
        assert!(list.free(NodeIndex::new(40, 2)).is_none());
    }

    #[test]
    fn test_lookup_tracks_last_allocation() {
        // Deterministic pseudo-random allocate/free churn
        let mut list = SceneNodeList::new();
        let mut live: HashMap<NodeIndex, u64> = HashMap::new();
        let mut freed: Vec<NodeIndex> = Vec::new();
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;

        for id in 0..2_000u64 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            if seed % 3 == 0 && !live.is_empty() {
                let victim = *live.keys().nth((seed as usize / 3) % live.len()).unwrap();
                live.remove(&victim);
                list.free(victim);
                freed.push(victim);
            } else {
                let index = list.allocate(id, "churn").unwrap();
                live.insert(index, id);
                freed.retain(|f| *f != index);
            }

            for (index, expected) in &live {
                assert_eq!(list.get(*index).map(SceneNode::id), Some(*expected));
            }
            for index in &freed {
                assert!(list.get(*index).is_none());
            }
        }
        assert_eq!(list.len(), live.len());
    }

    #[test]
    fn test_occupancy_matches_slots() {
        let mut list = SceneNodeList::new();
        let indices: Vec<_> = (0..10).map(|id| list.allocate(id, "n").unwrap()).collect();
        list.free(indices[4]);
        list.free(indices[7]);

        let chunk = list.chunks_mut().next().unwrap();
        for slot in 0..CHUNK_SLOTS {
            let bit = chunk.occupancy() & (1 << slot) != 0;
            assert_eq!(bit, chunk.slots[slot].is_some());
        }
        assert_eq!(chunk.len(), 8);
    }
}

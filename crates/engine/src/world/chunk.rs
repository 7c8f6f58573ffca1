use super::block::BlockId;
use super::position::LocalBlockPos;
use std::collections::HashMap;

/// Number of blocks along each axis of a chunk section.
pub const SECTION_SIZE: usize = 16;
/// Total block count in one section.
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// A 16x16x16 cube of blocks.
///
/// Stored as a flat array, y outermost and x innermost. A section that is
/// entirely air is never kept (see `Chunk`).
#[derive(Clone)]
pub struct ChunkSection {
    blocks: Box<[BlockId; SECTION_VOLUME]>,
}

impl ChunkSection {
    pub fn new_filled(block: BlockId) -> Self {
        Self {
            blocks: Box::new([block; SECTION_VOLUME]),
        }
    }

    pub fn new_empty() -> Self {
        Self::new_filled(BlockId::AIR)
    }

    /// Build a section from a flat block array in storage order.
    /// Returns `None` if the slice is not exactly one section long.
    pub fn from_blocks(blocks: &[BlockId]) -> Option<Self> {
        let blocks: Box<[BlockId; SECTION_VOLUME]> = blocks.to_vec().into_boxed_slice().try_into().ok()?;
        Some(Self { blocks })
    }

    #[inline]
    const fn index(x: u8, y: u8, z: u8) -> usize {
        (y as usize) * SECTION_SIZE * SECTION_SIZE + (z as usize) * SECTION_SIZE + (x as usize)
    }

    #[inline]
    pub fn get(&self, x: u8, y: u8, z: u8) -> BlockId {
        self.blocks[Self::index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: u8, y: u8, z: u8, block: BlockId) {
        self.blocks[Self::index(x, y, z)] = block;
    }

    /// Raw blocks in storage order.
    pub fn blocks(&self) -> &[BlockId; SECTION_VOLUME] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == BlockId::AIR)
    }
}

/// A column of chunk sections, keyed by section index (y >> 4).
///
/// Only non-empty sections are stored (sparse).
#[derive(Clone)]
pub struct Chunk {
    sections: HashMap<i32, ChunkSection>,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
        }
    }

    pub fn get_block(&self, pos: LocalBlockPos) -> BlockId {
        let section_idx = pos.section_index();
        match self.sections.get(&section_idx) {
            Some(section) => section.get(pos.x, pos.section_local_y(), pos.z),
            None => BlockId::AIR,
        }
    }

    pub fn set_block(&mut self, pos: LocalBlockPos, block: BlockId) {
        let section_idx = pos.section_index();

        if block == BlockId::AIR {
            if let Some(section) = self.sections.get_mut(&section_idx) {
                section.set(pos.x, pos.section_local_y(), pos.z, block);
                if section.is_empty() {
                    self.sections.remove(&section_idx);
                }
            }
        } else {
            let section = self
                .sections
                .entry(section_idx)
                .or_insert_with(ChunkSection::new_empty);
            section.set(pos.x, pos.section_local_y(), pos.z, block);
        }
    }

    /// Replace a whole section. All-air sections are dropped.
    pub fn insert_section(&mut self, index: i32, section: ChunkSection) {
        if section.is_empty() {
            self.sections.remove(&index);
        } else {
            self.sections.insert(index, section);
        }
    }

    /// Stored sections in no particular order.
    pub fn sections(&self) -> impl Iterator<Item = (i32, &ChunkSection)> {
        self.sections.iter().map(|(idx, section)| (*idx, section))
    }

    /// Indices of the stored sections, ascending.
    pub fn section_indices(&self) -> Vec<i32> {
        let mut indices: Vec<i32> = self.sections.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_the_last_block_drops_the_section() {
        let mut chunk = Chunk::new();
        let pos = LocalBlockPos { x: 3, y: 70, z: 9 };
        chunk.set_block(pos, BlockId(5));
        assert_eq!(chunk.section_count(), 1);
        assert_eq!(chunk.section_indices(), vec![4]);

        chunk.set_block(pos, BlockId::AIR);
        assert_eq!(chunk.section_count(), 0);
        assert_eq!(chunk.get_block(pos), BlockId::AIR);
    }

    #[test]
    fn from_blocks_rejects_wrong_length() {
        assert!(ChunkSection::from_blocks(&[BlockId(1); 10]).is_none());
        let section = ChunkSection::from_blocks(&[BlockId(1); SECTION_VOLUME]).unwrap();
        assert_eq!(section.get(15, 15, 15), BlockId(1));
    }
}

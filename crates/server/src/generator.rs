//! Column generation for chunks that were never stored.

use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{Chunk, SECTION_SIZE};
use strata_engine::world::dimension::Dimension;
use strata_engine::world::position::{ChunkPos, LocalBlockPos};

use crate::block;

pub trait Generator: Send + Sync {
    /// Fill `chunk` (empty on entry) for the column at `pos`.
    fn generate_column(&self, pos: ChunkPos, dimension: Dimension, chunk: &mut Chunk);
}

/// Leaves every column empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopGenerator;

impl Generator for NopGenerator {
    fn generate_column(&self, _pos: ChunkPos, _dimension: Dimension, _chunk: &mut Chunk) {}
}

/// Horizontal layers stacked up from the bottom of the dimension.
#[derive(Debug, Clone)]
pub struct FlatGenerator {
    /// `(block, thickness)`, bottom layer first.
    layers: Vec<(BlockId, u32)>,
}

impl FlatGenerator {
    pub fn new(layers: Vec<(BlockId, u32)>) -> Self {
        Self { layers }
    }

    /// Layers for `dimension`: bedrock, a thick base, and a surface.
    pub fn standard(dimension: Dimension) -> Self {
        let layers = match dimension {
            Dimension::Overworld => vec![
                (block::BEDROCK, 1),
                (block::STONE, 123),
                (block::DIRT, 3),
                (block::GRASS_BLOCK, 1),
            ],
            Dimension::Nether => vec![(block::BEDROCK, 1), (block::NETHERRACK, 63)],
            Dimension::End => vec![(block::END_STONE, 48)],
        };
        Self::new(layers)
    }

    /// y of the first air block above the layers in `dimension`.
    pub fn surface(&self, dimension: Dimension) -> i64 {
        let height: i64 = self.layers.iter().map(|(_, n)| *n as i64).sum();
        (dimension.range().min + height).min(dimension.range().max + 1)
    }
}

impl Generator for FlatGenerator {
    fn generate_column(&self, _pos: ChunkPos, dimension: Dimension, chunk: &mut Chunk) {
        let range = dimension.range();
        let mut y = range.min;
        for &(block, thickness) in &self.layers {
            for _ in 0..thickness {
                if !range.contains(y) {
                    return;
                }
                for x in 0..SECTION_SIZE as u8 {
                    for z in 0..SECTION_SIZE as u8 {
                        chunk.set_block(LocalBlockPos { x, y, z }, block);
                    }
                }
                y += 1;
            }
        }
    }
}

/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl BlockPos {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: (self.x >> 4) as i32,
            z: (self.z >> 4) as i32,
        }
    }

    /// Position within the chunk (0..16 on x/z, unchanged y).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & 0xF) as u8,
            y: self.y,
            z: (self.z & 0xF) as u8,
        }
    }

    pub const fn above(&self) -> BlockPos {
        Self::new(self.x, self.y + 1, self.z)
    }

    pub const fn below(&self) -> BlockPos {
        Self::new(self.x, self.y - 1, self.z)
    }

    /// The six cardinal neighbors.
    pub const fn neighbors(&self) -> [BlockPos; 6] {
        [
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x - 1, self.y, self.z),
            Self::new(self.x, self.y + 1, self.z),
            Self::new(self.x, self.y - 1, self.z),
            Self::new(self.x, self.y, self.z + 1),
            Self::new(self.x, self.y, self.z - 1),
        ]
    }

    /// The four horizontal neighbors (±X, ±Z).
    pub const fn horizontal_neighbors(&self) -> [BlockPos; 4] {
        [
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x - 1, self.y, self.z),
            Self::new(self.x, self.y, self.z + 1),
            Self::new(self.x, self.y, self.z - 1),
        ]
    }
}

/// Chunk column position (each column is 16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn block_origin(&self, y: i64) -> BlockPos {
        BlockPos::new((self.x as i64) << 4, y, (self.z as i64) << 4)
    }

    /// All chunk positions in the square of the given radius around `self`,
    /// nearest rows first.
    pub fn square(self, radius: i32) -> impl Iterator<Item = ChunkPos> {
        (-radius..=radius)
            .flat_map(move |dx| (-radius..=radius).map(move |dz| ChunkPos::new(self.x + dx, self.z + dz)))
    }
}

/// Block position local to a chunk (x, z in 0..16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i64,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn section_index(&self) -> i32 {
        (self.y >> 4) as i32
    }

    pub const fn section_local_y(&self) -> u8 {
        (self.y.rem_euclid(16)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_map_to_the_right_chunk() {
        let pos = BlockPos::new(-1, -65, -17);
        assert_eq!(pos.chunk(), ChunkPos::new(-1, -2));
        let local = pos.local();
        assert_eq!((local.x, local.z), (15, 15));
        assert_eq!(local.section_index(), -5);
        assert_eq!(local.section_local_y(), 15);
    }

    #[test]
    fn square_covers_every_column_once() {
        let center = ChunkPos::new(3, -2);
        let all: Vec<_> = center.square(1).collect();
        assert_eq!(all.len(), 9);
        assert!(all.contains(&ChunkPos::new(2, -3)));
        assert!(all.contains(&ChunkPos::new(4, -1)));
    }
}

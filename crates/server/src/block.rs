//! Block ids used by the bundled generator and rules.
//!
//! The values are Minecraft block state ids, so stored columns and any future
//! protocol layer can use `BlockId` directly without a mapping table.

use strata_engine::world::block::BlockId;

pub const AIR: BlockId = BlockId(0);
pub const STONE: BlockId = BlockId(1);
pub const GRASS_BLOCK: BlockId = BlockId(9); // snowy=false
pub const DIRT: BlockId = BlockId(10);
pub const WATER: BlockId = BlockId(80); // level=0
pub const BEDROCK: BlockId = BlockId(85);
pub const SAND: BlockId = BlockId(118);
pub const GRAVEL: BlockId = BlockId(124);
pub const NETHERRACK: BlockId = BlockId(6725);
pub const END_STONE: BlockId = BlockId(8214);

/// Does this block fall under gravity (like sand/gravel)?
pub fn has_gravity(id: BlockId) -> bool {
    id == SAND || id == GRAVEL
}

/// Can another block be placed in this space?
pub fn is_replaceable(id: BlockId) -> bool {
    id == AIR || id == WATER
}

/// Is this block fully solid?
pub fn is_solid(id: BlockId) -> bool {
    !is_replaceable(id)
}

/// Human-readable name for logs and the dashboard.
pub fn name(id: BlockId) -> &'static str {
    match id {
        AIR => "air",
        STONE => "stone",
        GRASS_BLOCK => "grass_block",
        DIRT => "dirt",
        WATER => "water",
        BEDROCK => "bedrock",
        SAND => "sand",
        GRAVEL => "gravel",
        NETHERRACK => "netherrack",
        END_STONE => "end_stone",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falling_blocks_are_solid() {
        for id in [SAND, GRAVEL] {
            assert!(has_gravity(id));
            assert!(is_solid(id));
        }
        assert!(!has_gravity(STONE));
        assert!(is_replaceable(WATER));
        assert_eq!(name(GRASS_BLOCK), "grass_block");
        assert_eq!(name(BlockId(4242)), "unknown");
    }
}

/// Opaque block identifier. The engine stores these without interpreting them;
/// rule sets supplied by the embedding server give specific IDs meaning.
///
/// The only semantic the engine enforces is that `BlockId::AIR` (0) is the
/// "empty" block: sections filled entirely with AIR are deallocated and never
/// random-ticked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The universal "empty" block.
    pub const AIR: BlockId = BlockId(0);

    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

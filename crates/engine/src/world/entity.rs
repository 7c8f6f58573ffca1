use indexmap::IndexMap;
use slotmap::new_key_type;

use super::position::{BlockPos, ChunkPos};

new_key_type! {
    /// Stable identity of an entity in one world, independent of the chunk it
    /// currently occupies. Handles are never reused while the world lives.
    pub struct EntityHandle;
}

/// A recognized kind of entity, e.g. `"item"` or `"falling_block"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKind(&'static str);

impl EntityKind {
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

/// What the world knows about one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityEntry {
    pub kind: EntityKind,
    pub pos: BlockPos,
}

impl EntityEntry {
    pub const fn chunk(&self) -> ChunkPos {
        self.pos.chunk()
    }
}

/// The set of entity kinds that may be constructed from stored or generated
/// data. Lookups of unregistered names fail so stale save data can be skipped.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    kinds: IndexMap<&'static str, EntityKind>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with `names`.
    pub fn with_kinds(names: &[&'static str]) -> Self {
        let mut registry = Self::new();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Register a kind, returning the existing one if `name` is already known.
    pub fn register(&mut self, name: &'static str) -> EntityKind {
        *self.kinds.entry(name).or_insert(EntityKind(name))
    }

    pub fn lookup(&self, name: &str) -> Option<EntityKind> {
        self.kinds.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.kinds.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_keeps_one_kind() {
        let mut registry = EntityRegistry::new();
        let a = registry.register("item");
        let b = registry.register("item");
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("item"), Some(a));
        assert_eq!(registry.lookup("zombie"), None);
    }
}

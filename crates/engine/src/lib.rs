//! Game-agnostic voxel world state for a single-writer simulation.
//!
//! [`world::World`] holds everything a world is made of (chunks, entities,
//! viewers, scheduled updates, the shared settings) and is mutated through
//! `&mut` only. [`rules::TickRules`] supplies the block behaviour a tick runs.
//! Concurrency lives one layer up, in the server's transaction queue.

pub mod rules;
pub mod world;

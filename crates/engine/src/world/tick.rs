use rand_chacha::rand_core::RngCore;

use super::World;
use super::chunk::SECTION_SIZE;
use super::position::BlockPos;
use crate::rules::{BlockChange, TickRules};

/// What one call to [`World::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number after this step.
    pub tick: i64,
    /// `false` on passive views, which only observe the shared clock.
    pub advanced: bool,
    pub scheduled_updates: usize,
    pub random_ticks: usize,
    pub block_changes: usize,
}

impl World {
    /// Advance the simulation by one tick.
    ///
    /// On the advancing instance this bumps the shared tick counter by exactly
    /// one, runs due scheduled updates, then random ticks. Passive views leave
    /// the simulation to the advancing instance and only forward the current
    /// time to their viewers.
    pub fn tick(&mut self, rules: &TickRules) -> TickReport {
        if !self.advancing {
            let tick = self.current_tick();
            self.notify_time(tick);
            return TickReport {
                tick,
                ..TickReport::default()
            };
        }

        let tick = self.settings.advance_tick();
        let mut report = TickReport {
            tick,
            advanced: true,
            ..TickReport::default()
        };

        // All due positions see the same state; writes land afterwards, so a
        // change can only propagate one step per tick.
        let due = self.scheduled.drain_due(tick);
        report.scheduled_updates = due.len();
        let changes: Vec<BlockChange> = due
            .into_iter()
            .flat_map(|pos| rules.evaluate_scheduled(self, pos))
            .collect();
        report.block_changes += self.apply(changes);

        if let Some(speed) = self.random_tick_speed {
            self.random_tick(rules, speed, &mut report);
        }

        self.notify_time(tick);
        report
    }

    /// Sample `speed` random positions in every non-empty section of every
    /// loaded chunk and run the random rules on the non-air ones.
    fn random_tick(&mut self, rules: &TickRules, speed: u32, report: &mut TickReport) {
        for chunk_pos in self.chunk_positions() {
            let Some(sections) = self.chunks.get(&chunk_pos).map(|c| c.section_indices()) else {
                continue;
            };
            for section in sections {
                let base = chunk_pos.block_origin(section as i64 * SECTION_SIZE as i64);
                for _ in 0..speed {
                    let r = self.rng.next_u32();
                    let pos = BlockPos::new(
                        base.x + (r & 0xF) as i64,
                        base.y + ((r >> 4) & 0xF) as i64,
                        base.z + ((r >> 8) & 0xF) as i64,
                    );
                    if self.get_block(pos).is_air() {
                        continue;
                    }
                    report.random_ticks += 1;
                    let changes = rules.evaluate_random(self, pos);
                    report.block_changes += self.apply(changes);
                }
            }
        }
    }

    /// Write rule output into the world, returning how many blocks changed.
    fn apply(&mut self, changes: Vec<BlockChange>) -> usize {
        changes
            .into_iter()
            .filter(|change| self.set_block(change.pos, change.block))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::world::block::BlockId;
    use crate::world::dimension::Dimension;
    use crate::world::settings::Settings;

    const SAND: BlockId = BlockId(12);
    const STONE: BlockId = BlockId(1);

    fn fall(world: &World, pos: BlockPos) -> Vec<BlockChange> {
        if world.get_block(pos) == SAND && world.get_block(pos.below()).is_air() {
            vec![
                BlockChange::new(pos, BlockId::AIR),
                BlockChange::new(pos.below(), SAND),
            ]
        } else {
            Vec::new()
        }
    }

    #[test]
    fn scheduled_rule_moves_one_step_per_tick() {
        let mut rules = TickRules::new();
        rules.add_scheduled(fall);
        let mut world = World::new(Dimension::Overworld, Arc::new(Settings::default()), 7);
        world.set_random_tick_speed(None);
        world.set_block(BlockPos::new(0, 0, 0), STONE);
        world.set_block(BlockPos::new(0, 4, 0), SAND);

        for expected in (1..=3).rev() {
            let report = world.tick(&rules);
            assert!(report.advanced);
            assert_eq!(world.get_block(BlockPos::new(0, expected, 0)), SAND);
        }
        // Resting on stone: nothing more happens.
        let report = world.tick(&rules);
        assert_eq!(report.block_changes, 0);
        assert_eq!(world.get_block(BlockPos::new(0, 1, 0)), SAND);
        assert_eq!(report.tick, 4);
    }

    #[test]
    fn passive_view_does_not_advance_shared_tick() {
        let settings = Arc::new(Settings::new("shared", 100));
        let mut owner = World::new(Dimension::Overworld, Arc::clone(&settings), 1);
        let mut view = World::new(Dimension::Overworld, Arc::clone(&settings), 1);
        let rules = TickRules::new();

        assert_eq!(view.tick(&rules), TickReport { tick: 100, ..TickReport::default() });
        assert_eq!(owner.tick(&rules).tick, 101);
        assert_eq!(view.tick(&rules).tick, 101);
        assert_eq!(settings.current_tick(), 101);
    }

    #[test]
    fn random_ticks_skip_air_and_respect_speed() {
        fn noop(_: &World, _: BlockPos) -> Vec<BlockChange> {
            Vec::new()
        }
        let mut rules = TickRules::new();
        rules.add_random(noop);
        let mut world = World::new(Dimension::Overworld, Arc::new(Settings::default()), 3);

        // One completely full section: every sample hits a block.
        let origin = BlockPos::new(0, 0, 0);
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    world.set_block(BlockPos::new(origin.x + x, y, origin.z + z), STONE);
                }
            }
        }
        world.set_random_tick_speed(Some(5));
        assert_eq!(world.tick(&rules).random_ticks, 5);

        world.set_random_tick_speed(None);
        assert_eq!(world.tick(&rules).random_ticks, 0);
    }
}

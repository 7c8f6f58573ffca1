pub mod block_updates;

use strata_engine::rules::TickRules;

/// The bundled rule set: gravity on scheduled updates, grass spread and
/// decay on random ticks.
pub fn standard() -> TickRules {
    let mut rules = TickRules::new();
    rules.add_scheduled(block_updates::gravity);
    rules.add_random(block_updates::grass_spread);
    rules.add_random(block_updates::grass_decay);
    rules
}

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use clap::Parser;
use strata_engine::world::dimension::Dimension;
use strata_engine::world::entity::EntityRegistry;
use strata_engine::world::position::ChunkPos;
use strata_server::config::PortalResolver;
use strata_server::dashboard::{self, DashboardState};
use strata_server::generator::FlatGenerator;
use strata_server::persistence::DirProvider;
use strata_server::provider::Provider;
use strata_server::{Config, SaveInterval, WeakWorldHandle, WorldHandle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata-server", about = "Runs an overworld and a nether linked by portals")]
struct Cli {
    /// World directory (created if missing)
    #[arg(long, default_value = "world")]
    world: PathBuf,

    /// Port of the status dashboard
    #[arg(long, default_value_t = 8000)]
    dashboard_port: u16,

    /// Never write to the world directory
    #[arg(long)]
    read_only: bool,

    /// Seconds between auto-saves; 0 uses the default, negative disables
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    save_interval_secs: i64,

    /// Random tick samples per section; 0 uses the default, negative disables
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    random_tick_speed: i32,

    /// RNG seed (defaults to the current time)
    #[arg(long)]
    seed: Option<u64>,

    /// Columns around the origin generated at startup
    #[arg(long, default_value_t = 4)]
    spawn_radius: i32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Entity kinds the bundled worlds accept.
const ENTITY_KINDS: &[&str] = &["item", "falling_block", "arrow"];

/// Portal resolver for a world whose portals lead to `target`. Holds a weak
/// handle so the two linked worlds don't keep each other alive.
fn portal_to(target: Dimension, slot: Arc<OnceLock<WeakWorldHandle>>) -> PortalResolver {
    Arc::new(move |dimension| {
        if dimension != target {
            return None;
        }
        slot.get().and_then(WeakWorldHandle::upgrade)
    })
}

/// Open one dimension on the shared provider. The first world opened on it
/// drives the shared tick.
async fn open_dimension(
    cli: &Cli,
    dimension: Dimension,
    provider: Arc<dyn Provider>,
    portal: PortalResolver,
) -> anyhow::Result<WorldHandle> {
    let world = Config {
        dimension,
        portal_destination: Some(portal),
        provider: Some(provider),
        generator: Some(Arc::new(FlatGenerator::standard(dimension))),
        read_only: cli.read_only,
        save_interval: SaveInterval::from_secs(cli.save_interval_secs),
        random_tick_speed: cli.random_tick_speed,
        random_seed: cli.seed,
        entities: EntityRegistry::with_kinds(ENTITY_KINDS),
        ..Config::default()
    }
    .open()
    .await?;

    let radius = cli.spawn_radius.max(0);
    let side = 2 * radius + 1;
    let generated = world
        .submit("spawn-pregen", move |tx| tx.load_area(ChunkPos::new(0, 0), radius))
        .await?;
    tracing::info!("{}: {} spawn columns ready ({} new)", dimension, side * side, generated);
    Ok(world)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    tracing::info!("Strata world server");

    let provider: Arc<dyn Provider> = Arc::new(
        DirProvider::open(&cli.world).with_context(|| format!("opening {}", cli.world.display()))?,
    );
    let overworld_slot: Arc<OnceLock<WeakWorldHandle>> = Arc::default();
    let nether_slot: Arc<OnceLock<WeakWorldHandle>> = Arc::default();

    let overworld = open_dimension(
        &cli,
        Dimension::Overworld,
        Arc::clone(&provider),
        portal_to(Dimension::Nether, Arc::clone(&nether_slot)),
    )
    .await?;
    let _ = overworld_slot.set(overworld.downgrade());

    let nether = open_dimension(
        &cli,
        Dimension::Nether,
        provider,
        portal_to(Dimension::Overworld, Arc::clone(&overworld_slot)),
    )
    .await?;
    let _ = nether_slot.set(nether.downgrade());

    // Start live dashboard (non-blocking, runs on its own tasks).
    let state = Arc::new(DashboardState::new(vec![overworld.clone(), nether.clone()]));
    let dashboard = tokio::spawn(dashboard::server::start(state, cli.dashboard_port));

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("Ctrl+C received, shutting down...");

    dashboard.abort();
    tokio::join!(overworld.close(), nether.close());
    Ok(())
}

use anyhow::Result;
use flock_core::{BoundaryVolume, FlockConfig, FlockWorld};
use glam::Quat;
use tracing::{info, warn};

const DT: f32 = 1.0 / 60.0;
const TICKS: u64 = 600;
const LOG_INTERVAL: u64 = 120;
const ORIENTATION_SMOOTHING: f32 = 0.1;

fn main() -> Result<()> {
    init_tracing();
    let mut world = bootstrap_world()?;
    info!(
        agents = world.agent_count(),
        seed = ?world.config().rng_seed,
        "Starting headless flock run"
    );

    let handles: Vec<_> = world.iter_handles().collect();
    let mut orientations: Vec<Quat> = vec![Quat::IDENTITY; handles.len()];

    for frame in 1..=TICKS {
        let summary = world.step(DT);

        // A render layer samples orientations on its own cadence; here we
        // sample twice per tick to mimic a faster frame clock.
        for _ in 0..2 {
            for (slot, id) in handles.iter().enumerate() {
                if let Some(orientation) = world.sample_orientation(*id, ORIENTATION_SMOOTHING) {
                    orientations[slot] = orientation;
                }
            }
        }

        if frame == TICKS / 2 {
            let shrunk = BoundaryVolume::new(14.0, 5.0, 10.0);
            world.set_boundary(shrunk)?;
            info!(extent = ?shrunk.extent, "Resized boundary mid-run");
        }

        if frame % LOG_INTERVAL == 0 {
            info!(
                tick = summary.tick.0,
                agents = summary.agent_count,
                avg_speed = summary.average_speed,
                max_speed = summary.max_speed,
                out_of_bounds = summary.out_of_bounds,
                "Tick summary"
            );
        }
    }

    match world.history().last() {
        Some(summary) => info!(
            tick = summary.tick.0,
            avg_speed = summary.average_speed,
            out_of_bounds = summary.out_of_bounds,
            "Run complete"
        ),
        None => warn!("Run completed without tick summaries"),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_world() -> Result<FlockWorld> {
    let config = FlockConfig {
        rng_seed: Some(0xF10C_4B1D),
        history_capacity: TICKS as usize,
        ..FlockConfig::default()
    };
    Ok(FlockWorld::new(config)?)
}

//! Flocking simulation core: per-tick steering, integration, and read access
//! for a rendering layer.
//!
//! The world owns a fixed flock of agents stored in dense SoA columns behind
//! generational handles. Each [`FlockWorld::step`] runs a two-phase tick:
//! every agent's steering force is computed from an immutable snapshot of the
//! pre-tick state, then all new positions and velocities are committed in one
//! batch. Results are therefore independent of agent iteration order and safe
//! to parallelize.

use glam::{Mat3, Quat, Vec3};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Distance from a boundary face at which the containment force engages.
pub const BOUNDARY_MARGIN: f32 = 1.0;
/// Magnitude of the containment force; large enough to dominate all behaviors.
pub const BOUNDARY_PUSH: f32 = 50.0;
/// Bound of the uniform wander-phase perturbation applied each tick.
pub const WANDER_JITTER: f32 = 0.05;

/// Linearly remap `value` from `[low1, high1]` to `[low2, high2]`.
fn remap(value: f32, low1: f32, high1: f32, low2: f32, high2: f32) -> f32 {
    let span = high1 - low1;
    if span.abs() <= f32::EPSILON {
        return low2;
    }
    low2 + ((high2 - low2) * (value - low1)) / span
}

/// Rotation that points the local `+Z` axis along `forward`, or `None` when
/// `forward` has no usable direction.
fn look_rotation(forward: Vec3) -> Option<Quat> {
    let forward = forward.try_normalize()?;
    let mut up = Vec3::Y;
    if forward.dot(up).abs() > 0.999 {
        // Looking straight up or down; pick another reference axis.
        up = Vec3::Z;
    }
    let right = up.cross(forward).normalize();
    let up = forward.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, forward)))
}

/// Axis-aligned simulation volume centered at the origin.
///
/// `extent` holds the full edge length per axis, so agents occupy
/// `[-extent/2, extent/2]` on each axis. The box is a soft wall: containment
/// engages within [`BOUNDARY_MARGIN`] of a face and agents may transiently
/// overshoot before it dominates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundaryVolume {
    pub extent: Vec3,
}

impl BoundaryVolume {
    /// Construct a volume from full edge lengths.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            extent: Vec3::new(x, y, z),
        }
    }

    /// Half edge length per axis.
    #[must_use]
    pub fn half_extent(&self) -> Vec3 {
        self.extent * 0.5
    }

    /// Whether `point` lies inside the volume (faces inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        let half = self.half_extent();
        point.x.abs() <= half.x && point.y.abs() <= half.y && point.z.abs() <= half.z
    }
}

impl Default for BoundaryVolume {
    fn default() -> Self {
        Self::new(27.0, 7.0, 20.0)
    }
}

/// Errors raised when constructing or reconfiguring a world.
#[derive(Debug, Error)]
pub enum FlockError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static steering configuration, fixed for the lifetime of a world apart
/// from live boundary resizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlockConfig {
    /// Number of agents spawned at construction.
    pub agent_count: usize,
    /// Simulation volume. May be resized live via [`FlockWorld::set_boundary`].
    pub boundary: BoundaryVolume,
    /// Whether agents wander vertically and spawn with a z coordinate.
    pub three_d: bool,
    /// Enables the alignment behavior.
    pub alignment: bool,
    /// Enables the avoidance (separation) behavior.
    pub avoidance: bool,
    /// Enables the cohesion behavior.
    pub cohesion: bool,
    /// Radius of the wander steering circle.
    pub wander_radius: f32,
    /// Strength multiplier for the wander force.
    pub wander_strength: f32,
    /// Interaction radius for alignment.
    pub align_radius: f32,
    /// Strength multiplier for alignment.
    pub align_strength: f32,
    /// Interaction radius for avoidance.
    pub avoid_radius: f32,
    /// Strength multiplier for avoidance.
    pub avoid_strength: f32,
    /// Interaction radius for cohesion.
    pub cohesion_radius: f32,
    /// Strength multiplier for cohesion.
    pub cohesion_strength: f32,
    /// Cap on the combined steering magnitude, scaled by `dt` each tick.
    pub max_steering: f32,
    /// Speed bound assigned to the largest agents.
    pub min_speed: f32,
    /// Speed bound assigned to the smallest agents.
    pub max_speed: f32,
    /// Smallest agent scale sampled at spawn.
    pub min_scale: f32,
    /// Largest agent scale sampled at spawn.
    pub max_scale: f32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            agent_count: 40,
            boundary: BoundaryVolume::default(),
            three_d: true,
            alignment: true,
            avoidance: true,
            cohesion: true,
            wander_radius: 5.0,
            wander_strength: 2.0,
            align_radius: 1.2,
            align_strength: 4.0,
            avoid_radius: 0.8,
            avoid_strength: 2.0,
            cohesion_radius: 1.22,
            cohesion_strength: 4.0,
            max_steering: 0.1,
            min_speed: 0.4,
            max_speed: 0.6,
            min_scale: 0.7,
            max_scale: 1.3,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl FlockConfig {
    /// Validates the configuration. Invalid values fail fast here and are
    /// never silently clamped.
    pub fn validate(&self) -> Result<(), FlockError> {
        if self.wander_radius < 0.0
            || self.align_radius < 0.0
            || self.avoid_radius < 0.0
            || self.cohesion_radius < 0.0
        {
            return Err(FlockError::InvalidConfig(
                "behavior radii must be non-negative",
            ));
        }
        if self.wander_strength < 0.0
            || self.align_strength < 0.0
            || self.avoid_strength < 0.0
            || self.cohesion_strength < 0.0
        {
            return Err(FlockError::InvalidConfig(
                "behavior strengths must be non-negative",
            ));
        }
        if self.max_steering < 0.0 {
            return Err(FlockError::InvalidConfig(
                "max_steering must be non-negative",
            ));
        }
        if self.min_speed < 0.0 || self.min_speed > self.max_speed {
            return Err(FlockError::InvalidConfig(
                "speed bounds require 0 <= min_speed <= max_speed",
            ));
        }
        if self.min_scale <= 0.0 || self.min_scale > self.max_scale {
            return Err(FlockError::InvalidConfig(
                "scale range requires 0 < min_scale <= max_scale",
            ));
        }
        if self.boundary.extent.min_element() < 0.0 {
            return Err(FlockError::InvalidConfig(
                "boundary extents must be non-negative",
            ));
        }
        if self.history_capacity == 0 {
            return Err(FlockError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Per-tick speed bound for an agent of the given scale: the scale range
    /// remaps linearly onto `[max_speed, min_speed]`, so smaller agents get
    /// the larger bound.
    #[must_use]
    pub fn speed_for_scale(&self, scale: f32) -> f32 {
        remap(
            scale,
            self.min_scale,
            self.max_scale,
            self.max_speed,
            self.min_speed,
        )
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Scalar fields for a single agent used when spawning or snapshotting from
/// the SoA store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentData {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Phase in radians driving the drifting wander heading; unbounded, wraps
    /// implicitly through trigonometric use.
    pub wander_phase: f32,
    /// Fixed at spawn; inversely modulates the agent's speed bound.
    pub scale: f32,
}

impl Default for AgentData {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            wander_phase: 0.0,
            scale: 1.0,
        }
    }
}

/// Collection of per-agent columns for hot-path iteration.
///
/// Orientations are secondary smoothing state advanced by
/// [`FlockWorld::sample_orientation`], not by the physics tick.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentColumns {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    wander_phases: Vec<f32>,
    scales: Vec<f32>,
    orientations: Vec<Quat>,
}

impl AgentColumns {
    /// Create a collection with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            wander_phases: Vec::with_capacity(capacity),
            scales: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
        }
    }

    /// Number of active rows in the columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if there are no active rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a new row onto each column. Orientation starts at identity.
    pub fn push(&mut self, agent: AgentData) {
        self.positions.push(agent.position);
        self.velocities.push(agent.velocity);
        self.wander_phases.push(agent.wander_phase);
        self.scales.push(agent.scale);
        self.orientations.push(Quat::IDENTITY);
        self.debug_assert_coherent();
    }

    /// Return a copy of the scalar fields at `index`.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> AgentData {
        AgentData {
            position: self.positions[index],
            velocity: self.velocities[index],
            wander_phase: self.wander_phases[index],
            scale: self.scales[index],
        }
    }

    /// Immutable access to the positions slice.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable access to the positions slice.
    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Immutable access to the velocities slice.
    #[must_use]
    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// Mutable access to the velocities slice.
    #[must_use]
    pub fn velocities_mut(&mut self) -> &mut [Vec3] {
        &mut self.velocities
    }

    /// Immutable access to wander phases.
    #[must_use]
    pub fn wander_phases(&self) -> &[f32] {
        &self.wander_phases
    }

    /// Mutable access to wander phases.
    #[must_use]
    pub fn wander_phases_mut(&mut self) -> &mut [f32] {
        &mut self.wander_phases
    }

    /// Immutable access to agent scales.
    #[must_use]
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    /// Immutable access to smoothed orientations.
    #[must_use]
    pub fn orientations(&self) -> &[Quat] {
        &self.orientations
    }

    /// Mutable access to smoothed orientations.
    #[must_use]
    pub fn orientations_mut(&mut self) -> &mut [Quat] {
        &mut self.orientations
    }

    #[inline]
    fn debug_assert_coherent(&self) {
        debug_assert_eq!(self.positions.len(), self.velocities.len());
        debug_assert_eq!(self.positions.len(), self.wander_phases.len());
        debug_assert_eq!(self.positions.len(), self.scales.len());
        debug_assert_eq!(self.positions.len(), self.orientations.len());
    }
}

/// Dense SoA storage with generational handles for agent access.
///
/// The population is fixed once the world is built; the arena has no removal
/// path, so handles stay valid for the lifetime of the run.
#[derive(Debug, Default)]
pub struct AgentArena {
    slots: SlotMap<AgentId, usize>,
    handles: Vec<AgentId>,
    columns: AgentColumns,
}

impl AgentArena {
    /// Create an arena with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            columns: AgentColumns::with_capacity(capacity),
        }
    }

    /// Number of active agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true when no agents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over agent handles in dense iteration order.
    pub fn iter_handles(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.handles.iter().copied()
    }

    /// Borrow the underlying column storage.
    #[must_use]
    pub fn columns(&self) -> &AgentColumns {
        &self.columns
    }

    /// Mutably borrow the underlying column storage.
    #[must_use]
    pub fn columns_mut(&mut self) -> &mut AgentColumns {
        &mut self.columns
    }

    /// Returns the dense index for `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: AgentId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Returns true if `id` refers to a live agent.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert a new agent and return its handle.
    pub fn insert(&mut self, agent: AgentData) -> AgentId {
        let index = self.columns.len();
        self.columns.push(agent);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Produce a copy of the scalar data for `id`.
    #[must_use]
    pub fn snapshot(&self, id: AgentId) -> Option<AgentData> {
        let index = self.index_of(id)?;
        Some(self.columns.snapshot(index))
    }
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Summary emitted after each tick and retained in the bounded history.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_count: usize,
    /// Mean per-tick displacement magnitude across the flock.
    pub average_speed: f32,
    /// Largest per-tick displacement magnitude across the flock.
    pub max_speed: f32,
    /// Agents currently outside the boundary volume.
    pub out_of_bounds: usize,
}

/// Committed per-agent result of one tick's force computation.
#[derive(Debug, Clone, Copy)]
struct StepDelta {
    position: Vec3,
    velocity: Vec3,
    wander_phase: f32,
}

/// Compute one agent's post-tick state from the pre-tick snapshot.
///
/// `phase` must already include this tick's wander jitter. All reads of other
/// agents go through the snapshot slices, never partially-updated state.
fn integrate_agent(
    config: &FlockConfig,
    positions: &[Vec3],
    velocities: &[Vec3],
    index: usize,
    phase: f32,
    scale: f32,
    dt: f32,
) -> StepDelta {
    let position = positions[index];
    let mut wander_phase = phase;

    // Wander heading in the horizontal plane, plus the vertical-wander plane
    // when running in 3D.
    let radius = config.wander_radius;
    let mut steering = Vec3::new(
        wander_phase.cos() * radius,
        wander_phase.sin() * radius,
        0.0,
    )
    .normalize_or_zero()
        * config.wander_strength;
    if config.three_d {
        steering += Vec3::new(
            wander_phase.cos() * radius,
            0.0,
            wander_phase.sin() * radius,
        )
        .normalize_or_zero()
            * config.wander_strength;
    }

    // Boundary containment: pull toward the center on any axis near a face
    // and reverse the wander heading so the agent does not drift back out.
    // The phase flip lands after the wander force was taken, so it shapes the
    // next tick.
    let half = config.boundary.half_extent();
    let mut correction = Vec3::ZERO;
    if position.x.abs() + BOUNDARY_MARGIN > half.x {
        correction.x = -position.x;
        wander_phase += HALF_TURN;
    }
    if position.y.abs() + BOUNDARY_MARGIN > half.y {
        correction.y = -position.y;
        wander_phase += HALF_TURN;
    }
    if position.z.abs() + BOUNDARY_MARGIN > half.z {
        correction.z = -position.z;
        wander_phase += HALF_TURN;
    }
    steering += correction.normalize_or_zero() * BOUNDARY_PUSH;

    // Brute-force neighbor scan. The 1/d weighting makes closer neighbors
    // dominate alignment and avoidance.
    let mut alignment = Vec3::ZERO;
    let mut avoidance = Vec3::ZERO;
    let mut cohesion = Vec3::ZERO;
    let mut cohesion_neighbors = 0usize;
    for other in 0..positions.len() {
        if other == index {
            continue;
        }
        let d = position.distance(positions[other]);
        if d <= 0.0 {
            continue;
        }
        if config.alignment && d < config.align_radius {
            alignment += velocities[other].normalize_or_zero() / d;
        }
        if config.avoidance && d < config.avoid_radius {
            avoidance += (position - positions[other]).normalize_or_zero() / d;
        }
        if config.cohesion && d < config.cohesion_radius {
            cohesion += positions[other];
            cohesion_neighbors += 1;
        }
    }

    if config.alignment {
        steering += alignment.normalize_or_zero() * config.align_strength;
    }
    if config.avoidance {
        steering += avoidance.normalize_or_zero() * config.avoid_strength;
    }
    if config.cohesion && cohesion_neighbors > 0 {
        let centroid = cohesion / cohesion_neighbors as f32;
        steering += (centroid - position).normalize_or_zero() * config.cohesion_strength;
    }

    let steering = steering.clamp_length_max(config.max_steering * dt);
    let velocity = (velocities[index] + steering)
        .clamp_length_max(config.speed_for_scale(scale) * dt);

    StepDelta {
        position: position + velocity,
        velocity,
        wander_phase,
    }
}

/// The flock simulator: owns the agents, the clock, and the RNG.
pub struct FlockWorld {
    config: FlockConfig,
    tick: Tick,
    rng: SmallRng,
    agents: AgentArena,
    jitter_scratch: Vec<f32>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for FlockWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlockWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("agent_count", &self.agents.len())
            .finish()
    }
}

impl FlockWorld {
    /// Instantiate a world and spawn its flock from the supplied configuration.
    ///
    /// Each agent spawns with a position uniformly sampled inside the
    /// boundary, zero velocity, a uniform wander phase in `[0, 2π)`, and a
    /// uniform scale in `[min_scale, max_scale]`.
    pub fn new(config: FlockConfig) -> Result<Self, FlockError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let mut agents = AgentArena::with_capacity(config.agent_count);
        let half = config.boundary.half_extent();
        for _ in 0..config.agent_count {
            let position = Vec3::new(
                sample_axis(&mut rng, half.x),
                sample_axis(&mut rng, half.y),
                if config.three_d {
                    sample_axis(&mut rng, half.z)
                } else {
                    0.0
                },
            );
            agents.insert(AgentData {
                position,
                velocity: Vec3::ZERO,
                wander_phase: rng.random_range(0.0..FULL_TURN),
                scale: rng.random_range(config.min_scale..=config.max_scale),
            });
        }
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            agents,
            jitter_scratch: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Advance every agent by one simulation step of `dt` world-clock units.
    ///
    /// All steering and velocity deltas scale with `dt`; the wander-phase
    /// jitter deliberately does not (reference behavior, kept as specified).
    pub fn step(&mut self, dt: f32) -> TickSummary {
        let next_tick = self.tick.next();
        let agent_count = self.agents.len();
        if agent_count > 0 {
            // Phase jitter is drawn serially in dense order so seeded runs
            // stay deterministic regardless of how rayon splits the work.
            self.jitter_scratch.clear();
            for _ in 0..agent_count {
                self.jitter_scratch
                    .push(self.rng.random_range(-WANDER_JITTER..WANDER_JITTER));
            }

            let columns = self.agents.columns();
            let positions: Vec<Vec3> = columns.positions().to_vec();
            let velocities: Vec<Vec3> = columns.velocities().to_vec();
            let phases: Vec<f32> = columns.wander_phases().to_vec();
            let scales: Vec<f32> = columns.scales().to_vec();
            let config = &self.config;
            let jitters = &self.jitter_scratch;

            let deltas: Vec<StepDelta> = (0..agent_count)
                .into_par_iter()
                .map(|index| {
                    integrate_agent(
                        config,
                        &positions,
                        &velocities,
                        index,
                        phases[index] + jitters[index],
                        scales[index],
                        dt,
                    )
                })
                .collect();

            let columns = self.agents.columns_mut();
            {
                let positions = columns.positions_mut();
                for (index, delta) in deltas.iter().enumerate() {
                    positions[index] = delta.position;
                }
            }
            {
                let velocities = columns.velocities_mut();
                for (index, delta) in deltas.iter().enumerate() {
                    velocities[index] = delta.velocity;
                }
            }
            {
                let phases = columns.wander_phases_mut();
                for (index, delta) in deltas.iter().enumerate() {
                    phases[index] = delta.wander_phase;
                }
            }
        }

        self.tick = next_tick;
        let summary = self.summarize();
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        summary
    }

    fn summarize(&self) -> TickSummary {
        let columns = self.agents.columns();
        let agent_count = columns.len();
        let mut total_speed = 0.0f32;
        let mut max_speed = 0.0f32;
        let mut out_of_bounds = 0usize;
        for index in 0..agent_count {
            let speed = columns.velocities()[index].length();
            total_speed += speed;
            max_speed = max_speed.max(speed);
            if !self.config.boundary.contains(columns.positions()[index]) {
                out_of_bounds += 1;
            }
        }
        let average_speed = if agent_count > 0 {
            total_speed / agent_count as f32
        } else {
            0.0
        };
        TickSummary {
            tick: self.tick,
            agent_count,
            average_speed,
            max_speed,
            out_of_bounds,
        }
    }

    /// Sample the smoothed facing orientation for `id`.
    ///
    /// The stored quaternion slerps toward the rotation looking from the
    /// agent's position toward `position + velocity` by `smoothing` on every
    /// call, so a renderer may sample more often than the world ticks. A
    /// zero-length velocity keeps the previous orientation.
    pub fn sample_orientation(&mut self, id: AgentId, smoothing: f32) -> Option<Quat> {
        let index = self.agents.index_of(id)?;
        let velocity = self.agents.columns().velocities()[index];
        let current = self.agents.columns().orientations()[index];
        let next = match look_rotation(velocity) {
            Some(target) => current.slerp(target, smoothing.clamp(0.0, 1.0)),
            None => current,
        };
        self.agents.columns_mut().orientations_mut()[index] = next;
        Some(next)
    }

    /// Resize the boundary volume without touching agent state; only the
    /// containment thresholds change.
    pub fn set_boundary(&mut self, boundary: BoundaryVolume) -> Result<(), FlockError> {
        if boundary.extent.min_element() < 0.0 {
            return Err(FlockError::InvalidConfig(
                "boundary extents must be non-negative",
            ));
        }
        self.config.boundary = boundary;
        Ok(())
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Read-only access to the agent arena.
    #[must_use]
    pub fn agents(&self) -> &AgentArena {
        &self.agents
    }

    /// Mutable access to the agent arena.
    #[must_use]
    pub fn agents_mut(&mut self) -> &mut AgentArena {
        &mut self.agents
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Iterate over agent handles in dense order.
    pub fn iter_handles(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.iter_handles()
    }

    /// Current position for `id`.
    #[must_use]
    pub fn position(&self, id: AgentId) -> Option<Vec3> {
        let index = self.agents.index_of(id)?;
        Some(self.agents.columns().positions()[index])
    }

    /// Current velocity for `id`.
    #[must_use]
    pub fn velocity(&self, id: AgentId) -> Option<Vec3> {
        let index = self.agents.index_of(id)?;
        Some(self.agents.columns().velocities()[index])
    }

    /// Spawn-time scale for `id`.
    #[must_use]
    pub fn scale(&self, id: AgentId) -> Option<f32> {
        let index = self.agents.index_of(id)?;
        Some(self.agents.columns().scales()[index])
    }

    /// Produce a copy of the scalar data for `id`.
    #[must_use]
    pub fn snapshot(&self, id: AgentId) -> Option<AgentData> {
        self.agents.snapshot(id)
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

fn sample_axis(rng: &mut SmallRng, half: f32) -> f32 {
    if half > 0.0 {
        rng.random_range(-half..half)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> FlockConfig {
        FlockConfig {
            agent_count: 0,
            alignment: false,
            avoidance: false,
            cohesion: false,
            wander_strength: 0.0,
            rng_seed: Some(1),
            ..FlockConfig::default()
        }
    }

    #[test]
    fn remap_covers_endpoints_and_midpoint() {
        assert_eq!(remap(0.7, 0.7, 1.3, 0.6, 0.4), 0.6);
        assert_eq!(remap(1.3, 0.7, 1.3, 0.6, 0.4), 0.4);
        let mid = remap(1.0, 0.7, 1.3, 0.6, 0.4);
        assert!((mid - 0.5).abs() < 1e-6);
        // Degenerate input range falls back to the low output.
        assert_eq!(remap(5.0, 2.0, 2.0, 0.6, 0.4), 0.6);
    }

    #[test]
    fn smaller_agents_get_the_larger_speed_bound() {
        let config = FlockConfig::default();
        assert!(config.speed_for_scale(config.min_scale) > config.speed_for_scale(config.max_scale));
        assert!((config.speed_for_scale(config.min_scale) - config.max_speed).abs() < 1e-6);
        assert!((config.speed_for_scale(config.max_scale) - config.min_speed).abs() < 1e-6);
    }

    #[test]
    fn look_rotation_points_local_z_along_forward() {
        let forward = Vec3::new(1.0, 0.5, -0.25);
        let rotation = look_rotation(forward).expect("rotation");
        let faced = rotation * Vec3::Z;
        assert!(faced.abs_diff_eq(forward.normalize(), 1e-5));
        assert!(look_rotation(Vec3::ZERO).is_none());
        // Straight up must not collapse the basis.
        let up = look_rotation(Vec3::Y).expect("rotation");
        assert!((up * Vec3::Z).abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let cases: Vec<(FlockConfig, &str)> = vec![
            (
                FlockConfig {
                    align_radius: -1.0,
                    ..FlockConfig::default()
                },
                "radii",
            ),
            (
                FlockConfig {
                    cohesion_strength: -0.5,
                    ..FlockConfig::default()
                },
                "strengths",
            ),
            (
                FlockConfig {
                    max_steering: -0.1,
                    ..FlockConfig::default()
                },
                "max_steering",
            ),
            (
                FlockConfig {
                    min_speed: 0.9,
                    max_speed: 0.4,
                    ..FlockConfig::default()
                },
                "speed bounds",
            ),
            (
                FlockConfig {
                    min_scale: 0.0,
                    ..FlockConfig::default()
                },
                "scale range",
            ),
            (
                FlockConfig {
                    boundary: BoundaryVolume::new(-1.0, 7.0, 20.0),
                    ..FlockConfig::default()
                },
                "boundary",
            ),
            (
                FlockConfig {
                    history_capacity: 0,
                    ..FlockConfig::default()
                },
                "history_capacity",
            ),
        ];
        for (config, fragment) in cases {
            let err = config.validate().expect_err("config should be rejected");
            assert!(
                err.to_string().contains(fragment),
                "error {err} should mention {fragment}"
            );
        }
        assert!(FlockConfig::default().validate().is_ok());
    }

    #[test]
    fn spawn_respects_boundary_and_ranges() {
        let config = FlockConfig {
            agent_count: 64,
            rng_seed: Some(7),
            ..FlockConfig::default()
        };
        let world = FlockWorld::new(config.clone()).expect("world");
        assert_eq!(world.agent_count(), 64);
        let half = config.boundary.half_extent();
        for id in world.iter_handles() {
            let agent = world.snapshot(id).expect("snapshot");
            assert!(agent.position.x.abs() <= half.x);
            assert!(agent.position.y.abs() <= half.y);
            assert!(agent.position.z.abs() <= half.z);
            assert_eq!(agent.velocity, Vec3::ZERO);
            assert!((0.0..FULL_TURN).contains(&agent.wander_phase));
            assert!((config.min_scale..=config.max_scale).contains(&agent.scale));
        }
    }

    #[test]
    fn flat_mode_spawns_in_plane() {
        let config = FlockConfig {
            agent_count: 16,
            three_d: false,
            rng_seed: Some(3),
            ..FlockConfig::default()
        };
        let world = FlockWorld::new(config).expect("world");
        for position in world.agents().columns().positions() {
            assert_eq!(position.z, 0.0);
        }
    }

    #[test]
    fn arena_handles_are_unique_and_stable() {
        let mut arena = AgentArena::with_capacity(2);
        let a = arena.insert(AgentData::default());
        let b = arena.insert(AgentData {
            scale: 1.2,
            ..AgentData::default()
        });
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.index_of(a), Some(0));
        assert_eq!(arena.index_of(b), Some(1));
        assert!(arena.contains(a));
        let snapshot = arena.snapshot(b).expect("snapshot");
        assert_eq!(snapshot.scale, 1.2);
    }

    #[test]
    fn boundary_overshoot_triggers_containment_and_phase_flip() {
        let mut config = quiet_config();
        config.boundary = BoundaryVolume::new(10.0, 10.0, 10.0);
        let positions = vec![Vec3::new(4.8, 0.0, 0.0)];
        let velocities = vec![Vec3::ZERO];
        let delta = integrate_agent(&config, &positions, &velocities, 0, 0.5, 1.0, 1.0);
        // One axis exceeded: correction points toward center along -x and the
        // wander heading is reversed for the next tick.
        assert!(delta.velocity.x < 0.0);
        assert!((delta.wander_phase - (0.5 + HALF_TURN)).abs() < 1e-6);
    }

    #[test]
    fn interior_agent_sees_no_containment_and_no_nan() {
        let mut config = quiet_config();
        config.boundary = BoundaryVolume::new(100.0, 100.0, 100.0);
        let positions = vec![Vec3::ZERO];
        let velocities = vec![Vec3::ZERO];
        let delta = integrate_agent(&config, &positions, &velocities, 0, 1.0, 1.0, 1.0);
        // No behaviors, no wander strength, no correction: everything stays
        // finite and at rest.
        assert_eq!(delta.velocity, Vec3::ZERO);
        assert_eq!(delta.position, Vec3::ZERO);
        assert!(delta.position.is_finite());
    }

    #[test]
    fn zero_extent_axis_does_not_divide_by_zero() {
        let mut config = quiet_config();
        config.boundary = BoundaryVolume::new(10.0, 0.0, 10.0);
        let positions = vec![Vec3::new(0.0, 0.2, 0.0)];
        let velocities = vec![Vec3::ZERO];
        let delta = integrate_agent(&config, &positions, &velocities, 0, 0.0, 1.0, 1.0);
        assert!(delta.position.is_finite());
        assert!(delta.velocity.y < 0.0, "pushed back toward the plane");
    }

    #[test]
    fn coincident_agents_are_skipped_in_the_scan() {
        let mut config = quiet_config();
        config.avoidance = true;
        config.boundary = BoundaryVolume::new(100.0, 100.0, 100.0);
        let positions = vec![Vec3::ONE, Vec3::ONE];
        let velocities = vec![Vec3::ZERO, Vec3::ZERO];
        let delta = integrate_agent(&config, &positions, &velocities, 0, 0.0, 1.0, 1.0);
        assert!(delta.position.is_finite());
        assert_eq!(delta.velocity, Vec3::ZERO);
    }

    #[test]
    fn empty_world_ticks_as_a_no_op() {
        let mut world = FlockWorld::new(quiet_config()).expect("world");
        let summary = world.step(1.0 / 60.0);
        assert_eq!(summary.tick, Tick(1));
        assert_eq!(summary.agent_count, 0);
        assert_eq!(summary.average_speed, 0.0);
        assert_eq!(world.history().count(), 1);
    }

    #[test]
    fn history_is_bounded_by_capacity() {
        let mut config = quiet_config();
        config.history_capacity = 4;
        let mut world = FlockWorld::new(config).expect("world");
        for _ in 0..10 {
            world.step(1.0 / 60.0);
        }
        let ticks: Vec<u64> = world.history().map(|summary| summary.tick.0).collect();
        assert_eq!(ticks, vec![7, 8, 9, 10]);
    }

    #[test]
    fn orientation_sampling_is_decoupled_from_ticks() {
        let config = FlockConfig {
            agent_count: 1,
            rng_seed: Some(11),
            ..quiet_config()
        };
        let mut world = FlockWorld::new(config).expect("world");
        let id = world.iter_handles().next().expect("handle");
        world.agents_mut().columns_mut().velocities_mut()[0] = Vec3::new(0.2, 0.0, 0.0);

        // Smoothing 0 keeps the stored orientation.
        let initial = world.sample_orientation(id, 0.0).expect("orientation");
        assert!(initial.abs_diff_eq(Quat::IDENTITY, 1e-6));

        // Repeated sampling without a tick keeps converging on the target.
        let target = look_rotation(Vec3::new(0.2, 0.0, 0.0)).expect("target");
        let first = world.sample_orientation(id, 0.1).expect("orientation");
        let second = world.sample_orientation(id, 0.1).expect("orientation");
        assert!(second.angle_between(target) < first.angle_between(target));

        // A full-strength sample snaps onto the target.
        let snapped = world.sample_orientation(id, 1.0).expect("orientation");
        assert!(snapped.abs_diff_eq(target, 1e-5) || snapped.abs_diff_eq(-target, 1e-5));

        // Zero velocity keeps the previous orientation.
        world.agents_mut().columns_mut().velocities_mut()[0] = Vec3::ZERO;
        let held = world.sample_orientation(id, 0.5).expect("orientation");
        assert!(held.abs_diff_eq(snapped, 1e-6) || held.abs_diff_eq(-snapped, 1e-6));
    }

    #[test]
    fn boundary_resize_keeps_agent_state() {
        let config = FlockConfig {
            agent_count: 8,
            rng_seed: Some(21),
            ..FlockConfig::default()
        };
        let mut world = FlockWorld::new(config).expect("world");
        world.step(1.0 / 60.0);
        let before: Vec<Vec3> = world.agents().columns().positions().to_vec();
        world
            .set_boundary(BoundaryVolume::new(4.0, 4.0, 4.0))
            .expect("resize");
        assert_eq!(world.agents().columns().positions(), before.as_slice());
        assert_eq!(world.config().boundary, BoundaryVolume::new(4.0, 4.0, 4.0));
        assert!(world
            .set_boundary(BoundaryVolume::new(-1.0, 4.0, 4.0))
            .is_err());
    }
}

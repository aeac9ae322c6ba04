/*!
Locomotion core: player state and the fixed-step integrator.

One [`LocomotionCore`] owns the player, the geometry registry, and the pending
command slots. Each `step()` runs one tick:

1. consume the command slots (last writer wins per slot)
2. follow the kinematic platform the player stood on last tick
3. apply slide/teleport/jump
4. integrate gravity (bounded by the max-drop guard)
5. probe for ground
6. apply the floating ground force when close enough to a surface
7. advance the position by the velocity
8. depenetrate the capsule
9. emit a position update when anything is still in motion

The core is synchronous and deterministic; the worker loop drives it at the
configured frequency and owns all I/O.
*/

use nalgebra as na;

use crate::{
    collision::{depenetrate, ground_distance, ground_probe},
    config::Config,
    registry::Registry,
    settings::REST_VELOCITY_SQ,
    trajectory::{ArcRequest, parabolic_cast},
    types::{EnvironmentHandle, SurfaceHit, Vec3},
};

/// Vertical motion phase of the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JumpPhase {
    /// Supported by walkable ground.
    Grounded,
    /// Rising after a jump; grounding is suppressed until the apex.
    Ascending,
    /// Airborne and descending.
    Falling,
}

/// Per-tick displacement below which a grounded, input-free player counts as
/// at rest and stops emitting updates (meters).
const REST_DISPLACEMENT: f32 = 5.0e-4;

/// The authoritative player pose emitted after a tick.
#[derive(Clone, Copy, Debug)]
pub struct PositionUpdate {
    pub position: Vec3,
    pub grounded: bool,
}

/// Pending commands for the next tick. Within one tick window the last slide,
/// last teleport, and any jump win; everything else is overwritten.
#[derive(Clone, Copy, Debug, Default)]
struct CommandSlots {
    slide: Option<Vec3>,
    teleport: Option<Vec3>,
    jump: bool,
}

/// Player state owned by the core.
#[derive(Clone, Copy, Debug)]
struct PlayerState {
    position: Vec3,
    velocity: Vec3,
    grounded: bool,
    grounded_env: Option<EnvironmentHandle>,
    phase: JumpPhase,
    jump_cooldown: f32,
    /// Y at the moment support was lost; drives the max-drop guard.
    fall_origin: Option<f32>,
    /// Desired planar velocity from the most recent slide command.
    slide_velocity: Vec3,
    /// True when the last tick emitted an update.
    updating: bool,
    /// Accumulated simulation time (seconds).
    clock: f64,
}

impl PlayerState {
    fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::zeros(),
            grounded: false,
            grounded_env: None,
            phase: JumpPhase::Falling,
            jump_cooldown: 0.0,
            fall_origin: Some(position.y),
            slide_velocity: Vec3::zeros(),
            updating: false,
            clock: 0.0,
        }
    }
}

/// The locomotion engine's deterministic heart.
pub struct LocomotionCore {
    pub config: Config,
    pub registry: Registry,
    player: Option<PlayerState>,
    slots: CommandSlots,
}

impl LocomotionCore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Registry::new(),
            player: None,
            slots: CommandSlots::default(),
        }
    }

    /// Place the player; the first tick after this will probe and settle.
    /// Repeated init re-places the player and clears pending commands.
    pub fn init(&mut self, position: Vec3) {
        if !is_finite(position) {
            log::debug!("dropping init with non-finite position");
            return;
        }
        self.player = Some(PlayerState::new(position));
        self.slots = CommandSlots::default();
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.player.is_some()
    }

    /// Current player position, if initialized.
    pub fn position(&self) -> Option<Vec3> {
        self.player.as_ref().map(|p| p.position)
    }

    /// Current player velocity, if initialized.
    pub fn velocity(&self) -> Option<Vec3> {
        self.player.as_ref().map(|p| p.velocity)
    }

    pub fn grounded(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.grounded)
    }

    /// Whether the last tick emitted an update (the player was in motion,
    /// airborne, or otherwise not at rest).
    pub fn updating(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.updating)
    }

    /// Accumulated simulation time in seconds.
    pub fn clock(&self) -> f64 {
        self.player.as_ref().map_or(0.0, |p| p.clock)
    }

    /// Request a planar slide velocity; the vertical component is ignored and
    /// replaced by integrator output. Persists until the next slide command.
    pub fn slide(&mut self, velocity: Vec3) {
        if !is_finite(velocity) {
            log::debug!("dropping slide command with non-finite velocity");
            return;
        }
        self.slots.slide = Some(velocity);
    }

    /// Request an instant move to `target`, clearing all motion.
    pub fn teleport(&mut self, target: Vec3) {
        if !is_finite(target) {
            log::debug!("dropping teleport command with non-finite target");
            return;
        }
        self.slots.teleport = Some(target);
    }

    /// Request a jump; honored next tick only when grounded with no cooldown.
    pub fn jump(&mut self) {
        self.slots.jump = true;
    }

    /// Cast a teleport aiming arc. Does not touch player or registry state.
    pub fn parabolic_raycast(&self, origin: Vec3, velocity: Vec3) -> Option<SurfaceHit> {
        parabolic_cast(
            &self.registry,
            &ArcRequest {
                origin,
                velocity,
                gravity: self.config.ray_gravity,
            },
        )
    }

    /// Run one fixed-step tick. Returns the update to emit, if any.
    pub fn step(&mut self) -> Option<PositionUpdate> {
        let slots = std::mem::take(&mut self.slots);
        let config = self.config;
        let dt = config.dt();

        let player = self.player.as_mut()?;
        if !is_finite(player.position) || !is_finite(player.velocity) {
            // A corrupted pose must not propagate; skip the whole tick.
            log::warn!("skipping tick: player state is not finite");
            return None;
        }

        let was_grounded = player.grounded;
        let tick_start = player.position;

        player.jump_cooldown = (player.jump_cooldown - dt).max(0.0);

        // Carry the player along with the platform it stood on last tick.
        if let Some(handle) = player.grounded_env
            && let Some(delta) = self.registry.kinematic_delta(handle)
        {
            player.position = delta
                .transform_point(&na::Point3::from(player.position))
                .coords;
        }

        let mut teleported = false;
        if let Some(target) = slots.teleport {
            player.position = target;
            player.velocity = Vec3::zeros();
            player.grounded = false;
            player.grounded_env = None;
            player.phase = JumpPhase::Falling;
            player.fall_origin = Some(target.y);
            teleported = true;
        }
        if let Some(slide) = slots.slide {
            player.slide_velocity = Vec3::new(slide.x, 0.0, slide.z);
        }
        if slots.jump && player.grounded && player.jump_cooldown <= 0.0 {
            player.velocity.y = config.jump_speed();
            player.jump_cooldown = config.jump_cooldown;
            player.phase = JumpPhase::Ascending;
            player.grounded = false;
            player.grounded_env = None;
            player.fall_origin = Some(player.position.y);
        }

        // Planar control: full authority on the ground, reduced in the air.
        let control = if player.grounded { 1.0 } else { config.air_control };
        player.velocity.x = player.slide_velocity.x * control;
        player.velocity.z = player.slide_velocity.z * control;

        // Gravity, bounded by the max-drop guard: once a fall exceeds the
        // configured distance, accumulation stops until support returns.
        let fallen = player.fall_origin.map_or(0.0, |origin| origin - player.position.y);
        if player.grounded || fallen <= config.max_drop_distance {
            player.velocity.y += config.gravity * dt;
        }
        player.velocity.y = player.velocity.y.max(-config.terminal_fall_speed);
        clamp_magnitude(&mut player.velocity, config.max_speed);

        if player.phase == JumpPhase::Ascending && player.velocity.y <= 0.0 {
            player.phase = JumpPhase::Falling;
        }

        let hit = ground_probe(&self.registry, &config, player.position);
        let distance = ground_distance(player.position, hit.as_ref());

        if distance < config.grounding_threshold() && player.phase != JumpPhase::Ascending {
            if player.phase == JumpPhase::Falling {
                // Landing kills the remaining fall speed.
                player.velocity.y = 0.0;
            }
            player.phase = JumpPhase::Grounded;
            player.grounded = true;
            player.grounded_env = hit.map(|h| h.environment);
            player.fall_origin = None;

            // Spring-damper hovering the player at float_height over the
            // contact, clamped and mass-scaled for stability over bumps.
            let error = config.float_height - distance;
            let force = (config.float_spring * error - config.float_damping * player.velocity.y)
                .clamp(-config.max_float_force, config.max_float_force);
            player.velocity.y += force / config.player_mass.max(1.0e-3) * dt;
        } else {
            player.grounded = false;
            player.grounded_env = None;
            if player.phase == JumpPhase::Grounded {
                player.phase = JumpPhase::Falling;
            }
            if player.fall_origin.is_none() {
                player.fall_origin = Some(player.position.y);
            }
        }

        player.position += player.velocity * dt;

        depenetrate(
            &self.registry,
            &config,
            &mut player.position,
            &mut player.velocity,
        );

        player.clock += dt as f64;
        self.registry.rotate_kinematic_history();

        let has_input = player.slide_velocity.norm_squared() > REST_VELOCITY_SQ;
        let moving = player.velocity.norm_squared() > REST_VELOCITY_SQ
            || (player.position - tick_start).norm_squared()
                > REST_DISPLACEMENT * REST_DISPLACEMENT;
        let updating = teleported
            || has_input
            || !player.grounded
            || player.jump_cooldown > 0.0
            || moving
            || player.grounded != was_grounded;
        player.updating = updating;

        updating.then(|| PositionUpdate {
            position: player.position,
            grounded: player.grounded,
        })
    }
}

#[inline]
fn is_finite(v: Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Clamp a vector's magnitude without changing its direction.
fn clamp_magnitude(v: &mut Vec3, max: f32) {
    let len_sq = v.norm_squared();
    if len_sq > max * max {
        *v *= max / len_sq.sqrt();
    }
}

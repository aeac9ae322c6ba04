//! Gameplay configuration knobs and their defaults.
//!
//! Every value here is a per-instance knob, not a constant: hosts override any
//! subset at startup or at runtime through a partial [`ConfigUpdate`].
//! Arc gravity (`ray_gravity`) and gameplay gravity (`gravity`) are deliberately
//! independent; neither is derived from the other.

use crate::types::CapsuleSpec;

/// Engine configuration. Units: meters, seconds, radians.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Ticks per second of the locomotion integrator.
    pub update_frequency: f32,
    /// Gravity applied to parabolic raycast arcs (negative, along -Y).
    pub ray_gravity: f32,
    /// Gravity applied to player integration (negative, along -Y).
    pub gravity: f32,
    /// Apex height of a jump (meters); the impulse is derived as sqrt(2*|g|*h).
    pub jump_height: f32,
    /// Minimum time between two accepted jumps (seconds).
    pub jump_cooldown: f32,
    /// Bound on unassisted falls (meters). Once exceeded, gravity stops
    /// accumulating until the player is grounded again.
    pub max_drop_distance: f32,
    /// Player capsule radius (meters).
    pub capsule_radius: f32,
    /// Player capsule half-height (cylinder half-length, meters).
    pub capsule_half_height: f32,
    /// Target hover distance between the player position and the ground.
    pub float_height: f32,
    /// Threshold angle between a contact normal and +Y separating floors from
    /// walls (radians).
    pub slope_max_angle: f32,
    /// Planar input multiplier while airborne.
    ///
    /// Convention:
    /// - 1.0 = full ground control in air (arcade / very floaty)
    /// - 0.0 = no air control
    pub air_control: f32,
    /// Maximum downward speed (positive magnitude, m/s).
    pub terminal_fall_speed: f32,
    /// Overall velocity magnitude clamp (m/s).
    pub max_speed: f32,
    /// Player mass dividing the clamped float force.
    pub player_mass: f32,
    /// Spring gain of the floating ground force (N/m with unit mass).
    pub float_spring: f32,
    /// Damping gain of the floating ground force.
    pub float_damping: f32,
    /// Magnitude clamp on the floating ground force.
    pub max_float_force: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_frequency: 60.0,
            ray_gravity: -0.4,
            gravity: -9.8,
            jump_height: 1.5,
            jump_cooldown: 0.1,
            max_drop_distance: 5.0,
            capsule_radius: 0.25,
            capsule_half_height: 0.9,
            float_height: 0.5,
            slope_max_angle: 50.0_f32.to_radians(),
            air_control: 0.4,
            terminal_fall_speed: 55.0,
            max_speed: 80.0,
            player_mass: 1.0,
            float_spring: 400.0,
            float_damping: 40.0,
            max_float_force: 600.0,
        }
    }
}

impl Config {
    /// Fixed integration step (seconds).
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.update_frequency.max(1.0)
    }

    /// Distance from the player position to the ground below which the player
    /// counts as grounded and the floating force engages.
    #[inline]
    pub fn grounding_threshold(&self) -> f32 {
        self.float_height + self.capsule_radius + 0.15
    }

    /// Upward speed imparted by a jump, from the configured apex height.
    #[inline]
    pub fn jump_speed(&self) -> f32 {
        (2.0 * self.gravity.abs() * self.jump_height.max(0.0)).sqrt()
    }

    /// The player's collision capsule.
    #[inline]
    pub fn capsule(&self) -> CapsuleSpec {
        CapsuleSpec {
            radius: self.capsule_radius,
            half_height: self.capsule_half_height,
        }
    }

    /// Cosine of the floor/wall threshold angle.
    #[inline]
    pub fn slope_max_cos(&self) -> f32 {
        self.slope_max_angle.cos()
    }
}

/// A partial configuration overlay: only the provided fields are written.
///
/// This is the payload of the host's `Config` message; fields it leaves as
/// `None` keep their current value.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigUpdate {
    pub update_frequency: Option<f32>,
    pub ray_gravity: Option<f32>,
    pub gravity: Option<f32>,
    pub jump_height: Option<f32>,
    pub jump_cooldown: Option<f32>,
    pub max_drop_distance: Option<f32>,
    pub capsule_radius: Option<f32>,
    pub capsule_half_height: Option<f32>,
    pub float_height: Option<f32>,
    pub slope_max_angle: Option<f32>,
    pub air_control: Option<f32>,
}

impl ConfigUpdate {
    /// Overlay the provided fields onto `config`. Non-finite values are
    /// ignored field by field so a bad knob cannot corrupt integration.
    pub fn apply(&self, config: &mut Config) {
        fn overlay(slot: &mut f32, value: Option<f32>) {
            if let Some(v) = value
                && v.is_finite()
            {
                *slot = v;
            }
        }
        overlay(&mut config.update_frequency, self.update_frequency);
        overlay(&mut config.ray_gravity, self.ray_gravity);
        overlay(&mut config.gravity, self.gravity);
        overlay(&mut config.jump_height, self.jump_height);
        overlay(&mut config.jump_cooldown, self.jump_cooldown);
        overlay(&mut config.max_drop_distance, self.max_drop_distance);
        overlay(&mut config.capsule_radius, self.capsule_radius);
        overlay(&mut config.capsule_half_height, self.capsule_half_height);
        overlay(&mut config.float_height, self.float_height);
        overlay(&mut config.slope_max_angle, self.slope_max_angle);
        overlay(&mut config.air_control, self.air_control);
    }
}

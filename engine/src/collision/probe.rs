//! Capsule ground probe.
//!
//! A short downward segment cast from the capsule's lower sphere center,
//! returning the closest surface across all environments. The locomotion core
//! runs this every tick to derive `ground_distance` and the grounded flag.

use crate::{
    config::Config,
    registry::Registry,
    types::{SurfaceHit, Vec3},
};

/// Cast the per-tick ground probe for a player standing at `position`.
///
/// The probe starts at the lower sphere center (`position + radius * up`) and
/// extends `radius + grounding_threshold` straight down, so a player hovering
/// at `float_height` still sees the surface underneath.
pub fn ground_probe(registry: &Registry, config: &Config, position: Vec3) -> Option<SurfaceHit> {
    let origin = config.capsule().lower_sphere_center(position);
    let length = config.capsule_radius + config.grounding_threshold();
    registry.closest_segment_hit(origin, origin - Vec3::new(0.0, length, 0.0))
}

/// Distance from the player position down to a probe hit, `+inf` with no hit.
#[inline]
pub fn ground_distance(position: Vec3, hit: Option<&SurfaceHit>) -> f32 {
    hit.map_or(f32::INFINITY, |h| position.y - h.point.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnvironmentKind;

    const IDENTITY: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];

    fn floor_registry() -> Registry {
        let mut registry = Registry::new();
        let positions = [
            -10.0, 0.0, -10.0, //
            10.0, 0.0, -10.0, //
            10.0, 0.0, 10.0, //
            -10.0, 0.0, 10.0,
        ];
        let indices = [0, 2, 1, 0, 3, 2];
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        registry
    }

    #[test]
    fn probe_finds_floor_within_threshold() {
        let registry = floor_registry();
        let config = Config::default();
        let position = Vec3::new(0.0, config.float_height, 0.0);

        let hit = ground_probe(&registry, &config, position).expect("floor below");
        assert!(hit.point.y.abs() < 1.0e-4);
        assert!(hit.normal.y > 0.99);
        let distance = ground_distance(position, Some(&hit));
        assert!((distance - config.float_height).abs() < 1.0e-3);
        assert!(distance < config.grounding_threshold());
    }

    #[test]
    fn probe_misses_when_too_high() {
        let registry = floor_registry();
        let config = Config::default();
        let position = Vec3::new(0.0, 5.0, 0.0);

        let hit = ground_probe(&registry, &config, position);
        assert!(hit.is_none());
        assert!(ground_distance(position, hit.as_ref()).is_infinite());
    }
}

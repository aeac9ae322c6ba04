//! Parabolic raycast: ballistic arc sampling for teleport aiming.
//!
//! The arc from an origin and launch velocity under a configurable gravity is
//! cut into straight segments, prefiltered against environment bounds by one
//! AABB spanning the origin, the apex, and the arc's end point, then tested
//! segment by segment for the earliest triangle hit. Given the same registry
//! and inputs the result is deterministic.

use parry3d::bounding_volume::Aabb;

use crate::{
    registry::Registry,
    settings::{DIST_EPS, TRAJECTORY_MAX_DROP, TRAJECTORY_SEGMENTS},
    types::{Point3, SurfaceHit, Vec3},
};

/// One parabolic raycast request.
#[derive(Clone, Copy, Debug)]
pub struct ArcRequest {
    /// Launch point (world space).
    pub origin: Vec3,
    /// Launch velocity; direction times initial speed.
    pub velocity: Vec3,
    /// Gravity applied along -Y (negative scalar).
    pub gravity: f32,
}

/// Point on the arc at time `t`.
#[inline]
fn position_at(req: &ArcRequest, t: f32) -> Vec3 {
    Vec3::new(
        req.origin.x + req.velocity.x * t,
        req.origin.y + req.velocity.y * t + 0.5 * req.gravity * t * t,
        req.origin.z + req.velocity.z * t,
    )
}

/// Time at which the unimpeded arc reaches `min_y`, if it ever does.
///
/// Solves `(1/2) g t^2 + v_y t + (y0 - min_y) = 0` for the positive root,
/// falling back to the linear solution when gravity is negligible.
fn end_time(req: &ArcRequest, min_y: f32) -> Option<f32> {
    let a = 0.5 * req.gravity;
    let b = req.velocity.y;
    let c = req.origin.y - min_y;

    if a.abs() <= DIST_EPS {
        // No gravity: the arc is a straight line.
        if b < -DIST_EPS {
            return Some(-c / b);
        }
        return None;
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b + sqrt_disc) / (2.0 * a);
    let t2 = (-b - sqrt_disc) / (2.0 * a);
    let t = t1.max(t2);
    (t > DIST_EPS).then_some(t)
}

/// Highest Y the arc reaches.
#[inline]
fn peak_y(req: &ArcRequest) -> f32 {
    if req.velocity.y > 0.0 && req.gravity.abs() > DIST_EPS {
        req.origin.y + req.velocity.y * req.velocity.y / (2.0 * req.gravity.abs())
    } else {
        req.origin.y
    }
}

/// Cast a parabolic ray against the registry.
///
/// Returns the earliest triangle hit along the arc, or `None` when the arc
/// clears all geometry before reaching its lower bound.
pub fn parabolic_cast(registry: &Registry, req: &ArcRequest) -> Option<SurfaceHit> {
    if !req.origin.iter().all(|v| v.is_finite())
        || !req.velocity.iter().all(|v| v.is_finite())
        || !req.gravity.is_finite()
    {
        return None;
    }
    if registry.is_empty() {
        return None;
    }

    // Lower bound of the sampled arc: just below the lowest environment, so
    // the arc always spans every surface it could land on.
    let min_y = registry
        .lowest_bound_y()
        .map(|y| y - 1.0)
        .unwrap_or(req.origin.y - TRAJECTORY_MAX_DROP)
        .min(req.origin.y - DIST_EPS);

    let t_end = end_time(req, min_y)?;
    let end = position_at(req, t_end);
    let peak = Vec3::new(req.origin.x, peak_y(req), req.origin.z);

    // Prefilter: one box spanning launch point, apex, and end point.
    let span = [
        Point3::from(req.origin),
        Point3::from(peak),
        Point3::from(end),
    ];
    let mut mins = span[0];
    let mut maxs = span[0];
    for p in &span[1..] {
        mins = Point3::new(mins.x.min(p.x), mins.y.min(p.y), mins.z.min(p.z));
        maxs = Point3::new(maxs.x.max(p.x), maxs.y.max(p.y), maxs.z.max(p.z));
    }
    let candidates = registry.environments_overlapping(&Aabb { mins, maxs });
    if candidates.is_empty() {
        return None;
    }

    // Walk the arc segment by segment; the first hit is the earliest in t.
    let dt = t_end / TRAJECTORY_SEGMENTS as f32;
    let mut start = req.origin;
    for i in 1..=TRAJECTORY_SEGMENTS {
        let end = position_at(req, dt * i as f32);
        if let Some(hit) =
            registry.closest_segment_hit_among(candidates.iter().copied(), start, end)
        {
            return Some(hit);
        }
        start = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnvironmentKind;
    use approx::assert_relative_eq;

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
    fn arc_lands_on_the_analytic_impact_point() {
        let registry = floor_registry();
        let req = ArcRequest {
            origin: Vec3::new(0.0, 2.0, 0.0),
            velocity: Vec3::new(2.0, 2.0, 0.0),
            gravity: -10.0,
        };

        let hit = parabolic_cast(&registry, &req).expect("arc must land on the floor");
        // y(t) = 2 + 2t - 5t^2 = 0  =>  t = (2 + sqrt(44)) / 10
        let t_impact = (2.0 + 44.0_f32.sqrt()) / 10.0;
        assert_relative_eq!(hit.point.x, 2.0 * t_impact, epsilon = 0.05);
        assert!(hit.point.y.abs() < 0.05);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn upward_arc_with_no_environment_misses() {
        let registry = Registry::new();
        let req = ArcRequest {
            origin: Vec3::new(0.0, 2.0, 0.0),
            velocity: Vec3::new(0.0, 3.0, 0.0),
            gravity: -0.4,
        };
        assert!(parabolic_cast(&registry, &req).is_none());
    }

    #[test]
    fn arc_over_distant_geometry_misses() {
        let mut registry = Registry::new();
        let positions = [
            -1.0, 0.0, -1.0, //
            1.0, 0.0, -1.0, //
            1.0, 0.0, 1.0, //
            -1.0, 0.0, 1.0,
        ];
        let indices = [0, 2, 1, 0, 3, 2];
        let mut far = IDENTITY;
        far[12] = 500.0;
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &far)
            .unwrap();

        let req = ArcRequest {
            origin: Vec3::new(0.0, 2.0, 0.0),
            velocity: Vec3::new(2.0, 2.0, 0.0),
            gravity: -10.0,
        };
        assert!(parabolic_cast(&registry, &req).is_none());
    }

    #[test]
    fn same_inputs_give_identical_hits() {
        let registry = floor_registry();
        let req = ArcRequest {
            origin: Vec3::new(0.3, 1.7, -0.2),
            velocity: Vec3::new(1.5, 2.5, 0.5),
            gravity: -9.8,
        };
        let a = parabolic_cast(&registry, &req).unwrap();
        let b = parabolic_cast(&registry, &req).unwrap();
        assert_eq!(a.point, b.point);
        assert_eq!(a.normal, b.normal);
        assert_eq!(a.fraction, b.fraction);
    }

    #[test]
    fn non_finite_requests_are_rejected() {
        let registry = floor_registry();
        let req = ArcRequest {
            origin: Vec3::new(f32::NAN, 2.0, 0.0),
            velocity: Vec3::new(2.0, 2.0, 0.0),
            gravity: -10.0,
        };
        assert!(parabolic_cast(&registry, &req).is_none());
    }
}

//! Capsule depenetration.
//!
//! Contacts are generated with parry's narrow phase between the world-space
//! player capsule and candidate triangles from the registry, classified as
//! floor, wall, or ceiling by the angle between the triangle normal and +Y,
//! then resolved deepest-first. The pose is updated after every correction,
//! and the whole gather/resolve cycle repeats for a bounded number of passes.

use std::cmp::Ordering;

use nalgebra as na;
use parry3d::{
    query,
    shape::{Capsule, Triangle},
};

use crate::{
    config::Config,
    registry::Registry,
    settings::{CONTACT_PREDICTION, DIST_EPS, RESOLVER_MAX_PASSES, TOUCH_EPS},
    types::{ContactClass, EnvironmentHandle, Iso, PenetrationContact, Vec3},
};

/// What the resolver did this tick.
#[derive(Clone, Copy, Debug)]
pub struct ResolveOutcome {
    /// Gather/resolve passes actually run.
    pub passes: u32,
    /// False when the pass limit ran out with contacts still penetrating.
    /// Leftover contacts are reported, not retried within the tick.
    pub converged: bool,
}

/// Classify a unit contact normal against the up axis.
#[inline]
pub fn classify(normal: Vec3, slope_max_cos: f32) -> ContactClass {
    if normal.y >= slope_max_cos {
        ContactClass::Floor
    } else if normal.y <= -slope_max_cos {
        ContactClass::Ceiling
    } else {
        ContactClass::Wall
    }
}

/// Push the capsule at `position` out of all penetrating triangles, adjusting
/// `velocity` so it no longer points into resolved surfaces.
pub fn depenetrate(
    registry: &Registry,
    config: &Config,
    position: &mut Vec3,
    velocity: &mut Vec3,
) -> ResolveOutcome {
    let mut contacts = Vec::new();
    let mut passes = 0;

    while passes < RESOLVER_MAX_PASSES {
        contacts.clear();
        gather_contacts(registry, config, *position, &mut contacts);
        if contacts.is_empty() {
            return ResolveOutcome {
                passes,
                converged: true,
            };
        }
        passes += 1;

        // Deepest corrections first; shallower contacts are re-evaluated
        // against the updated pose on the next pass.
        contacts.sort_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap_or(Ordering::Equal));
        for contact in &contacts {
            apply_correction(contact, position, velocity);
        }
    }

    contacts.clear();
    gather_contacts(registry, config, *position, &mut contacts);
    let converged = contacts.is_empty();
    if !converged {
        log::trace!(
            "depenetration left {} contact(s) after {} passes",
            contacts.len(),
            passes
        );
    }
    ResolveOutcome { passes, converged }
}

/// Collect penetrating capsule/triangle contacts in world space.
fn gather_contacts(
    registry: &Registry,
    config: &Config,
    position: Vec3,
    out: &mut Vec<PenetrationContact>,
) {
    let spec = config.capsule();
    let capsule = Capsule::new_y(spec.half_height, spec.radius);
    let center = spec.center(position);
    let capsule_iso: Iso = na::Isometry3::translation(center.x, center.y, center.z);
    let slope_max_cos = config.slope_max_cos();

    registry.visit_capsule_candidates(position, &spec, CONTACT_PREDICTION, |handle, tri| {
        if let Some(contact) =
            capsule_triangle_contact(&capsule_iso, &capsule, &tri, center, handle, slope_max_cos)
        {
            out.push(contact);
        }
    });
}

/// Narrow-phase contact between the capsule and one world-space triangle.
fn capsule_triangle_contact(
    capsule_iso: &Iso,
    capsule: &Capsule,
    tri: &Triangle,
    center: Vec3,
    handle: EnvironmentHandle,
    slope_max_cos: f32,
) -> Option<PenetrationContact> {
    let contact = query::contact(
        capsule_iso,
        capsule,
        &Iso::identity(),
        tri,
        CONTACT_PREDICTION,
    )
    .ok()??;
    if contact.dist >= -TOUCH_EPS {
        // Touching or separated; resting support is the float force's job.
        return None;
    }

    let mut normal = tri.normal()?.into_inner();
    // Orient the triangle normal from the surface toward the capsule center.
    if normal.dot(&(center - contact.point2.coords)) < 0.0 {
        normal = -normal;
    }

    Some(PenetrationContact {
        normal,
        depth: -contact.dist,
        class: classify(normal, slope_max_cos),
        environment: handle,
    })
}

/// Apply one contact's positional correction and velocity clamp.
fn apply_correction(contact: &PenetrationContact, position: &mut Vec3, velocity: &mut Vec3) {
    match contact.class {
        ContactClass::Floor => {
            // Vertical push-out; the divisor is bounded below by the slope
            // threshold cosine, so the correction stays finite.
            position.y += contact.depth / contact.normal.y.max(DIST_EPS);
            velocity.y = velocity.y.max(0.0);
        }
        ContactClass::Ceiling => {
            position.y -= contact.depth / (-contact.normal.y).max(DIST_EPS);
            velocity.y = velocity.y.min(0.0);
        }
        ContactClass::Wall => {
            let horizontal = Vec3::new(contact.normal.x, 0.0, contact.normal.z);
            let len = horizontal.norm();
            if len <= DIST_EPS {
                return;
            }
            let dir = horizontal / len;
            *position += dir * (contact.depth / len);
            // Slide: remove only the velocity component pointing into the wall.
            let into_wall = velocity.dot(&dir);
            if into_wall < 0.0 {
                *velocity -= dir * into_wall;
            }
        }
    }
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

    #[test]
    fn classification_thresholds() {
        let cos50 = 50.0_f32.to_radians().cos();
        assert_eq!(classify(Vec3::new(0.0, 1.0, 0.0), cos50), ContactClass::Floor);
        // 45 degree ramp is still a floor at a 50 degree threshold.
        let ramp = Vec3::new(0.707, 0.707, 0.0);
        assert_eq!(classify(ramp, cos50), ContactClass::Floor);
        assert_eq!(classify(Vec3::new(-1.0, 0.0, 0.0), cos50), ContactClass::Wall);
        // 60 degree surface is past the threshold.
        let steep = Vec3::new(60.0_f32.to_radians().sin(), 60.0_f32.to_radians().cos(), 0.0);
        assert_eq!(classify(steep, cos50), ContactClass::Wall);
        assert_eq!(classify(Vec3::new(0.0, -1.0, 0.0), cos50), ContactClass::Ceiling);
    }

    #[test]
    fn wall_contact_pushes_horizontally_and_slides_velocity() {
        let mut registry = Registry::new();
        // Vertical quad at x = 1 spanning y in [-2, 4], z in [-5, 5], normal -X.
        let positions = [
            1.0, -2.0, -5.0, //
            1.0, -2.0, 5.0, //
            1.0, 4.0, 5.0, //
            1.0, 4.0, -5.0,
        ];
        let indices = [0, 1, 2, 0, 2, 3];
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();

        let config = Config::default();
        // Capsule overlapping the wall by 5 cm.
        let mut position = Vec3::new(1.0 - config.capsule_radius + 0.05, 0.5, 0.0);
        let start_y = position.y;
        let mut velocity = Vec3::new(3.0, -1.0, 0.5);

        let outcome = depenetrate(&registry, &config, &mut position, &mut velocity);
        assert!(outcome.converged);
        assert!(position.x <= 1.0 - config.capsule_radius + 1.0e-3);
        // Wall resolution never touches the vertical axis.
        assert!((position.y - start_y).abs() < 1.0e-6);
        assert_eq!(velocity.y, -1.0);
        // The into-wall component is gone, the rest survives.
        assert!(velocity.x.abs() < 1.0e-4);
        assert_eq!(velocity.z, 0.5);
    }

    #[test]
    fn floor_contact_pushes_up_and_zeroes_downward_velocity() {
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

        let config = Config::default();
        // Capsule bottom sunk 10 cm into the floor.
        let mut position = Vec3::new(0.0, -0.1, 0.0);
        let mut velocity = Vec3::new(1.0, -3.0, 0.0);

        let outcome = depenetrate(&registry, &config, &mut position, &mut velocity);
        assert!(outcome.converged);
        assert!(position.y >= -1.0e-3);
        assert_eq!(velocity.y, 0.0);
        assert_eq!(velocity.x, 1.0);
    }

    #[test]
    fn no_contacts_is_a_clean_converged_pass() {
        let registry = Registry::new();
        let config = Config::default();
        let mut position = Vec3::new(0.0, 1.0, 0.0);
        let mut velocity = Vec3::zeros();
        let outcome = depenetrate(&registry, &config, &mut position, &mut velocity);
        assert!(outcome.converged);
        assert_eq!(outcome.passes, 0);
        assert_eq!(position, Vec3::new(0.0, 1.0, 0.0));
    }
}

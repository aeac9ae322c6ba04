/*!
Plain data carried between the engine submodules; no logic lives here.

The geometry registry (environments, handles, world transforms), the collision
queries (ground probe, depenetration contacts), the trajectory sampler, and
the locomotion core all speak in terms of these types.
*/

use nalgebra as na;

/// Shorthand for the nalgebra types used throughout the engine.
pub type Vec3 = na::Vector3<f32>;
pub type Point3 = na::Point3<f32>;
pub type Mat4 = na::Matrix4<f32>;
pub type Iso = na::Isometry3<f32>;

/// Host-chosen identifier for an environment. Opaque to the engine; validated
/// only for uniqueness at insertion.
pub type EnvironmentHandle = u32;

/// Whether an environment's transform is fixed or animated by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentKind {
    /// Transform never changes after insertion.
    Static,
    /// Transform is re-posed by the host, typically once per frame.
    /// Vertices never change; only the world matrix does.
    Kinematic,
}

/// Capsule specification for the player's collision body.
///
/// The capsule stands upright: a cylinder of length `2 * half_height` along
/// +Y, capped by hemispheres of `radius`. End to end it therefore spans
/// `2 * (half_height + radius)` meters.
#[derive(Clone, Copy, Debug)]
pub struct CapsuleSpec {
    pub radius: f32,
    pub half_height: f32,
}

impl CapsuleSpec {
    /// Capsule center for a player standing at `position`.
    ///
    /// `position` is the rig origin at the capsule's bottom tip, so the center
    /// sits one radius plus one half-height above it.
    #[inline]
    pub fn center(&self, position: Vec3) -> Vec3 {
        position + Vec3::new(0.0, self.radius + self.half_height, 0.0)
    }

    /// Center of the capsule's lower sphere for a player standing at `position`.
    #[inline]
    pub fn lower_sphere_center(&self, position: Vec3) -> Vec3 {
        position + Vec3::new(0.0, self.radius, 0.0)
    }
}

/// A single triangle hit returned by segment and probe queries.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceHit {
    /// World-space hit point.
    pub point: Vec3,
    /// World-space surface normal of the hit triangle, oriented to oppose the
    /// query direction.
    pub normal: Vec3,
    /// Position of the hit along the tested segment, as a 0..1 parameter.
    pub fraction: f32,
    /// The environment owning the hit triangle.
    pub environment: EnvironmentHandle,
}

/// Contact surface classification relative to the up axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactClass {
    /// Walkable support; resolved vertically.
    Floor,
    /// Steep surface; resolved horizontally.
    Wall,
    /// Overhead surface; resolved downward.
    Ceiling,
}

/// A penetrating capsule/triangle contact produced by the depenetration pass.
#[derive(Clone, Copy, Debug)]
pub struct PenetrationContact {
    /// World-space triangle normal, oriented from the surface toward the
    /// capsule center.
    pub normal: Vec3,
    /// Penetration depth along `normal` (meters, positive).
    pub depth: f32,
    /// Floor/wall/ceiling classification of this contact.
    pub class: ContactClass,
    /// The environment owning the contacted triangle.
    pub environment: EnvironmentHandle,
}

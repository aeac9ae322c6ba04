/*!
Numeric tolerances and fixed limits shared by the registry, the depenetration
resolver, and the trajectory sampler.

Gameplay-facing knobs (gravity, capsule size, jump height, ...) are runtime
configuration and live in [`crate::config::Config`]. What belongs here are the
hard-coded epsilons and iteration caps that the algorithms assume: they are
expressed in world units (meters), not machine epsilon, because the queries
compare real distances and a `f32::EPSILON`-scale threshold would drown in
accumulated transform error.
*/

/// Length below which a world-space distance or segment is treated as zero
/// (meters). Guards divisions by near-zero directions and degenerate queries.
pub const DIST_EPS: f32 = 1.0e-6;

/// "Touching" contact epsilon (meters). Penetrations shallower than this are
/// treated as resting contact and left to the floating ground force.
pub const TOUCH_EPS: f32 = 1.0e-4;

/// Triangles with less area than this are skipped at BVH build time (m^2).
pub const DEGENERATE_AREA_EPS: f32 = 1.0e-8;

/// Tolerance used to validate that a world matrix is affine
/// (bottom row equal to `0 0 0 1`).
pub const AFFINE_ROW_EPS: f32 = 1.0e-4;

/// Maximum number of depenetration passes per tick.
/// Contacts still penetrating after this many passes are reported, not retried.
pub const RESOLVER_MAX_PASSES: u32 = 4;

/// Contact prediction margin handed to the narrow phase (meters).
/// Keeps grazing contacts visible without inflating push distances.
pub const CONTACT_PREDICTION: f32 = 0.01;

/// Number of straight segments approximating a parabolic raycast arc.
pub const TRAJECTORY_SEGMENTS: u32 = 30;

/// Fallback vertical extent for a parabolic raycast when no environment bounds
/// the arc from below (meters below the ray origin).
pub const TRAJECTORY_MAX_DROP: f32 = 100.0;

/// Minimum squared velocity considered "still moving" when deciding whether a
/// tick needs to emit a position update (m^2/s^2).
pub const REST_VELOCITY_SQ: f32 = 1.0e-6;

//! Deterministic VR locomotion: geometry registry, collision queries,
//! parabolic raycasts, and the fixed-step player integrator.
//!
//! This crate contains no threads and no I/O, so it runs identically wherever
//! it is driven from and can be instantiated any number of times (one core per
//! test, one per engine instance). The `worker` crate wraps it in a
//! message-driven loop for hosts.
//!
//! The supported integration surface is [`LocomotionCore`] (commands +
//! `step()`), its `registry` field (environment lifecycle), and
//! [`trajectory::parabolic_cast`]. The collision submodules are exported for
//! tests and tooling only.

pub mod collision;
pub mod config;
pub mod core;
pub mod registry;
pub mod settings;
pub mod trajectory;
pub mod types;

pub use config::{Config, ConfigUpdate};
pub use crate::core::{LocomotionCore, PositionUpdate};
pub use registry::{Registry, RegistryError};
pub use trajectory::{ArcRequest, parabolic_cast};
pub use types::{
    CapsuleSpec, ContactClass, EnvironmentHandle, EnvironmentKind, PenetrationContact, SurfaceHit,
    Vec3,
};

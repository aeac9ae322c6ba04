/*!
Collision queries against the geometry registry, one submodule per query:

- probe:   downward ground probe from the capsule's lower sphere center
- resolve: capsule depenetration with floor/wall/ceiling classification

Both operate on world-space data delivered by [`crate::registry::Registry`];
neither owns any geometry.
*/

pub mod probe;
pub mod resolve;

pub use probe::{ground_distance, ground_probe};
pub use resolve::{ResolveOutcome, depenetrate};

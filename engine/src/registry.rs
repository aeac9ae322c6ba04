/*!
Geometry registry: handle-keyed triangle environments with per-environment BVHs.

Each environment is a triangle soup copied in at insertion, a BVH built once
over the local-space triangles, and a world transform that may change every
frame for kinematic platforms. Queries map their volume into each environment's
local space through the cached inverse, traverse that environment's BVH for
candidates, then run the narrow phase against the candidate triangles mapped to
world space. Hit points and normals are always delivered in world space.

The BVH is never rebuilt after insertion; re-posing a moving platform only
replaces the matrix pair (and, at tick boundaries, rotates the kinematic
history used for platform-follow deltas).
*/

use std::collections::BTreeMap;

use parry3d::{
    bounding_volume::Aabb,
    partitioning::{Bvh, BvhBuildStrategy},
    query::{Ray, RayCast},
    shape::Triangle,
};
use thiserror::Error;

use crate::{
    settings::{AFFINE_ROW_EPS, DEGENERATE_AREA_EPS, DIST_EPS},
    types::{CapsuleSpec, EnvironmentHandle, EnvironmentKind, Iso, Mat4, Point3, SurfaceHit, Vec3},
};

/// Why an environment insertion or transform update was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("environment handle {0} is already registered")]
    DuplicateHandle(EnvironmentHandle),
    #[error("environment handle {0} is not registered")]
    UnknownHandle(EnvironmentHandle),
    #[error("world matrix is not an invertible affine transform")]
    InvalidMatrix,
    #[error("triangle geometry is empty, truncated, or indexes out of bounds")]
    InvalidGeometry,
}

/// One registered environment: owned geometry, immutable BVH, current pose.
pub struct Environment {
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
    bvh: Bvh,
    kind: EnvironmentKind,
    world_from_local: Mat4,
    local_from_world: Mat4,
    /// World transform at the previous tick boundary. Only meaningful for
    /// kinematic environments; static ones keep their insertion pose here.
    prev_world_from_local: Mat4,
    local_bounds: Aabb,
}

impl Environment {
    #[inline]
    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The i-th triangle mapped into world space.
    #[inline]
    fn triangle_world(&self, i: usize) -> Triangle {
        let [a, b, c] = self.triangles[i];
        Triangle::new(
            self.world_from_local.transform_point(&self.vertices[a as usize]),
            self.world_from_local.transform_point(&self.vertices[b as usize]),
            self.world_from_local.transform_point(&self.vertices[c as usize]),
        )
    }

    /// Current world-space bounds of this environment.
    #[inline]
    pub fn world_bounds(&self) -> Aabb {
        transform_aabb(&self.world_from_local, &self.local_bounds)
    }

    /// Earliest triangle hit along the world-space segment `start..end`.
    fn segment_hit(&self, start: Vec3, end: Vec3) -> Option<(f32, Triangle)> {
        let local_a = self.local_from_world.transform_point(&Point3::from(start));
        let local_b = self.local_from_world.transform_point(&Point3::from(end));
        let query = aabb_inflate(&aabb_of_points(&[local_a, local_b]), DIST_EPS);

        let dir = end - start;
        let ray = Ray::new(Point3::from(start), dir);

        let mut best: Option<(f32, Triangle)> = None;
        for leaf in self.bvh.intersect_aabb(&query) {
            let tri = self.triangle_world(leaf as usize);
            if let Some(hit) = tri.cast_ray_and_get_normal(&Iso::identity(), &ray, 1.0, false) {
                if best
                    .as_ref()
                    .is_none_or(|(toi, _)| hit.time_of_impact < *toi)
                {
                    best = Some((hit.time_of_impact, tri));
                }
            }
        }
        best
    }

    /// Visit every triangle whose local bounds overlap the world-space `query`
    /// box, mapped into world space.
    fn visit_overlapping(&self, query: &Aabb, mut visit: impl FnMut(Triangle)) {
        let local = transform_aabb(&self.local_from_world, query);
        for leaf in self.bvh.intersect_aabb(&local) {
            visit(self.triangle_world(leaf as usize));
        }
    }
}

/// Handle-keyed environment store.
///
/// A `BTreeMap` keeps iteration order deterministic, so closest-hit tie-breaks
/// are stable across runs with identical inputs.
#[derive(Default)]
pub struct Registry {
    environments: BTreeMap<EnvironmentHandle, Environment>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.environments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    #[inline]
    pub fn contains(&self, handle: EnvironmentHandle) -> bool {
        self.environments.contains_key(&handle)
    }

    #[inline]
    pub fn get(&self, handle: EnvironmentHandle) -> Option<&Environment> {
        self.environments.get(&handle)
    }

    /// Insert a new environment from a flat vertex array (3 floats per vertex)
    /// and an optional index array (3 indices per triangle). Without indices,
    /// consecutive vertex triples form triangles.
    ///
    /// The geometry is copied; the caller's buffers are never referenced again.
    /// On success the BVH is built and the environment is immediately queryable.
    pub fn add(
        &mut self,
        handle: EnvironmentHandle,
        positions: &[f32],
        indices: Option<&[u32]>,
        kind: EnvironmentKind,
        matrix: &[f32; 16],
    ) -> Result<(), RegistryError> {
        if self.environments.contains_key(&handle) {
            return Err(RegistryError::DuplicateHandle(handle));
        }
        let (world_from_local, local_from_world) = parse_matrix(matrix)?;

        if positions.len() < 9 || positions.len() % 3 != 0 {
            return Err(RegistryError::InvalidGeometry);
        }
        if positions.iter().any(|v| !v.is_finite()) {
            return Err(RegistryError::InvalidGeometry);
        }
        let vertices: Vec<Point3> = positions
            .chunks_exact(3)
            .map(|v| Point3::new(v[0], v[1], v[2]))
            .collect();

        let candidate_triangles: Vec<[u32; 3]> = match indices {
            Some(indices) => {
                if indices.is_empty() || indices.len() % 3 != 0 {
                    return Err(RegistryError::InvalidGeometry);
                }
                if indices.iter().any(|&i| i as usize >= vertices.len()) {
                    return Err(RegistryError::InvalidGeometry);
                }
                indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect()
            }
            None => {
                if vertices.len() % 3 != 0 {
                    return Err(RegistryError::InvalidGeometry);
                }
                (0..vertices.len() as u32)
                    .step_by(3)
                    .map(|i| [i, i + 1, i + 2])
                    .collect()
            }
        };

        // Degenerate (zero-area) triangles never produce meaningful contacts;
        // drop them up front so leaf index i maps to triangles[i].
        let mut triangles = Vec::with_capacity(candidate_triangles.len());
        let mut leaf_aabbs = Vec::with_capacity(candidate_triangles.len());
        for tri in candidate_triangles {
            let [a, b, c] = tri;
            let shape = Triangle::new(
                vertices[a as usize],
                vertices[b as usize],
                vertices[c as usize],
            );
            if shape.area() <= DEGENERATE_AREA_EPS {
                continue;
            }
            triangles.push(tri);
            leaf_aabbs.push(aabb_of_points(&[shape.a, shape.b, shape.c]));
        }
        if triangles.is_empty() {
            return Err(RegistryError::InvalidGeometry);
        }

        let local_bounds = leaf_aabbs
            .iter()
            .skip(1)
            .fold(leaf_aabbs[0], |acc, aabb| aabb_union(&acc, aabb));
        let bvh = Bvh::from_leaves(BvhBuildStrategy::Binned, &leaf_aabbs);

        self.environments.insert(
            handle,
            Environment {
                vertices,
                triangles,
                bvh,
                kind,
                world_from_local,
                local_from_world,
                prev_world_from_local: world_from_local,
                local_bounds,
            },
        );
        Ok(())
    }

    /// Remove an environment. Returns whether it was present; removing an
    /// absent handle is a no-op.
    pub fn remove(&mut self, handle: EnvironmentHandle) -> bool {
        self.environments.remove(&handle).is_some()
    }

    /// Replace an environment's world transform.
    ///
    /// A rejected matrix leaves the previous transform in place. On success
    /// the cached inverse is recomputed, so queries issued afterwards are
    /// always consistent with the new pose.
    pub fn update_transform(
        &mut self,
        handle: EnvironmentHandle,
        matrix: &[f32; 16],
    ) -> Result<(), RegistryError> {
        let (world_from_local, local_from_world) = parse_matrix(matrix)?;
        let env = self
            .environments
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;
        env.world_from_local = world_from_local;
        env.local_from_world = local_from_world;
        Ok(())
    }

    /// Rotate every kinematic environment's previous-transform slot to its
    /// current transform. Called by the core at each tick boundary, so several
    /// host updates inside one tick window coalesce into a single delta.
    pub fn rotate_kinematic_history(&mut self) {
        for env in self.environments.values_mut() {
            if env.kind == EnvironmentKind::Kinematic {
                env.prev_world_from_local = env.world_from_local;
            }
        }
    }

    /// The affine delta `current * previous⁻¹` covering the most recent tick,
    /// for kinematic environments only.
    pub fn kinematic_delta(&self, handle: EnvironmentHandle) -> Option<Mat4> {
        let env = self.environments.get(&handle)?;
        if env.kind != EnvironmentKind::Kinematic {
            return None;
        }
        let prev_inverse = env.prev_world_from_local.try_inverse()?;
        Some(env.world_from_local * prev_inverse)
    }

    /// Earliest triangle hit along a world-space segment across all
    /// environments. The returned normal opposes the segment direction.
    pub fn closest_segment_hit(&self, start: Vec3, end: Vec3) -> Option<SurfaceHit> {
        self.closest_segment_hit_among(self.environments.keys().copied(), start, end)
    }

    /// Same as [`Self::closest_segment_hit`], restricted to `handles`.
    pub fn closest_segment_hit_among(
        &self,
        handles: impl IntoIterator<Item = EnvironmentHandle>,
        start: Vec3,
        end: Vec3,
    ) -> Option<SurfaceHit> {
        let dir = end - start;
        if dir.norm_squared() <= DIST_EPS * DIST_EPS {
            return None;
        }

        let mut best: Option<SurfaceHit> = None;
        for handle in handles {
            let Some(env) = self.environments.get(&handle) else {
                continue;
            };
            if let Some((fraction, tri)) = env.segment_hit(start, end) {
                if best.as_ref().is_none_or(|b| fraction < b.fraction) {
                    let mut normal = tri
                        .normal()
                        .map(|n| n.into_inner())
                        .unwrap_or_else(Vec3::zeros);
                    // Orient the surface normal against the query direction.
                    if normal.dot(&dir) > 0.0 {
                        normal = -normal;
                    }
                    best = Some(SurfaceHit {
                        point: start + dir * fraction,
                        normal,
                        fraction,
                        environment: handle,
                    });
                }
            }
        }
        best
    }

    /// Visit all world-space triangles whose bounds overlap the player capsule
    /// (inflated by `margin`), across all environments.
    pub fn visit_capsule_candidates(
        &self,
        position: Vec3,
        capsule: &CapsuleSpec,
        margin: f32,
        mut visit: impl FnMut(EnvironmentHandle, Triangle),
    ) {
        let center = capsule.center(position);
        let horizontal = capsule.radius + margin;
        let vertical = capsule.half_height + capsule.radius + margin;
        let query = Aabb {
            mins: Point3::new(center.x - horizontal, center.y - vertical, center.z - horizontal),
            maxs: Point3::new(center.x + horizontal, center.y + vertical, center.z + horizontal),
        };
        for (&handle, env) in &self.environments {
            if !aabb_intersects(&env.world_bounds(), &query) {
                continue;
            }
            env.visit_overlapping(&query, |tri| visit(handle, tri));
        }
    }

    /// Handles of all environments whose world bounds overlap `query`,
    /// in ascending handle order.
    pub fn environments_overlapping(&self, query: &Aabb) -> Vec<EnvironmentHandle> {
        self.environments
            .iter()
            .filter(|(_, env)| aabb_intersects(&env.world_bounds(), query))
            .map(|(&handle, _)| handle)
            .collect()
    }

    /// Lowest world-space Y over all environment bounds, if any environment
    /// is registered.
    pub fn lowest_bound_y(&self) -> Option<f32> {
        self.environments
            .values()
            .map(|env| env.world_bounds().mins.y)
            .reduce(f32::min)
    }
}

/// Parse and validate a column-major world matrix; returns it with its inverse.
fn parse_matrix(matrix: &[f32; 16]) -> Result<(Mat4, Mat4), RegistryError> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(RegistryError::InvalidMatrix);
    }
    let m = Mat4::from_column_slice(matrix);
    // Affine: bottom row must be 0 0 0 1.
    if m[(3, 0)].abs() > AFFINE_ROW_EPS
        || m[(3, 1)].abs() > AFFINE_ROW_EPS
        || m[(3, 2)].abs() > AFFINE_ROW_EPS
        || (m[(3, 3)] - 1.0).abs() > AFFINE_ROW_EPS
    {
        return Err(RegistryError::InvalidMatrix);
    }
    let inverse = m.try_inverse().ok_or(RegistryError::InvalidMatrix)?;
    Ok((m, inverse))
}

/// Compute the AABB of a point set.
fn aabb_of_points(points: &[Point3]) -> Aabb {
    let mut mins = points[0];
    let mut maxs = points[0];
    for p in &points[1..] {
        mins = Point3::new(mins.x.min(p.x), mins.y.min(p.y), mins.z.min(p.z));
        maxs = Point3::new(maxs.x.max(p.x), maxs.y.max(p.y), maxs.z.max(p.z));
    }
    Aabb { mins, maxs }
}

/// Map an AABB through an affine matrix by transforming its corners.
fn transform_aabb(m: &Mat4, aabb: &Aabb) -> Aabb {
    let mut corners = [Point3::origin(); 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let p = Point3::new(
            if i & 1 == 0 { aabb.mins.x } else { aabb.maxs.x },
            if i & 2 == 0 { aabb.mins.y } else { aabb.maxs.y },
            if i & 4 == 0 { aabb.mins.z } else { aabb.maxs.z },
        );
        *corner = m.transform_point(&p);
    }
    aabb_of_points(&corners)
}

/// Smallest AABB enclosing both inputs.
fn aabb_union(a: &Aabb, b: &Aabb) -> Aabb {
    Aabb {
        mins: Point3::new(
            a.mins.x.min(b.mins.x),
            a.mins.y.min(b.mins.y),
            a.mins.z.min(b.mins.z),
        ),
        maxs: Point3::new(
            a.maxs.x.max(b.maxs.x),
            a.maxs.y.max(b.maxs.y),
            a.maxs.z.max(b.maxs.z),
        ),
    }
}

/// Grow an AABB by `margin` in every direction.
fn aabb_inflate(a: &Aabb, margin: f32) -> Aabb {
    let delta = Vec3::new(margin, margin, margin);
    Aabb {
        mins: a.mins - delta,
        maxs: a.maxs + delta,
    }
}

/// Whether two AABBs overlap on every axis.
fn aabb_intersects(a: &Aabb, b: &Aabb) -> bool {
    !(a.maxs.x < b.mins.x
        || a.mins.x > b.maxs.x
        || a.maxs.y < b.mins.y
        || a.mins.y > b.maxs.y
        || a.maxs.z < b.mins.z
        || a.mins.z > b.maxs.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];

    fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
        let mut m = IDENTITY;
        m[12] = x;
        m[13] = y;
        m[14] = z;
        m
    }

    /// Two triangles covering [-10,10] x [-10,10] at y = 0, facing +Y.
    fn floor_quad() -> (Vec<f32>, Vec<u32>) {
        let positions = vec![
            -10.0, 0.0, -10.0, //
            10.0, 0.0, -10.0, //
            10.0, 0.0, 10.0, //
            -10.0, 0.0, 10.0,
        ];
        let indices = vec![0, 2, 1, 0, 3, 2];
        (positions, indices)
    }

    #[test]
    fn add_then_query_sees_the_environment() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(7, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        assert!(registry.contains(7));

        let hit = registry
            .closest_segment_hit(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -2.0, 0.0))
            .expect("segment through the floor must hit");
        assert_eq!(hit.environment, 7);
        assert!(hit.point.y.abs() < 1.0e-4);
        assert!(hit.normal.y > 0.99);
        assert!((hit.fraction - 0.5).abs() < 1.0e-4);
    }

    #[test]
    fn add_remove_roundtrip_restores_empty_registry() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        assert!(registry.remove(1));
        assert!(registry.is_empty());
        assert!(
            registry
                .closest_segment_hit(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -2.0, 0.0))
                .is_none()
        );
        // Removing again is a silent no-op.
        assert!(!registry.remove(1));
    }

    #[test]
    fn duplicate_handle_is_rejected_and_prior_environment_remains() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        let err = registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateHandle(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let mut registry = Registry::new();
        // Fewer than 3 vertices.
        assert_eq!(
            registry.add(1, &[0.0, 0.0, 0.0], None, EnvironmentKind::Static, &IDENTITY),
            Err(RegistryError::InvalidGeometry)
        );
        // Index out of bounds.
        let (positions, _) = floor_quad();
        assert_eq!(
            registry.add(1, &positions, Some(&[0, 1, 9]), EnvironmentKind::Static, &IDENTITY),
            Err(RegistryError::InvalidGeometry)
        );
        // All triangles degenerate.
        let line = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        assert_eq!(
            registry.add(1, &line, None, EnvironmentKind::Static, &IDENTITY),
            Err(RegistryError::InvalidGeometry)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn singular_and_non_affine_matrices_are_rejected() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();

        let mut singular = IDENTITY;
        singular[0] = 0.0; // zero X scale
        assert_eq!(
            registry.add(1, &positions, Some(&indices), EnvironmentKind::Static, &singular),
            Err(RegistryError::InvalidMatrix)
        );

        let mut projective = IDENTITY;
        projective[3] = 0.5; // bottom row no longer 0 0 0 1
        assert_eq!(
            registry.add(1, &positions, Some(&indices), EnvironmentKind::Static, &projective),
            Err(RegistryError::InvalidMatrix)
        );
    }

    #[test]
    fn rejected_transform_update_retains_previous_pose() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Kinematic, &IDENTITY)
            .unwrap();

        let mut singular = IDENTITY;
        singular[5] = 0.0;
        assert_eq!(
            registry.update_transform(1, &singular),
            Err(RegistryError::InvalidMatrix)
        );
        // Still queryable at the original pose.
        assert!(
            registry
                .closest_segment_hit(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, 0.0))
                .is_some()
        );

        assert_eq!(
            registry.update_transform(99, &IDENTITY),
            Err(RegistryError::UnknownHandle(99))
        );
    }

    #[test]
    fn transform_moves_query_space() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Kinematic, &IDENTITY)
            .unwrap();
        registry.update_transform(1, &translation(0.0, 3.0, 0.0)).unwrap();

        let hit = registry
            .closest_segment_hit(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 1.0, 0.0))
            .expect("raised floor must be hit");
        assert!((hit.point.y - 3.0).abs() < 1.0e-4);
    }

    #[test]
    fn kinematic_delta_tracks_tick_boundaries() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Kinematic, &IDENTITY)
            .unwrap();

        // Two host updates inside one tick window coalesce.
        registry.update_transform(1, &translation(0.005, 0.0, 0.0)).unwrap();
        registry.update_transform(1, &translation(0.01, 0.0, 0.0)).unwrap();
        let delta = registry.kinematic_delta(1).unwrap();
        let moved = delta.transform_point(&Point3::new(0.0, 0.5, 0.0));
        assert!((moved.x - 0.01).abs() < 1.0e-6);

        registry.rotate_kinematic_history();
        let delta = registry.kinematic_delta(1).unwrap();
        let moved = delta.transform_point(&Point3::new(0.0, 0.5, 0.0));
        assert!(moved.x.abs() < 1.0e-6);
    }

    #[test]
    fn static_environments_have_no_kinematic_delta() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        assert!(registry.kinematic_delta(1).is_none());
    }

    #[test]
    fn unindexed_soup_builds_sequential_triangles() {
        let mut registry = Registry::new();
        // One CCW triangle at y = 0.
        let soup = vec![
            -1.0, 0.0, -1.0, //
            1.0, 0.0, 1.0, //
            1.0, 0.0, -1.0,
        ];
        registry.add(3, &soup, None, EnvironmentKind::Static, &IDENTITY).unwrap();
        assert_eq!(registry.get(3).unwrap().triangle_count(), 1);
        let hit = registry
            .closest_segment_hit(Vec3::new(0.5, 1.0, -0.5), Vec3::new(0.5, -1.0, -0.5))
            .expect("triangle must be hit");
        assert!(hit.point.y.abs() < 1.0e-4);
    }

    #[test]
    fn prefilter_only_reports_overlapping_environments() {
        let mut registry = Registry::new();
        let (positions, indices) = floor_quad();
        registry
            .add(1, &positions, Some(&indices), EnvironmentKind::Static, &IDENTITY)
            .unwrap();
        registry
            .add(
                2,
                &positions,
                Some(&indices),
                EnvironmentKind::Static,
                &translation(100.0, 0.0, 0.0),
            )
            .unwrap();

        let query = Aabb {
            mins: Point3::new(-1.0, -1.0, -1.0),
            maxs: Point3::new(1.0, 1.0, 1.0),
        };
        assert_eq!(registry.environments_overlapping(&query), vec![1]);
        assert_eq!(registry.lowest_bound_y(), Some(0.0));
    }
}

//! Ray-mesh intersection for the paint target.
//!
//! This module provides ray-triangle intersection using the Moller-Trumbore algorithm,
//! the [`RaycastTarget`] abstraction the brush collides against, and a mesh-backed
//! [`TargetSurface`] with a world transform and an optional UV channel.

use glam::{Mat4, Vec2, Vec3};

use crate::constants::RAY_EPSILON;
use crate::types::{Aabb, Ray, SurfaceHit};

/// Result of a ray-triangle intersection test
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    /// Distance along the ray to the intersection point
    pub t: f32,
    /// Barycentric coordinate u (weight for vertex 1)
    pub u: f32,
    /// Barycentric coordinate v (weight for vertex 2)
    pub v: f32,
}

/// Moller-Trumbore ray-triangle intersection algorithm.
///
/// Returns the hit distance and barycentric coordinates if the ray intersects
/// the triangle. Both faces are hit.
///
/// # Arguments
/// * `ray_origin` - Origin point of the ray
/// * `ray_dir` - Direction of the ray (should be normalized for consistent t values)
/// * `v0`, `v1`, `v2` - Triangle vertices in counter-clockwise order
pub fn ray_triangle_intersection(
    ray_origin: Vec3,
    ray_dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pvec = ray_dir.cross(edge2);
    let det = edge1.dot(pvec);

    // Ray parallel to the triangle plane
    if det.abs() < RAY_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray_origin - v0;

    // Edges are inclusive within epsilon so rays along a shared diagonal still hit
    let u = tvec.dot(pvec) * inv_det;
    if !(-RAY_EPSILON..=1.0 + RAY_EPSILON).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray_dir.dot(qvec) * inv_det;
    if v < -RAY_EPSILON || u + v > 1.0 + RAY_EPSILON {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;

    // Only accept hits in front of the ray
    if t < RAY_EPSILON {
        return None;
    }

    Some(TriangleHit { t, u, v })
}

/// Interpolate a Vec3 attribute using barycentric coordinates.
pub fn interpolate_vec3(v0: Vec3, v1: Vec3, v2: Vec3, u: f32, v: f32) -> Vec3 {
    let w = 1.0 - u - v;
    v0 * w + v1 * u + v2 * v
}

/// Interpolate a Vec2 attribute (like UVs) using barycentric coordinates.
pub fn interpolate_vec2(v0: Vec2, v1: Vec2, v2: Vec2, u: f32, v: f32) -> Vec2 {
    let w = 1.0 - u - v;
    v0 * w + v1 * u + v2 * v
}

/// Anything the brush can raycast against.
///
/// The bristle collision pass and the input mapper only need closest-hit
/// queries and the surface's world bounds (for UV estimation).
pub trait RaycastTarget {
    /// Closest hit along `ray` no farther than `max_distance`
    fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<SurfaceHit>;

    /// World-space bounding box of the surface
    fn bounds(&self) -> Aabb;

    /// UV for a hit, falling back to bounding-box projection when the surface has no UVs
    fn resolve_uv(&self, hit: &SurfaceHit) -> Vec2 {
        hit.uv
            .unwrap_or_else(|| estimate_uv(hit.position, hit.normal, &self.bounds()))
    }
}

/// Estimate a UV for a point on a surface without a UV channel.
///
/// The point is projected onto the bounding box face most aligned with the
/// surface normal: the axis the normal points along is dropped and the
/// remaining two are normalized into [0, 1] over the box extent.
pub fn estimate_uv(position: Vec3, normal: Vec3, bounds: &Aabb) -> Vec2 {
    let size = bounds.size();
    let rel = position - bounds.min;
    let n = normal.abs();

    let (a, b, extent_a, extent_b) = if n.z >= n.x && n.z >= n.y {
        (rel.x, rel.y, size.x, size.y)
    } else if n.y >= n.x {
        (rel.x, rel.z, size.x, size.z)
    } else {
        (rel.z, rel.y, size.z, size.y)
    };

    let norm = |value: f32, extent: f32| {
        if extent > RAY_EPSILON {
            (value / extent).clamp(0.0, 1.0)
        } else {
            0.5
        }
    };

    // V grows downward in texture space
    Vec2::new(norm(a, extent_a), 1.0 - norm(b, extent_b))
}

/// Mesh data extracted for raycasting.
///
/// This struct holds the raw local-space geometry needed for ray intersection.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Triangle indices (3 per triangle)
    pub indices: Vec<u32>,
    /// Vertex normals (same length as positions)
    pub normals: Vec<Vec3>,
    /// Vertex UVs (same length as positions, or empty if no UVs)
    pub uvs: Vec<Vec2>,
}

impl SurfaceMesh {
    /// Axis-aligned rectangle in the XY plane facing +Z, centered at the origin.
    ///
    /// UV (0, 0) is the top-left corner, (1, 1) the bottom-right.
    pub fn quad(width: f32, height: f32) -> Self {
        let hw = width * 0.5;
        let hh = height * 0.5;
        Self {
            positions: vec![
                Vec3::new(-hw, hh, 0.0),
                Vec3::new(hw, hh, 0.0),
                Vec3::new(hw, -hh, 0.0),
                Vec3::new(-hw, -hh, 0.0),
            ],
            indices: vec![0, 3, 2, 0, 2, 1],
            normals: vec![Vec3::Z; 4],
            uvs: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
        }
    }

    /// Drop the UV channel (surfaces that rely on bounding-box UV estimation)
    pub fn without_uvs(mut self) -> Self {
        self.uvs.clear();
        self
    }

    /// Get the number of triangles in the mesh
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the vertex indices for a triangle
    pub fn triangle_indices(&self, tri_index: usize) -> (u32, u32, u32) {
        let base = tri_index * 3;
        (
            self.indices[base],
            self.indices[base + 1],
            self.indices[base + 2],
        )
    }

    /// Get the vertex positions for a triangle
    pub fn triangle_positions(&self, tri_index: usize) -> (Vec3, Vec3, Vec3) {
        let (i0, i1, i2) = self.triangle_indices(tri_index);
        (
            self.positions[i0 as usize],
            self.positions[i1 as usize],
            self.positions[i2 as usize],
        )
    }

    fn has_uvs(&self) -> bool {
        self.uvs.len() == self.positions.len() && !self.uvs.is_empty()
    }
}

/// Cast a ray against mesh data and return the closest hit (mesh local space).
///
/// Brute force over all triangles; the painted surfaces are small meshes.
pub fn raycast_mesh(
    ray_origin: Vec3,
    ray_dir: Vec3,
    mesh: &SurfaceMesh,
) -> Option<SurfaceHit> {
    let mut closest_hit: Option<(TriangleHit, u32)> = None;

    for tri_idx in 0..mesh.triangle_count() {
        let (v0, v1, v2) = mesh.triangle_positions(tri_idx);

        if let Some(hit) = ray_triangle_intersection(ray_origin, ray_dir, v0, v1, v2) {
            let dominated = match &closest_hit {
                Some((prev, _)) => hit.t >= prev.t,
                None => false,
            };
            if !dominated {
                closest_hit = Some((hit, tri_idx as u32));
            }
        }
    }

    closest_hit.map(|(hit, face_id)| {
        let (i0, i1, i2) = mesh.triangle_indices(face_id as usize);
        let (v0, v1, v2) = mesh.triangle_positions(face_id as usize);

        let normal = if mesh.normals.len() == mesh.positions.len() {
            let n0 = mesh.normals[i0 as usize];
            let n1 = mesh.normals[i1 as usize];
            let n2 = mesh.normals[i2 as usize];
            interpolate_vec3(n0, n1, n2, hit.u, hit.v)
        } else {
            (v1 - v0).cross(v2 - v0)
        }
        .try_normalize()
        .unwrap_or(Vec3::Z);

        let uv = if mesh.has_uvs() {
            let uv0 = mesh.uvs[i0 as usize];
            let uv1 = mesh.uvs[i1 as usize];
            let uv2 = mesh.uvs[i2 as usize];
            Some(interpolate_vec2(uv0, uv1, uv2, hit.u, hit.v))
        } else {
            None
        };

        SurfaceHit {
            position: ray_origin + ray_dir * hit.t,
            normal,
            uv,
            distance: hit.t,
            face_id,
        }
    })
}

/// A paintable mesh placed in the world.
#[derive(Debug, Clone)]
pub struct TargetSurface {
    mesh: SurfaceMesh,
    transform: Mat4,
    inverse: Mat4,
    bounds: Aabb,
}

impl TargetSurface {
    /// Create a target from local-space mesh data and its world transform
    pub fn new(mesh: SurfaceMesh, transform: Mat4) -> Self {
        let inverse = transform.inverse();
        let bounds = Aabb::from_points(mesh.positions.iter().map(|p| transform.transform_point3(*p)));
        Self {
            mesh,
            transform,
            inverse,
            bounds,
        }
    }

    /// Replace the world transform (e.g. the finger moved)
    pub fn set_transform(&mut self, transform: Mat4) {
        *self = Self::new(std::mem::take(&mut self.mesh), transform);
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }
}

impl RaycastTarget for TargetSurface {
    fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<SurfaceHit> {
        let local_origin = self.inverse.transform_point3(ray.origin);
        let local_dir = self.inverse.transform_vector3(ray.direction);
        // Normalized local direction keeps barycentric math stable under scale
        let local_dir = local_dir.try_normalize()?;

        let local = raycast_mesh(local_origin, local_dir, &self.mesh)?;
        let position = self.transform.transform_point3(local.position);
        let distance = (position - ray.origin).length();
        if distance > max_distance {
            return None;
        }

        let normal = self
            .inverse
            .transpose()
            .transform_vector3(local.normal)
            .try_normalize()
            .unwrap_or(Vec3::Z);

        Some(SurfaceHit {
            position,
            normal,
            distance,
            ..local
        })
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }
}

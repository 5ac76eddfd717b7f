use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A world-space ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Z),
        }
    }

    /// Point at distance `t` along the ray
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box containing all points; a degenerate box at the origin for no points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        };
        iter.fold(
            Self {
                min: first,
                max: first,
            },
            |acc, p| Self {
                min: acc.min.min(p),
                max: acc.max.max(p),
            },
        )
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Result of a ray hitting the target surface (world space)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// World-space hit position
    pub position: Vec3,
    /// World-space unit surface normal
    pub normal: Vec3,
    /// Interpolated texture coordinate, `None` when the mesh has no UV channel
    pub uv: Option<Vec2>,
    /// Distance from the ray origin
    pub distance: f32,
    /// Triangle index that was hit
    pub face_id: u32,
}

/// Where the brush head sits this frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushPose {
    /// World position of the brush head (bristle bases)
    pub position: Vec3,
    /// Approach direction: the surface normal facing the viewer
    pub normal: Vec3,
    /// Pressure in [0, 1]
    pub pressure: f32,
    /// True only while the pose is locked onto the surface
    pub is_valid: bool,
    /// Surface UV under the pointer (resolved, including bounding-box fallback)
    pub uv: Option<Vec2>,
}

impl Default for BrushPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Z,
            pressure: 0.0,
            is_valid: false,
            uv: None,
        }
    }
}

impl BrushPose {
    /// Rotation taking head-local space (+Z toward the viewer, bristles along -Z)
    /// into world space
    pub fn orientation(&self) -> Quat {
        let normal = self.normal.try_normalize().unwrap_or(Vec3::Z);
        Quat::from_rotation_arc(Vec3::Z, normal)
    }
}

/// A bristle touching the surface during the latest physics step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    /// World-space contact position
    pub position: Vec3,
    /// Surface UV of the contact
    pub uv: Vec2,
    /// World-space surface normal
    pub normal: Vec3,
    /// Contact pressure in [floor, 1], derived from penetration depth
    pub pressure: f32,
    /// Index of the bristle that produced the contact
    pub bristle_index: usize,
}

/// Render transform for one bristle segment (unit cylinder along +Y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTransform {
    pub bristle_index: usize,
    pub segment_index: usize,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

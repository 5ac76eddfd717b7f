//! Per-segment render transforms for the host's instanced bristle mesh

use glam::{Quat, Vec3};
use polish_config::JOINTS_PER_BRISTLE;

use super::{Bristle, HeadFrame};
use crate::constants::{MIN_SEGMENT_LENGTH, TIP_TAPER};
use crate::types::SegmentTransform;

/// Rebuild world transforms for every segment.
///
/// Each transform maps a unit cylinder along +Y (centered at the origin) onto
/// the segment. Radius tapers from `base_radius` toward `TIP_TAPER * base_radius`.
/// Segments shorter than `MIN_SEGMENT_LENGTH` are skipped.
pub(crate) fn build_segment_transforms(
    bristles: &[Bristle],
    frame: &HeadFrame,
    base_radius: f32,
    out: &mut Vec<SegmentTransform>,
) {
    out.clear();
    let segments = (JOINTS_PER_BRISTLE - 1) as f32;

    for (bristle_index, bristle) in bristles.iter().enumerate() {
        for segment_index in 0..JOINTS_PER_BRISTLE - 1 {
            let start = frame.to_world(bristle.joints[segment_index]);
            let end = frame.to_world(bristle.joints[segment_index + 1]);
            let delta = end - start;
            let length = delta.length();
            if length < MIN_SEGMENT_LENGTH || !length.is_finite() {
                continue;
            }

            let t = (segment_index as f32 + 0.5) / segments;
            let radius = base_radius * (1.0 + (TIP_TAPER - 1.0) * t);

            out.push(SegmentTransform {
                bristle_index,
                segment_index,
                translation: (start + end) * 0.5,
                rotation: Quat::from_rotation_arc(Vec3::Y, delta / length),
                scale: Vec3::new(radius, length, radius),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bristle() -> Bristle {
        let joints = std::array::from_fn(|k| Vec3::NEG_Z * 0.04 * k as f32);
        Bristle {
            base: Vec3::ZERO,
            rest_direction: Vec3::NEG_Z,
            joints,
            previous: joints,
            stiffness: 0.3,
            damping: 0.1,
            friction: 0.5,
            axis_offset: 0.0,
        }
    }

    #[test]
    fn test_segment_transform_spans_segment() {
        let frame = HeadFrame::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        let mut out = Vec::new();
        build_segment_transforms(&[bristle()], &frame, 0.002, &mut out);

        assert_eq!(out.len(), 3);
        let first = out[0];
        assert!((first.translation - Vec3::new(1.0, 0.0, -0.02)).length() < 1e-6);
        assert!((first.scale.y - 0.04).abs() < 1e-6);
        assert!((first.rotation * Vec3::Y - Vec3::NEG_Z).length() < 1e-5);
        // Tapers toward the tip
        assert!(out[2].scale.x < out[0].scale.x);
    }

    #[test]
    fn test_degenerate_segment_skipped() {
        let mut collapsed = bristle();
        collapsed.joints[2] = collapsed.joints[1];
        let frame = HeadFrame::new(Vec3::ZERO, Quat::IDENTITY);
        let mut out = Vec::new();
        build_segment_transforms(&[collapsed], &frame, 0.002, &mut out);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.rotation.is_finite()));
        assert!(out.iter().all(|t| t.segment_index != 1));
    }
}

//! Verlet integration and segment constraints for one joint chain
//!
//! All functions operate in head-local space. Joint 0 is the anchor and is
//! never written.

use glam::Vec3;
use polish_config::JOINTS_PER_BRISTLE;

use super::Bristle;
use crate::constants::MIN_SEGMENT_LENGTH;

const TIP: usize = JOINTS_PER_BRISTLE - 1;

/// Verlet step for movable joints: damped implicit velocity plus gravity
pub(crate) fn integrate(bristle: &mut Bristle, gravity_step: Vec3) {
    let retain = 1.0 - bristle.damping.clamp(0.0, 1.0);
    for k in 1..JOINTS_PER_BRISTLE {
        let current = bristle.joints[k];
        let velocity = (current - bristle.previous[k]) * retain;
        bristle.previous[k] = current;
        bristle.joints[k] = current + velocity + gravity_step;
    }
}

/// Soft spring toward the rest shape, walking out from the base
pub(crate) fn apply_stiffness(bristle: &mut Bristle, segment: f32) {
    let stiffness = bristle.stiffness.clamp(0.0, 1.0);
    for k in 1..JOINTS_PER_BRISTLE {
        let target = bristle.joints[k - 1] + bristle.rest_direction * segment;
        bristle.joints[k] = bristle.joints[k].lerp(target, stiffness);
    }
}

/// Gauss-Seidel distance constraints with the base held fixed.
///
/// Interior pairs split the correction evenly. A final base-anchored pass
/// places every joint at exactly `segment` from its parent.
pub(crate) fn solve_distance_constraints(bristle: &mut Bristle, segment: f32, iterations: u32) {
    for _ in 0..iterations {
        for k in 0..TIP {
            let delta = bristle.joints[k + 1] - bristle.joints[k];
            let length = delta.length();
            if length < MIN_SEGMENT_LENGTH {
                continue;
            }
            let correction = delta * ((length - segment) / length);
            if k == 0 {
                bristle.joints[1] -= correction;
            } else {
                bristle.joints[k] += correction * 0.5;
                bristle.joints[k + 1] -= correction * 0.5;
            }
        }
    }
    follow_from_base(bristle, segment);
}

/// Two-pass FABRIK: pull the chain toward the (clamped) tip, then re-anchor at the base
pub(crate) fn solve_fabrik(bristle: &mut Bristle, segment: f32, iterations: u32) {
    for _ in 0..iterations {
        for k in (1..TIP).rev() {
            let direction = (bristle.joints[k] - bristle.joints[k + 1])
                .try_normalize()
                .unwrap_or(-bristle.rest_direction);
            bristle.joints[k] = bristle.joints[k + 1] + direction * segment;
        }
        follow_from_base(bristle, segment);
    }
}

/// Place each joint exactly one segment from its parent, keeping its direction
pub(crate) fn follow_from_base(bristle: &mut Bristle, segment: f32) {
    for k in 1..JOINTS_PER_BRISTLE {
        let direction = (bristle.joints[k] - bristle.joints[k - 1])
            .try_normalize()
            .unwrap_or(bristle.rest_direction);
        bristle.joints[k] = bristle.joints[k - 1] + direction * segment;
    }
}

/// Flatten the head under pressure.
///
/// Movable joints are pushed outward from the central axis in proportion to
/// the bristle's axis offset and pressed toward the surface, both growing
/// quadratically from base to tip. Current and previous positions move
/// together so no velocity is injected.
pub(crate) fn apply_splay(
    bristle: &mut Bristle,
    pressure: f32,
    segment: f32,
    splay_strength: f32,
    compression: f32,
) {
    let push = Vec3::new(bristle.axis_offset * splay_strength, 0.0, -compression) * segment * pressure;
    for k in 1..JOINTS_PER_BRISTLE {
        let t = k as f32 / TIP as f32;
        let offset = push * (t * t);
        bristle.joints[k] += offset;
        bristle.previous[k] += offset;
    }
}

/// Largest |segment length - rest length| over the chain
pub(crate) fn max_segment_error(bristle: &Bristle, segment: f32) -> f32 {
    bristle
        .joints
        .windows(2)
        .map(|pair| ((pair[1] - pair[0]).length() - segment).abs())
        .fold(0.0, f32::max)
}

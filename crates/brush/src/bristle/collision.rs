//! Bristle-surface contact resolution

use glam::Vec3;
use polish_config::{BristleConfig, JOINTS_PER_BRISTLE};

use super::{Bristle, HeadFrame};
use crate::constants::MIN_SEGMENT_LENGTH;
use crate::raycast::RaycastTarget;
use crate::types::{ContactPoint, Ray};

const TIP: usize = JOINTS_PER_BRISTLE - 1;

/// Raycast one bristle from base toward tip and resolve any contact.
///
/// On a hit within `bristle_length * contact_threshold` the tip is clamped to
/// the hit point (plus pushback along the normal), tangential velocity is
/// scaled by the bristle's friction and the normal component removed. Deeper
/// joints that ended up past the contact plane are pushed back out the same
/// way. Returns the contact with a penetration-derived pressure.
pub(crate) fn collide_bristle(
    bristle: &mut Bristle,
    index: usize,
    frame: &HeadFrame,
    target: &dyn RaycastTarget,
    config: &BristleConfig,
) -> Option<ContactPoint> {
    let base = frame.to_world(bristle.joints[0]);
    let tip = frame.to_world(bristle.joints[TIP]);
    let reach = tip - base;
    if reach.length() < MIN_SEGMENT_LENGTH {
        return None;
    }

    let ray = Ray::new(base, reach);
    let hit = target.raycast(&ray, config.bristle_length * config.contact_threshold)?;

    // Normal facing the brush head
    let world_normal = if hit.normal.dot(ray.direction) > 0.0 {
        -hit.normal
    } else {
        hit.normal
    };

    let normal = frame.direction_to_local(world_normal);
    let plane_point = frame.to_local(hit.position);
    let pushback = config.contact_pushback;
    let friction = bristle.friction.clamp(0.0, 1.0);

    let clamped_tip = plane_point + normal * pushback;
    resolve_joint(bristle, TIP, clamped_tip, normal, friction);

    for k in (1..TIP).rev() {
        let depth = (bristle.joints[k] - plane_point).dot(normal);
        if depth >= pushback {
            break;
        }
        let pushed = bristle.joints[k] + normal * (pushback - depth);
        resolve_joint(bristle, k, pushed, normal, friction);
    }

    let penetration = config.bristle_length - hit.distance;
    let pressure = (penetration / (config.bristle_length * config.pressure_depth))
        .clamp(config.pressure_floor, 1.0);

    Some(ContactPoint {
        position: hit.position,
        uv: target.resolve_uv(&hit),
        normal: world_normal,
        pressure,
        bristle_index: index,
    })
}

/// Move a joint to `position` and rebuild its previous position so the
/// remaining velocity is the friction-scaled tangential part.
fn resolve_joint(bristle: &mut Bristle, k: usize, position: Vec3, normal: Vec3, friction: f32) {
    let velocity = bristle.joints[k] - bristle.previous[k];
    let tangential = velocity - normal * velocity.dot(normal);
    bristle.joints[k] = position;
    bristle.previous[k] = position - tangential * (1.0 - friction);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::{SurfaceMesh, TargetSurface};
    use glam::{Mat4, Quat};

    fn floor() -> TargetSurface {
        TargetSurface::new(SurfaceMesh::quad(2.0, 2.0), Mat4::IDENTITY)
    }

    fn straight_bristle() -> (Bristle, BristleConfig) {
        let config = BristleConfig::default();
        let segment = config.segment_length();
        let base = Vec3::ZERO;
        let joints = std::array::from_fn(|k| base + Vec3::NEG_Z * segment * k as f32);
        let bristle = Bristle {
            base,
            rest_direction: Vec3::NEG_Z,
            joints,
            previous: joints,
            stiffness: 0.3,
            damping: 0.1,
            friction: 0.5,
            axis_offset: 0.0,
        };
        (bristle, config)
    }

    fn frame(height: f32) -> HeadFrame {
        HeadFrame::new(Vec3::new(0.0, 0.0, height), Quat::IDENTITY)
    }

    #[test]
    fn test_no_contact_above_threshold() {
        let (mut bristle, config) = straight_bristle();
        let contact = collide_bristle(&mut bristle, 0, &frame(0.5), &floor(), &config);
        assert!(contact.is_none());
    }

    #[test]
    fn test_tip_clamped_to_surface() {
        let (mut bristle, config) = straight_bristle();
        let frame = frame(0.08);
        let contact = collide_bristle(&mut bristle, 3, &frame, &floor(), &config).unwrap();

        assert_eq!(contact.bristle_index, 3);
        assert!(contact.position.z.abs() < 1e-5);
        let tip = frame.to_world(bristle.joints[TIP]);
        assert!((tip.z - config.contact_pushback).abs() < 1e-5);
        // Joint 2 sat at z = 0.0 in world space and is pushed out too
        let joint2 = frame.to_world(bristle.joints[2]);
        assert!(joint2.z >= config.contact_pushback - 1e-5);
        assert_eq!(bristle.joints[0], bristle.base);
    }

    #[test]
    fn test_contact_pressure_from_penetration() {
        let (mut shallow, config) = straight_bristle();
        let light = collide_bristle(&mut shallow, 0, &frame(0.115), &floor(), &config).unwrap();
        assert!((light.pressure - config.pressure_floor).abs() < 1e-6);

        let (mut deep, _) = straight_bristle();
        let firm = collide_bristle(&mut deep, 0, &frame(0.06), &floor(), &config).unwrap();
        assert_eq!(firm.pressure, 1.0);
    }

    #[test]
    fn test_friction_scales_tangential_velocity() {
        let (mut bristle, config) = straight_bristle();
        bristle.previous[TIP] = bristle.joints[TIP] - Vec3::new(0.01, 0.0, -0.02);
        collide_bristle(&mut bristle, 0, &frame(0.1), &floor(), &config).unwrap();

        let velocity = bristle.joints[TIP] - bristle.previous[TIP];
        assert!((velocity.x - 0.005).abs() < 1e-6);
        assert!(velocity.z.abs() < 1e-6);
    }
}

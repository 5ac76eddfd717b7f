//! Fan-shaped head layout

use glam::Vec3;
use polish_config::{BristleConfig, JOINTS_PER_BRISTLE};

use super::Bristle;

/// Lay bristles out on a rows x columns grid across a flat fan.
///
/// Columns span the head width and fan outward by up to `fan_angle`; rows
/// span the head depth. Bases sit on a curved profile so the center column
/// leads the edges by `tip_curve`. Per-bristle stiffness, damping and
/// friction blend from center values to edge values.
pub(crate) fn build_fan_layout(config: &BristleConfig) -> Vec<Bristle> {
    let rows = config.rows.max(1);
    let columns = config.columns.max(1);
    let segment = config.segment_length();
    let mut bristles = Vec::with_capacity((rows * columns) as usize);

    for row in 0..rows {
        let v = normalized_cell(row, rows);
        for column in 0..columns {
            let u = normalized_cell(column, columns);

            let base = Vec3::new(
                u * config.head_width * 0.5,
                v * config.head_depth * 0.5,
                -config.tip_curve * (1.0 - u * u),
            );
            let angle = u * config.fan_angle;
            let rest_direction = Vec3::new(angle.sin(), 0.0, -angle.cos());

            let edge = u.abs().max(v.abs());
            let joints: [Vec3; JOINTS_PER_BRISTLE] =
                std::array::from_fn(|k| base + rest_direction * segment * k as f32);

            bristles.push(Bristle {
                base,
                rest_direction,
                joints,
                previous: joints,
                stiffness: lerp(config.center_stiffness, config.edge_stiffness, edge),
                damping: lerp(config.center_damping, config.edge_damping, edge),
                friction: lerp(config.center_friction, config.edge_friction, edge),
                axis_offset: u,
            });
        }
    }

    bristles
}

/// Cell center mapped to (-1, 1); a single cell maps to 0
#[inline]
fn normalized_cell(index: u32, count: u32) -> f32 {
    ((index as f32 + 0.5) / count as f32) * 2.0 - 1.0
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_count_and_rest_shape() {
        let config = BristleConfig::default();
        let bristles = build_fan_layout(&config);
        assert_eq!(bristles.len(), 128);

        let segment = config.segment_length();
        for bristle in &bristles {
            assert_eq!(bristle.joints[0], bristle.base);
            for k in 1..JOINTS_PER_BRISTLE {
                let length = (bristle.joints[k] - bristle.joints[k - 1]).length();
                assert!((length - segment).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_center_bristles_lead_and_are_stiffer() {
        let config = BristleConfig {
            rows: 1,
            columns: 5,
            ..Default::default()
        };
        let bristles = build_fan_layout(&config);
        let center = &bristles[2];
        let edge = &bristles[0];

        assert_eq!(center.axis_offset, 0.0);
        assert!(center.base.z < edge.base.z);
        assert!(center.stiffness > edge.stiffness);
        assert!(center.damping > edge.damping);
        assert!(center.friction < edge.friction);
    }

    #[test]
    fn test_edge_bristles_fan_outward() {
        let config = BristleConfig::default();
        let bristles = build_fan_layout(&config);
        let left = &bristles[0];
        let right = &bristles[config.columns as usize - 1];

        assert!(left.rest_direction.x < 0.0);
        assert!(right.rest_direction.x > 0.0);
        assert!((left.rest_direction.length() - 1.0).abs() < 1e-6);
    }
}

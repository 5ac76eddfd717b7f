//! Multi-joint bristle physics
//!
//! Each bristle is a chain of `JOINTS_PER_BRISTLE` joints stored in
//! head-local space (+Z toward the viewer, bristles hanging along -Z). Joint 0
//! is the anchor and is never integrated, so the base stays glued to the head
//! however the pose moves.
//!
//! # Per-frame update
//!
//! 1. Inertia: movable joints are shifted against the head's motion
//! 2. Splay under pressure
//! 3. Fixed-timestep substeps (capped): Verlet, stiffness, distance
//!    constraints, collision, FABRIK re-projection of collided chains
//! 4. Render transform rebuild

mod collision;
mod layout;
mod physics;
mod render;

use glam::{Quat, Vec3};
use polish_config::{BristleConfig, JOINTS_PER_BRISTLE};
use tracing::{debug, warn};

use crate::constants::MAX_INERTIA_JUMP;
use crate::raycast::RaycastTarget;
use crate::types::{BrushPose, ContactPoint, SegmentTransform};

/// FABRIK passes run on a chain after its tip was clamped
const CONTACT_FABRIK_ITERATIONS: u32 = 2;

/// One bristle: an anchored joint chain with its own material response
#[derive(Debug, Clone, PartialEq)]
pub struct Bristle {
    /// Anchor point on the head (head-local)
    pub base: Vec3,
    /// Unit direction of the unloaded bristle (head-local)
    pub rest_direction: Vec3,
    /// Current joint positions (head-local), `joints[0] == base`
    pub joints: [Vec3; JOINTS_PER_BRISTLE],
    /// Joint positions at the previous substep (Verlet state)
    pub previous: [Vec3; JOINTS_PER_BRISTLE],
    /// Blend factor toward the rest shape per substep
    pub stiffness: f32,
    /// Fraction of velocity lost per substep
    pub damping: f32,
    /// Fraction of tangential velocity lost on contact
    pub friction: f32,
    /// Signed position across the fan in (-1, 1); 0 is the central axis
    pub axis_offset: f32,
}

impl Bristle {
    fn reset_to_rest(&mut self, segment: f32) {
        self.joints = std::array::from_fn(|k| self.base + self.rest_direction * segment * k as f32);
        self.previous = self.joints;
    }
}

/// Rigid transform from head-local to world space
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeadFrame {
    position: Vec3,
    rotation: Quat,
    inverse: Quat,
}

impl HeadFrame {
    pub(crate) fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            inverse: rotation.inverse(),
        }
    }

    fn from_pose(pose: &BrushPose) -> Self {
        Self::new(pose.position, pose.orientation())
    }

    #[inline]
    pub(crate) fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    #[inline]
    pub(crate) fn to_local(&self, world: Vec3) -> Vec3 {
        self.inverse * (world - self.position)
    }

    #[inline]
    pub(crate) fn direction_to_local(&self, world: Vec3) -> Vec3 {
        self.inverse * world
    }
}

/// Owns every bristle of the head, steps their physics and reports contacts
#[derive(Debug, Clone)]
pub struct BristleSystem {
    config: BristleConfig,
    bristles: Vec<Bristle>,
    contacts: Vec<ContactPoint>,
    transforms: Vec<SegmentTransform>,
    frame: HeadFrame,
    last_position: Option<Vec3>,
    accumulator: f32,
}

impl BristleSystem {
    /// Build the head. A non-positive or non-finite step (or a frame cap below
    /// it) is replaced by the default so `update` always terminates.
    pub fn new(config: BristleConfig) -> Self {
        let config = with_valid_timestep(config);
        let bristles = layout::build_fan_layout(&config);
        debug!(
            "BristleSystem::new: {} bristles ({}x{}), segment={:.4}",
            bristles.len(),
            config.rows,
            config.columns,
            config.segment_length()
        );

        let frame = HeadFrame::new(Vec3::ZERO, Quat::IDENTITY);
        let mut transforms = Vec::with_capacity(bristles.len() * (JOINTS_PER_BRISTLE - 1));
        render::build_segment_transforms(&bristles, &frame, config.bristle_radius, &mut transforms);

        Self {
            config,
            bristles,
            contacts: Vec::new(),
            transforms,
            frame,
            last_position: None,
            accumulator: 0.0,
        }
    }

    /// Advance the simulation by a frame of `dt` seconds.
    ///
    /// `dt` is capped at `max_frame_dt` and consumed in fixed steps; at most
    /// `max_substeps()` steps run and any leftover backlog beyond that is
    /// dropped. Collision only runs while the pose is valid. Returns the
    /// number of fixed steps executed.
    pub fn update(&mut self, dt: f32, pose: &BrushPose, target: &dyn RaycastTarget) -> usize {
        let segment = self.config.segment_length();
        self.frame = HeadFrame::from_pose(pose);

        self.apply_inertia(pose.position, segment);

        let pressure = if pose.pressure.is_finite() {
            pose.pressure.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if pressure > 0.0 {
            for bristle in &mut self.bristles {
                physics::apply_splay(
                    bristle,
                    pressure,
                    segment,
                    self.config.splay_strength,
                    self.config.compression,
                );
            }
        }

        if !pose.is_valid {
            self.contacts.clear();
        }

        let frame_dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_frame_dt)
        } else {
            0.0
        };
        self.accumulator += frame_dt;

        let fixed = self.config.fixed_timestep;
        let max_steps = self.config.max_substeps();
        let mut steps = 0;
        while self.accumulator >= fixed && steps < max_steps {
            self.step(fixed, pose.is_valid, target);
            self.accumulator -= fixed;
            steps += 1;
        }
        if self.accumulator >= fixed {
            debug!(
                "BristleSystem: dropping {:.4}s physics backlog",
                self.accumulator
            );
            self.accumulator = 0.0;
        }

        render::build_segment_transforms(
            &self.bristles,
            &self.frame,
            self.config.bristle_radius,
            &mut self.transforms,
        );

        steps
    }

    /// Move the head without dragging the free joints along with it.
    ///
    /// Rotation is not compensated; jumps longer than `MAX_INERTIA_JUMP`
    /// bristle lengths re-seat every bristle at rest.
    fn apply_inertia(&mut self, position: Vec3, segment: f32) {
        let Some(last) = self.last_position.replace(position) else {
            return;
        };

        let world_delta = position - last;
        if world_delta.length() > MAX_INERTIA_JUMP * self.config.bristle_length {
            debug!("BristleSystem: pose jumped {:.3}, re-seating bristles", world_delta.length());
            for bristle in &mut self.bristles {
                bristle.reset_to_rest(segment);
            }
            return;
        }

        let local_delta = self.frame.direction_to_local(world_delta);
        if local_delta == Vec3::ZERO {
            return;
        }
        for bristle in &mut self.bristles {
            for k in 1..JOINTS_PER_BRISTLE {
                bristle.joints[k] -= local_delta;
                bristle.previous[k] -= local_delta;
            }
        }
    }

    fn step(&mut self, h: f32, collide: bool, target: &dyn RaycastTarget) {
        let config = &self.config;
        let segment = config.segment_length();
        let gravity = self.frame.direction_to_local(Vec3::from_array(config.gravity)) * (h * h);

        self.contacts.clear();

        for (index, bristle) in self.bristles.iter_mut().enumerate() {
            physics::integrate(bristle, gravity);
            physics::apply_stiffness(bristle, segment);
            physics::solve_distance_constraints(bristle, segment, config.constraint_iterations);

            if !collide {
                continue;
            }
            if let Some(contact) =
                collision::collide_bristle(bristle, index, &self.frame, target, config)
            {
                physics::solve_fabrik(bristle, segment, CONTACT_FABRIK_ITERATIONS);
                self.contacts.push(contact);
            }
        }
    }

    /// Put every bristle back at its rest shape and forget accumulated time
    pub fn reset(&mut self) {
        let segment = self.config.segment_length();
        for bristle in &mut self.bristles {
            bristle.reset_to_rest(segment);
        }
        self.contacts.clear();
        self.accumulator = 0.0;
        self.last_position = None;
    }

    /// Contacts from the most recent substep
    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    pub fn segment_transforms(&self) -> &[SegmentTransform] {
        &self.transforms
    }

    pub fn bristles(&self) -> &[Bristle] {
        &self.bristles
    }

    pub fn bristle_count(&self) -> usize {
        self.bristles.len()
    }

    pub fn config(&self) -> &BristleConfig {
        &self.config
    }

    /// World position of a joint under the current head pose
    pub fn joint_world_position(&self, bristle: usize, joint: usize) -> Option<Vec3> {
        let local = self.bristles.get(bristle)?.joints.get(joint)?;
        Some(self.frame.to_world(*local))
    }

    /// Largest segment length error over all bristles (world units)
    pub fn max_segment_error(&self) -> f32 {
        let segment = self.config.segment_length();
        self.bristles
            .iter()
            .map(|bristle| physics::max_segment_error(bristle, segment))
            .fold(0.0, f32::max)
    }
}

fn with_valid_timestep(mut config: BristleConfig) -> BristleConfig {
    let defaults = BristleConfig::default();
    if !(config.fixed_timestep > 0.0 && config.fixed_timestep.is_finite()) {
        warn!(
            "BristleSystem: invalid fixed_timestep {}, using {}",
            config.fixed_timestep, defaults.fixed_timestep
        );
        config.fixed_timestep = defaults.fixed_timestep;
    }
    if !(config.max_frame_dt.is_finite() && config.max_frame_dt >= config.fixed_timestep) {
        let cap = defaults.max_frame_dt.max(config.fixed_timestep);
        warn!("BristleSystem: invalid max_frame_dt {}, using {}", config.max_frame_dt, cap);
        config.max_frame_dt = cap;
    }
    config
}

//! Shared configuration for the polish brush
//!
//! This crate provides the single source of truth for every tunable used by
//! the brush simulation: the pointer/pressure model, the bristle head, the
//! grid fluid solver and the direct-paint fallback. All structs deserialize
//! with `#[serde(default)]` so partial JSON overrides are accepted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Fixed physics step for bristle integration (seconds)
pub const DEFAULT_FIXED_TIMESTEP: f32 = 1.0 / 120.0;

/// Largest frame delta fed into the physics accumulator (seconds)
pub const DEFAULT_MAX_FRAME_DT: f32 = 0.1;

/// Joints per bristle: one anchored base plus three movable joints
pub const JOINTS_PER_BRISTLE: usize = 4;

/// Default bristle layout (rows x columns = 128 bristles)
pub const DEFAULT_BRISTLE_ROWS: u32 = 8;
pub const DEFAULT_BRISTLE_COLUMNS: u32 = 16;

/// Default fluid grid edge length (cells)
pub const DEFAULT_FLUID_RESOLUTION: u32 = 512;

/// Default number of Jacobi iterations for the pressure solve
pub const DEFAULT_PRESSURE_ITERATIONS: u32 = 20;

/// Lowest pressure a registered bristle contact can report
pub const DEFAULT_PRESSURE_FLOOR: f32 = 0.15;

/// Default edge length of the coverage reporting grid
pub const DEFAULT_COVERAGE_GRID: u32 = 64;

/// Largest timestep a single fluid step will integrate (seconds)
pub const DEFAULT_MAX_FLUID_DT: f32 = 1.0 / 30.0;

/// Smallest and largest accepted fluid grid sizes
pub const MIN_FLUID_RESOLUTION: u32 = 8;
pub const MAX_FLUID_RESOLUTION: u32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Fluid resolution {0} must be a power of two between {min} and {max}",
        min = MIN_FLUID_RESOLUTION,
        max = MAX_FLUID_RESOLUTION
    )]
    InvalidFluidResolution(u32),
    #[error("Bristle layout must have at least one row and one column (got {rows}x{columns})")]
    EmptyBristleLayout { rows: u32, columns: u32 },
    #[error("Fixed timestep must be positive and not exceed the frame cap (fixed={fixed}, cap={cap})")]
    InvalidTimestep { fixed: f32, cap: f32 },
    #[error("Invalid value for {field}: {value}")]
    OutOfRange { field: &'static str, value: f32 },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Pointer-to-pose mapping and simulated pressure model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Brush head height above the surface with no pressure (world units)
    pub hover_height: f32,
    /// Brush head height above the surface at full pressure (world units)
    pub press_height: f32,
    /// Distance along the view ray where an off-surface brush is parked
    pub miss_distance: f32,
    /// Simulated pressure gained per second while the pointer is held
    pub pressure_ramp_rate: f32,
    /// Simulated pressure lost per second after release
    pub pressure_decay_rate: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            hover_height: 0.16,
            press_height: 0.07,
            miss_distance: 2.0,
            pressure_ramp_rate: 3.0,
            pressure_decay_rate: 8.0,
        }
    }
}

/// Bristle head layout and physics tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BristleConfig {
    /// Rows across the head depth
    pub rows: u32,
    /// Columns across the head width
    pub columns: u32,
    /// Rest length of a bristle from base to tip (world units)
    pub bristle_length: f32,
    /// Head width along the fan axis (world units)
    pub head_width: f32,
    /// Head depth across the fan axis (world units)
    pub head_depth: f32,
    /// Outward splay of the outermost columns (radians)
    pub fan_angle: f32,
    /// How far the center bristles lead the edges (world units)
    pub tip_curve: f32,
    /// Bristle radius at the base, used for render transforms
    pub bristle_radius: f32,
    pub center_stiffness: f32,
    pub edge_stiffness: f32,
    pub center_damping: f32,
    pub edge_damping: f32,
    pub center_friction: f32,
    pub edge_friction: f32,
    /// World-space gravity (units/s^2)
    pub gravity: [f32; 3],
    /// Physics step length (seconds)
    pub fixed_timestep: f32,
    /// Frame delta cap before accumulation (seconds)
    pub max_frame_dt: f32,
    /// Distance-constraint relaxation passes per step
    pub constraint_iterations: u32,
    /// Allowed segment length error as a fraction of rest segment length
    pub constraint_tolerance: f32,
    /// Lateral splay under full pressure, as a fraction of segment length
    pub splay_strength: f32,
    /// Compression toward the surface under full pressure, fraction of segment length
    pub compression: f32,
    /// Contact registers when the surface is closer than this multiple of the bristle length
    pub contact_threshold: f32,
    /// Offset along the surface normal applied to clamped joints (world units)
    pub contact_pushback: f32,
    /// Minimum pressure reported by a contact
    pub pressure_floor: f32,
    /// Penetration (fraction of bristle length) that maps to full contact pressure
    pub pressure_depth: f32,
}

impl Default for BristleConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_BRISTLE_ROWS,
            columns: DEFAULT_BRISTLE_COLUMNS,
            bristle_length: 0.12,
            head_width: 0.1,
            head_depth: 0.025,
            fan_angle: 0.3,
            tip_curve: 0.012,
            bristle_radius: 0.0015,
            center_stiffness: 0.35,
            edge_stiffness: 0.18,
            center_damping: 0.12,
            edge_damping: 0.05,
            center_friction: 0.35,
            edge_friction: 0.6,
            gravity: [0.0, -0.6, 0.0],
            fixed_timestep: DEFAULT_FIXED_TIMESTEP,
            max_frame_dt: DEFAULT_MAX_FRAME_DT,
            constraint_iterations: 6,
            constraint_tolerance: 0.01,
            splay_strength: 0.2,
            compression: 0.08,
            contact_threshold: 1.02,
            contact_pushback: 0.0005,
            pressure_floor: DEFAULT_PRESSURE_FLOOR,
            pressure_depth: 0.35,
        }
    }
}

impl BristleConfig {
    /// Total number of bristles in the head
    pub fn bristle_count(&self) -> usize {
        (self.rows as usize) * (self.columns as usize)
    }

    /// Rest length of one segment between adjacent joints
    pub fn segment_length(&self) -> f32 {
        self.bristle_length / (JOINTS_PER_BRISTLE - 1) as f32
    }

    /// Upper bound on fixed steps a single update may run
    ///
    /// A non-positive or non-finite step allows a single step.
    pub fn max_substeps(&self) -> usize {
        if !(self.fixed_timestep > 0.0 && self.fixed_timestep.is_finite()) {
            return 1;
        }
        let ratio = (self.max_frame_dt / self.fixed_timestep).ceil();
        if ratio.is_finite() && ratio > 0.0 {
            (ratio as usize).saturating_add(1)
        } else {
            1
        }
    }
}

/// Grid fluid solver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidConfig {
    /// Grid edge length in cells (power of two)
    pub resolution: u32,
    /// Velocity retained per step (well below 1 so flow dies out quickly)
    pub velocity_dissipation: f32,
    /// Paint retained per step (1.0 keeps paint indefinitely)
    pub paint_dissipation: f32,
    /// Jacobi iterations per pressure solve
    pub pressure_iterations: u32,
    /// Gaussian splat radius in UV units
    pub splat_radius: f32,
    /// Multiplier from brush UV velocity to injected velocity
    pub splat_force: f32,
    /// Peak alpha a single splat deposits
    pub splat_strength: f32,
    /// Largest dt integrated by one step (seconds)
    pub max_dt: f32,
    /// Alpha above which a cell counts as covered
    pub coverage_threshold: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_FLUID_RESOLUTION,
            velocity_dissipation: 0.9,
            paint_dissipation: 1.0,
            pressure_iterations: DEFAULT_PRESSURE_ITERATIONS,
            splat_radius: 0.025,
            splat_force: 0.6,
            splat_strength: 0.9,
            max_dt: DEFAULT_MAX_FLUID_DT,
            coverage_threshold: 0.05,
        }
    }
}

/// Direct-paint fallback compositor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Main stroke width at full pressure (destination pixels)
    pub stroke_width: f32,
    /// Centroid travel required before another segment is drawn (pixels)
    pub min_distance: f32,
    /// Edge length of the coverage reporting grid
    pub coverage_grid: u32,
    /// Underlay width relative to the main stroke
    pub underlay_width_scale: f32,
    /// Underlay opacity relative to the main stroke
    pub underlay_opacity: f32,
    /// Highlight width relative to the main stroke
    pub highlight_width_scale: f32,
    /// Perpendicular highlight offset relative to the main stroke width
    pub highlight_offset: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            stroke_width: 18.0,
            min_distance: 3.0,
            coverage_grid: DEFAULT_COVERAGE_GRID,
            underlay_width_scale: 1.3,
            underlay_opacity: 0.6,
            highlight_width_scale: 0.3,
            highlight_offset: 0.25,
        }
    }
}

/// Complete brush configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct BrushConfig {
    pub input: InputConfig,
    pub bristles: BristleConfig,
    pub fluid: FluidConfig,
    pub compositor: CompositorConfig,
}

impl BrushConfig {
    /// Parse a (possibly partial) JSON override and validate it
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fluid = &self.fluid;
        if !fluid.resolution.is_power_of_two()
            || !(MIN_FLUID_RESOLUTION..=MAX_FLUID_RESOLUTION).contains(&fluid.resolution)
        {
            return Err(ConfigError::InvalidFluidResolution(fluid.resolution));
        }

        let bristles = &self.bristles;
        if bristles.rows == 0 || bristles.columns == 0 {
            return Err(ConfigError::EmptyBristleLayout {
                rows: bristles.rows,
                columns: bristles.columns,
            });
        }
        if bristles.fixed_timestep <= 0.0 || bristles.max_frame_dt < bristles.fixed_timestep {
            return Err(ConfigError::InvalidTimestep {
                fixed: bristles.fixed_timestep,
                cap: bristles.max_frame_dt,
            });
        }

        check_positive("bristles.bristle_length", bristles.bristle_length)?;
        check_unit("bristles.pressure_floor", bristles.pressure_floor)?;
        check_positive("bristles.pressure_depth", bristles.pressure_depth)?;
        check_unit("fluid.velocity_dissipation", fluid.velocity_dissipation)?;
        check_unit("fluid.paint_dissipation", fluid.paint_dissipation)?;
        check_unit("fluid.splat_strength", fluid.splat_strength)?;
        check_positive("fluid.splat_radius", fluid.splat_radius)?;
        check_positive("fluid.max_dt", fluid.max_dt)?;
        check_positive("compositor.stroke_width", self.compositor.stroke_width)?;
        if self.compositor.coverage_grid == 0 {
            return Err(ConfigError::OutOfRange {
                field: "compositor.coverage_grid",
                value: 0.0,
            });
        }
        if self.input.press_height > self.input.hover_height {
            return Err(ConfigError::OutOfRange {
                field: "input.press_height",
                value: self.input.press_height,
            });
        }

        Ok(())
    }
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BrushConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bristles.bristle_count(), 128);
        assert_eq!(config.fluid.resolution, DEFAULT_FLUID_RESOLUTION);
    }

    #[test]
    fn test_hover_height_clears_bristle_reach() {
        let config = BrushConfig::default();
        let bristles = &config.bristles;
        let reach = bristles.bristle_length * bristles.contact_threshold + bristles.tip_curve;
        assert!(config.input.hover_height > reach);
        assert!(config.input.press_height < bristles.bristle_length);
    }

    #[test]
    fn test_segment_length() {
        let config = BristleConfig {
            bristle_length: 0.3,
            ..Default::default()
        };
        assert!((config.segment_length() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_max_substeps() {
        let config = BristleConfig::default();
        // 0.1 / (1/120) = 12, plus one
        assert_eq!(config.max_substeps(), 13);
    }

    #[test]
    fn test_max_substeps_degenerate_step() {
        for fixed_timestep in [0.0, -1.0, f32::NAN, f32::INFINITY, 1e-30] {
            let config = BristleConfig {
                fixed_timestep,
                ..Default::default()
            };
            assert!(config.max_substeps() >= 1);
        }
        let zero = BristleConfig {
            fixed_timestep: 0.0,
            ..Default::default()
        };
        assert_eq!(zero.max_substeps(), 1);
    }

    #[test]
    fn test_partial_json_override() {
        let config = BrushConfig::from_json_str(r#"{ "fluid": { "resolution": 128 } }"#).unwrap();
        assert_eq!(config.fluid.resolution, 128);
        assert_eq!(config.fluid.pressure_iterations, DEFAULT_PRESSURE_ITERATIONS);
        assert_eq!(config.bristles.rows, DEFAULT_BRISTLE_ROWS);
    }

    #[test]
    fn test_rejects_non_power_of_two_resolution() {
        let result = BrushConfig::from_json_str(r#"{ "fluid": { "resolution": 500 } }"#);
        assert!(matches!(result, Err(ConfigError::InvalidFluidResolution(500))));
    }

    #[test]
    fn test_rejects_empty_layout() {
        let mut config = BrushConfig::default();
        config.bristles.columns = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyBristleLayout { .. })
        ));
    }

    #[test]
    fn test_rejects_timestep_above_cap() {
        let mut config = BrushConfig::default();
        config.bristles.fixed_timestep = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimestep { .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = BrushConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

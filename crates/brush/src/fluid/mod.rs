//! Stable-fluids paint solver in surface UV space
//!
//! The solver keeps a velocity field and a paint (RGBA) field on an N x N
//! grid. A splat injects a Gaussian velocity impulse and blends color; a step
//! runs the strictly ordered pipeline:
//!
//! 1. advect velocity through itself (dissipating quickly)
//! 2. advect paint through the updated velocity (dissipation near 1)
//! 3. divergence of velocity
//! 4. Jacobi pressure iterations (pressure starts from zero every step)
//! 5. subtract the pressure gradient from velocity
//!
//! Each pass reads the previous pass's output. Backends implement the same
//! math: [`CpuFluidBackend`] always, [`GpuFluidBackend`] with the `gpu` feature.

mod cpu;
#[cfg(feature = "gpu")]
mod gpu;

pub use cpu::CpuFluidBackend;
#[cfg(feature = "gpu")]
pub use gpu::GpuFluidBackend;

use glam::Vec2;
use polish_config::{FluidConfig, MAX_FLUID_RESOLUTION, MIN_FLUID_RESOLUTION};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::surface::CpuSurface;

#[derive(Debug, Error)]
pub enum FluidError {
    #[error(
        "Grid resolution {0} must be a power of two between {min} and {max}",
        min = MIN_FLUID_RESOLUTION,
        max = MAX_FLUID_RESOLUTION
    )]
    InvalidResolution(u32),
    #[error("No compatible GPU adapter: {0}")]
    AdapterUnavailable(String),
    #[error("Failed to create GPU device: {0}")]
    DeviceUnavailable(String),
    #[error("Paint readback failed: {0}")]
    Readback(String),
}

pub(crate) fn validate_resolution(resolution: u32) -> Result<(), FluidError> {
    if resolution.is_power_of_two()
        && (MIN_FLUID_RESOLUTION..=MAX_FLUID_RESOLUTION).contains(&resolution)
    {
        Ok(())
    } else {
        Err(FluidError::InvalidResolution(resolution))
    }
}

/// One Gaussian injection of velocity and color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatParams {
    /// Center in UV
    pub point: Vec2,
    /// Velocity added at the center (UV per second)
    pub force: Vec2,
    /// Linear RGB
    pub color: [f32; 3],
    /// Gaussian radius in UV
    pub radius: f32,
    /// Peak paint weight
    pub strength: f32,
}

/// Parameters for one solver step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub dt: f32,
    pub velocity_dissipation: f32,
    pub paint_dissipation: f32,
    pub pressure_iterations: u32,
}

/// A grid solver implementation.
///
/// `splat` runs the velocity pass then the paint pass; `step` runs the five
/// solver passes in order. Paint alpha is kept in [0, 1].
pub trait FluidBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolution(&self) -> u32;

    fn splat(&mut self, splat: &SplatParams) -> Result<(), FluidError>;

    fn step(&mut self, step: &StepParams) -> Result<(), FluidError>;

    /// Copy the paint field (row-major, N*N RGBA) into `out`
    fn read_paint(&mut self, out: &mut Vec<[f32; 4]>) -> Result<(), FluidError>;

    /// Zero every field
    fn clear(&mut self) -> Result<(), FluidError>;
}

/// Owns a backend, applies the configured tuning and caches paint readback
pub struct FluidSimulator {
    backend: Box<dyn FluidBackend>,
    config: FluidConfig,
    paint: Vec<[f32; 4]>,
    paint_valid: bool,
}

impl std::fmt::Debug for FluidSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluidSimulator")
            .field("backend", &self.backend.name())
            .field("resolution", &self.backend.resolution())
            .finish()
    }
}

impl FluidSimulator {
    /// Wrap a backend. A non-positive splat radius or non-finite `max_dt`
    /// is replaced by the default so splats never produce NaN weights.
    pub fn new(backend: Box<dyn FluidBackend>, mut config: FluidConfig) -> Self {
        let defaults = FluidConfig::default();
        if !(config.splat_radius > 0.0 && config.splat_radius.is_finite()) {
            warn!(
                "FluidSimulator: invalid splat_radius {}, using {}",
                config.splat_radius, defaults.splat_radius
            );
            config.splat_radius = defaults.splat_radius;
        }
        if !(config.max_dt >= 0.0 && config.max_dt.is_finite()) {
            warn!("FluidSimulator: invalid max_dt {}, using {}", config.max_dt, defaults.max_dt);
            config.max_dt = defaults.max_dt;
        }
        info!(
            "FluidSimulator: {} backend, {}x{} grid",
            backend.name(),
            backend.resolution(),
            backend.resolution()
        );
        Self {
            backend,
            config,
            paint: Vec::new(),
            paint_valid: false,
        }
    }

    /// Reference solver on the CPU
    pub fn cpu(config: &FluidConfig) -> Result<Self, FluidError> {
        let backend = CpuFluidBackend::new(config.resolution)?;
        Ok(Self::new(Box::new(backend), config.clone()))
    }

    /// Compute-shader solver. Fails when no adapter or device is available.
    #[cfg(feature = "gpu")]
    pub fn gpu(config: &FluidConfig) -> Result<Self, FluidError> {
        let backend = GpuFluidBackend::new(config.resolution)?;
        Ok(Self::new(Box::new(backend), config.clone()))
    }

    /// Inject a velocity impulse and blend `color` at UV (u, v).
    ///
    /// Paint alpha becomes the maximum of the old alpha and the splat weight;
    /// color moves toward `color` by the same weight.
    pub fn splat(&mut self, u: f32, v: f32, velocity_delta: Vec2, color: [f32; 3]) -> Result<(), FluidError> {
        if !(u.is_finite() && v.is_finite()) {
            return Ok(());
        }
        let force = if velocity_delta.is_finite() {
            velocity_delta
        } else {
            Vec2::ZERO
        };

        self.backend.splat(&SplatParams {
            point: Vec2::new(u, v),
            force,
            color: color.map(|c| c.clamp(0.0, 1.0)),
            radius: self.config.splat_radius,
            strength: self.config.splat_strength.clamp(0.0, 1.0),
        })?;
        self.paint_valid = false;
        Ok(())
    }

    /// Run one solver step; `dt` is clamped to `max_dt`
    pub fn step(&mut self, dt: f32) -> Result<(), FluidError> {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_dt)
        } else {
            0.0
        };
        self.backend.step(&StepParams {
            dt,
            velocity_dissipation: self.config.velocity_dissipation,
            paint_dissipation: self.config.paint_dissipation,
            pressure_iterations: self.config.pressure_iterations,
        })?;
        self.paint_valid = false;
        Ok(())
    }

    /// Current paint field, read back at most once between mutations
    pub fn paint_field(&mut self) -> Result<&[[f32; 4]], FluidError> {
        if !self.paint_valid {
            self.backend.read_paint(&mut self.paint)?;
            self.paint_valid = true;
        }
        Ok(&self.paint)
    }

    /// Paint at the cell containing `uv`
    pub fn sample_paint(&mut self, uv: Vec2) -> Result<[f32; 4], FluidError> {
        let n = self.resolution();
        let cell = (uv.clamp(Vec2::ZERO, Vec2::ONE) * n as f32)
            .floor()
            .min(Vec2::splat((n - 1) as f32));
        let index = cell.y as usize * n as usize + cell.x as usize;
        let paint = self.paint_field()?;
        Ok(paint.get(index).copied().unwrap_or([0.0; 4]))
    }

    /// Overwrite `destination` with the paint field using nearest-sample scaling
    pub fn copy_to(&mut self, destination: &mut CpuSurface) -> Result<(), FluidError> {
        let n = self.resolution();
        let paint = self.paint_field()?;
        destination.resample_nearest(paint, n);
        Ok(())
    }

    /// Percentage (0-100) of cells whose alpha exceeds `threshold`
    pub fn coverage(&mut self, threshold: f32) -> Result<f32, FluidError> {
        let paint = self.paint_field()?;
        if paint.is_empty() {
            return Ok(0.0);
        }
        let covered = paint.iter().filter(|cell| cell[3] > threshold).count();
        Ok(covered as f32 / paint.len() as f32 * 100.0)
    }

    /// Zero velocity, pressure and paint
    pub fn clear(&mut self) -> Result<(), FluidError> {
        self.backend.clear()?;
        self.paint.clear();
        self.paint_valid = false;
        debug!("FluidSimulator: cleared");
        Ok(())
    }

    pub fn resolution(&self) -> u32 {
        self.backend.resolution()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &FluidConfig {
        &self.config
    }
}

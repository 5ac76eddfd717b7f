//! Reference stable-fluids solver on the CPU
//!
//! Same passes and math as the compute shaders: cell (i, j) covers UV
//! `[i/N, (i+1)/N) x [j/N, (j+1)/N)`, velocity is stored in UV units per
//! second, and neighbor lookups clamp to the edge.

use glam::{Vec2, Vec4};
use tracing::debug;

use super::{FluidBackend, FluidError, SplatParams, StepParams, validate_resolution};

/// Double-buffered CPU fields
#[derive(Debug, Clone)]
pub struct CpuFluidBackend {
    resolution: u32,
    velocity: Vec<Vec2>,
    velocity_next: Vec<Vec2>,
    paint: Vec<Vec4>,
    paint_next: Vec<Vec4>,
    pressure: Vec<f32>,
    pressure_next: Vec<f32>,
    divergence: Vec<f32>,
}

impl CpuFluidBackend {
    pub fn new(resolution: u32) -> Result<Self, FluidError> {
        validate_resolution(resolution)?;
        let cells = (resolution as usize) * (resolution as usize);
        debug!("CpuFluidBackend::new: {}x{} grid", resolution, resolution);
        Ok(Self {
            resolution,
            velocity: vec![Vec2::ZERO; cells],
            velocity_next: vec![Vec2::ZERO; cells],
            paint: vec![Vec4::ZERO; cells],
            paint_next: vec![Vec4::ZERO; cells],
            pressure: vec![0.0; cells],
            pressure_next: vec![0.0; cells],
            divergence: vec![0.0; cells],
        })
    }

    #[inline]
    fn n(&self) -> usize {
        self.resolution as usize
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.n() + x
    }

    /// Index of a neighbor offset by (dx, dy), clamped to the grid
    #[inline]
    fn clamped(&self, x: usize, y: usize, dx: isize, dy: isize) -> usize {
        let max = self.n() as isize - 1;
        let nx = (x as isize + dx).clamp(0, max) as usize;
        let ny = (y as isize + dy).clamp(0, max) as usize;
        self.index(nx, ny)
    }

    #[inline]
    fn cell_uv(&self, x: usize, y: usize) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) / self.resolution as f32
    }

    /// Velocity at a cell, for diagnostics
    pub fn velocity_at(&self, x: u32, y: u32) -> Vec2 {
        self.velocity[self.index(x as usize, y as usize)]
    }

    /// Central-difference divergence of the current velocity field
    pub fn divergence_at(&self, x: u32, y: u32) -> f32 {
        let (x, y) = (x as usize, y as usize);
        let left = self.velocity[self.clamped(x, y, -1, 0)].x;
        let right = self.velocity[self.clamped(x, y, 1, 0)].x;
        let bottom = self.velocity[self.clamped(x, y, 0, -1)].y;
        let top = self.velocity[self.clamped(x, y, 0, 1)].y;
        0.5 * ((right - left) + (top - bottom))
    }

    fn splat_velocity(&mut self, splat: &SplatParams) {
        let radius_sq = splat.radius * splat.radius;
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let d = self.cell_uv(x, y) - splat.point;
                let weight = (-d.length_squared() / radius_sq).exp();
                let i = self.index(x, y);
                self.velocity_next[i] = self.velocity[i] + splat.force * weight;
            }
        }
        std::mem::swap(&mut self.velocity, &mut self.velocity_next);
    }

    fn splat_paint(&mut self, splat: &SplatParams) {
        let radius_sq = splat.radius * splat.radius;
        let color = Vec4::new(splat.color[0], splat.color[1], splat.color[2], 0.0);
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let d = self.cell_uv(x, y) - splat.point;
                let weight = splat.strength * (-d.length_squared() / radius_sq).exp();
                let i = self.index(x, y);
                let old = self.paint[i];
                let mut blended = old.lerp(color, weight);
                blended.w = old.w.max(weight).clamp(0.0, 1.0);
                self.paint_next[i] = blended;
            }
        }
        std::mem::swap(&mut self.paint, &mut self.paint_next);
    }

    /// Semi-Lagrangian trace back through the current velocity field
    #[inline]
    fn trace_back(&self, x: usize, y: usize, dt: f32) -> Vec2 {
        let velocity = self.velocity[self.index(x, y)];
        (self.cell_uv(x, y) - velocity * dt) * self.resolution as f32 - 0.5
    }

    fn advect_velocity(&mut self, dt: f32, dissipation: f32) {
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let position = self.trace_back(x, y, dt);
                let sampled = bilinear(&self.velocity, n, position);
                let i = self.index(x, y);
                self.velocity_next[i] = sampled * dissipation;
            }
        }
        std::mem::swap(&mut self.velocity, &mut self.velocity_next);
    }

    fn advect_paint(&mut self, dt: f32, dissipation: f32) {
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let position = self.trace_back(x, y, dt);
                let mut sampled = bilinear(&self.paint, n, position) * dissipation;
                sampled.w = sampled.w.clamp(0.0, 1.0);
                let i = self.index(x, y);
                self.paint_next[i] = sampled;
            }
        }
        std::mem::swap(&mut self.paint, &mut self.paint_next);
    }

    fn compute_divergence(&mut self) {
        let n = self.resolution;
        for y in 0..n {
            for x in 0..n {
                let i = self.index(x as usize, y as usize);
                self.divergence[i] = self.divergence_at(x, y);
            }
        }
    }

    fn jacobi(&mut self) {
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let left = self.pressure[self.clamped(x, y, -1, 0)];
                let right = self.pressure[self.clamped(x, y, 1, 0)];
                let bottom = self.pressure[self.clamped(x, y, 0, -1)];
                let top = self.pressure[self.clamped(x, y, 0, 1)];
                let i = self.index(x, y);
                self.pressure_next[i] = (left + right + bottom + top - self.divergence[i]) * 0.25;
            }
        }
        std::mem::swap(&mut self.pressure, &mut self.pressure_next);
    }

    fn subtract_gradient(&mut self) {
        let n = self.n();
        for y in 0..n {
            for x in 0..n {
                let left = self.pressure[self.clamped(x, y, -1, 0)];
                let right = self.pressure[self.clamped(x, y, 1, 0)];
                let bottom = self.pressure[self.clamped(x, y, 0, -1)];
                let top = self.pressure[self.clamped(x, y, 0, 1)];
                let i = self.index(x, y);
                self.velocity_next[i] = self.velocity[i] - 0.5 * Vec2::new(right - left, top - bottom);
            }
        }
        std::mem::swap(&mut self.velocity, &mut self.velocity_next);
    }
}

/// Bilinear sample at a continuous cell position (cell centers on integers)
fn bilinear<T>(field: &[T], n: usize, position: Vec2) -> T
where
    T: Copy + std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let max = (n - 1) as f32;
    let p = position.clamp(Vec2::ZERO, Vec2::splat(max));
    let x0 = p.x.floor() as usize;
    let y0 = p.y.floor() as usize;
    let x1 = (x0 + 1).min(n - 1);
    let y1 = (y0 + 1).min(n - 1);
    let fx = p.x - x0 as f32;
    let fy = p.y - y0 as f32;

    let top = field[y0 * n + x0] * (1.0 - fx) + field[y0 * n + x1] * fx;
    let bottom = field[y1 * n + x0] * (1.0 - fx) + field[y1 * n + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}

impl FluidBackend for CpuFluidBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resolution(&self) -> u32 {
        self.resolution
    }

    fn splat(&mut self, splat: &SplatParams) -> Result<(), FluidError> {
        self.splat_velocity(splat);
        self.splat_paint(splat);
        Ok(())
    }

    fn step(&mut self, step: &StepParams) -> Result<(), FluidError> {
        self.advect_velocity(step.dt, step.velocity_dissipation);
        self.advect_paint(step.dt, step.paint_dissipation);
        self.compute_divergence();
        self.pressure.fill(0.0);
        for _ in 0..step.pressure_iterations {
            self.jacobi();
        }
        self.subtract_gradient();
        Ok(())
    }

    fn read_paint(&mut self, out: &mut Vec<[f32; 4]>) -> Result<(), FluidError> {
        out.clear();
        out.extend(self.paint.iter().map(|cell| cell.to_array()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), FluidError> {
        self.velocity.fill(Vec2::ZERO);
        self.velocity_next.fill(Vec2::ZERO);
        self.paint.fill(Vec4::ZERO);
        self.paint_next.fill(Vec4::ZERO);
        self.pressure.fill(0.0);
        self.pressure_next.fill(0.0);
        self.divergence.fill(0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: u32 = 32;

    fn cell_center(x: u32, y: u32) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) / N as f32
    }

    fn paint_splat(point: Vec2, color: [f32; 3], strength: f32) -> SplatParams {
        SplatParams {
            point,
            force: Vec2::ZERO,
            color,
            radius: 0.05,
            strength,
        }
    }

    fn step_params(dt: f32, velocity_dissipation: f32) -> StepParams {
        StepParams {
            dt,
            velocity_dissipation,
            paint_dissipation: 1.0,
            pressure_iterations: 20,
        }
    }

    fn paint_at(backend: &mut CpuFluidBackend, x: u32, y: u32) -> [f32; 4] {
        let mut out = Vec::new();
        backend.read_paint(&mut out).unwrap();
        out[(y * N + x) as usize]
    }

    fn divergence_norm(backend: &CpuFluidBackend) -> f32 {
        let mut sum = 0.0;
        for y in 0..N {
            for x in 0..N {
                sum += backend.divergence_at(x, y).abs();
            }
        }
        sum
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(matches!(
            CpuFluidBackend::new(100),
            Err(FluidError::InvalidResolution(100))
        ));
    }

    #[test]
    fn test_splat_alpha_at_center_equals_strength() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        backend
            .splat(&paint_splat(cell_center(16, 16), [1.0, 0.0, 0.0], 0.9))
            .unwrap();

        let cell = paint_at(&mut backend, 16, 16);
        assert!((cell[3] - 0.9).abs() < 1e-6);
        assert!((cell[0] - 0.9).abs() < 1e-6);
        // Falls off away from the center
        assert!(paint_at(&mut backend, 20, 16)[3] < 0.9);
    }

    #[test]
    fn test_repeated_splats_converge_without_overbright() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        let point = cell_center(10, 10);
        for _ in 0..50 {
            backend.splat(&paint_splat(point, [0.8, 0.2, 0.4], 1.0)).unwrap();
            let cell = paint_at(&mut backend, 10, 10);
            assert!(cell[3] <= 1.0);
        }

        let cell = paint_at(&mut backend, 10, 10);
        assert!((cell[0] - 0.8).abs() < 1e-4);
        assert!((cell[1] - 0.2).abs() < 1e-4);
        assert!((cell[2] - 0.4).abs() < 1e-4);
        assert_eq!(cell[3], 1.0);

        // Neighbors converge toward the color as well
        let near = paint_at(&mut backend, 11, 10);
        assert!((near[0] - 0.8).abs() < 1e-3);
    }

    #[test]
    fn test_alpha_keeps_maximum_of_strengths() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        let point = cell_center(8, 8);
        backend.splat(&paint_splat(point, [1.0, 1.0, 1.0], 0.8)).unwrap();
        backend.splat(&paint_splat(point, [0.0, 0.0, 1.0], 0.3)).unwrap();

        let cell = paint_at(&mut backend, 8, 8);
        assert!((cell[3] - 0.8).abs() < 1e-6);
        // Color still mixes by the weaker weight
        assert!((cell[0] - 0.8 * 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_zero_velocity_step_keeps_paint() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        backend
            .splat(&paint_splat(cell_center(12, 12), [0.5, 0.5, 0.5], 0.9))
            .unwrap();
        let before = paint_at(&mut backend, 12, 12);

        for _ in 0..10 {
            backend.step(&step_params(1.0 / 60.0, 0.9)).unwrap();
        }

        let after = paint_at(&mut backend, 12, 12);
        for c in 0..4 {
            assert!((after[c] - before[c]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_uniform_flow_moves_paint_downstream() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        backend
            .splat(&paint_splat(cell_center(10, 16), [1.0, 1.0, 1.0], 1.0))
            .unwrap();
        backend.velocity.fill(Vec2::new(4.0 / N as f32, 0.0));

        // One step of 1s moves four cells to the right
        backend
            .step(&StepParams {
                pressure_iterations: 0,
                ..step_params(1.0, 1.0)
            })
            .unwrap();

        assert!((paint_at(&mut backend, 14, 16)[3] - 1.0).abs() < 1e-5);
        assert!(paint_at(&mut backend, 10, 16)[3] < 0.5);
    }

    #[test]
    fn test_velocity_dissipates() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        backend
            .splat(&SplatParams {
                force: Vec2::new(0.5, 0.0),
                ..paint_splat(cell_center(16, 16), [0.0; 3], 0.0)
            })
            .unwrap();
        let before = backend.velocity_at(16, 16).length();

        for _ in 0..20 {
            backend.step(&step_params(1.0 / 60.0, 0.9)).unwrap();
        }
        assert!(backend.velocity_at(16, 16).length() < before * 0.2);
    }

    #[test]
    fn test_projection_reduces_divergence() {
        let projected = |iterations: u32| {
            let mut backend = CpuFluidBackend::new(N).unwrap();
            backend
                .splat(&SplatParams {
                    force: Vec2::new(0.5, 0.0),
                    radius: 0.08,
                    ..paint_splat(cell_center(16, 16), [0.0; 3], 0.0)
                })
                .unwrap();
            let before = divergence_norm(&backend);
            backend
                .step(&StepParams {
                    pressure_iterations: iterations,
                    ..step_params(0.0, 1.0)
                })
                .unwrap();
            divergence_norm(&backend) / before
        };

        let coarse = projected(20);
        assert!(coarse < 0.75, "ratio {}", coarse);
        assert!(projected(80) < coarse);
    }

    #[test]
    fn test_clear_resets_fields() {
        let mut backend = CpuFluidBackend::new(N).unwrap();
        backend
            .splat(&SplatParams {
                force: Vec2::ONE,
                ..paint_splat(cell_center(4, 4), [1.0; 3], 1.0)
            })
            .unwrap();
        backend.clear().unwrap();

        assert_eq!(paint_at(&mut backend, 4, 4), [0.0; 4]);
        assert_eq!(backend.velocity_at(4, 4), Vec2::ZERO);
    }
}

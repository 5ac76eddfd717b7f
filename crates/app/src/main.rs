//! Polish demo - headless host for the polish brush
//!
//! Wires a nail-shaped target, a camera, a pointer hub and a destination
//! texture around `BrushController`, replays a scripted swipe at 60 Hz and
//! writes the painted texture to a PNG.

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Mat4, Vec2, Vec3};
use polish_brush::{
    BrushConfig, BrushController, CpuSurface, FluidConfig, FluidSimulator, PointerHub, SurfaceMesh,
    TargetSurface, ViewCamera,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod gesture;

use config::{DemoConfig, FluidMode};
use gesture::SwipeGesture;

/// Host frame rate
const FRAME_RATE: f64 = 60.0;

/// Viewport the scripted pointer moves in (pixels)
const VIEWPORT: Vec2 = Vec2::new(640.0, 640.0);

/// Default polish color (linear RGB)
const POLISH_RED: [f32; 3] = [0.62, 0.02, 0.08];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let demo = DemoConfig::default();
    info!("Starting polish demo with {:?} fluid", demo.fluid_mode);

    let config = load_brush_config(demo.brush_config.as_deref())?;
    let fluid = build_fluid(demo.fluid_mode, &config.fluid);

    let mut controller = BrushController::new(config, fluid);
    controller.set_color(POLISH_RED);
    controller.set_finish(demo.finish);
    controller.on_paint_start(|| debug!("stroke started"));
    controller.on_paint_end(|| debug!("stroke ended"));
    controller.on_coverage_change(|coverage| debug!("coverage {:.1}%", coverage));

    let target = TargetSurface::new(SurfaceMesh::quad(1.0, 1.0), Mat4::IDENTITY);
    let camera = ViewCamera::look_at(
        Vec3::new(0.0, 0.0, 1.6),
        Vec3::ZERO,
        Vec3::Y,
        45f32.to_radians(),
        VIEWPORT,
    );
    let mut hub = PointerHub::new();
    let mut destination = CpuSurface::new(demo.texture_size, demo.texture_size);

    controller.activate(&mut hub);

    let gesture = SwipeGesture::new(VIEWPORT, demo.frames);
    let mut substeps = 0;
    for frame in 0..demo.frames {
        for event in gesture.events(frame) {
            hub.dispatch(event);
        }
        substeps += controller.update(frame as f64 / FRAME_RATE, &target, &camera, &mut destination);
    }

    let coverage = controller.coverage();
    let material = controller.material_params();
    controller.dispose(&mut hub);

    write_png(&destination, &demo.output)?;
    info!(
        "Painted {} frames ({} physics steps), coverage {:.1}%, finish {} (roughness {:.2}, metalness {:.2}) -> {}",
        demo.frames,
        substeps,
        coverage,
        demo.finish,
        material.roughness,
        material.metalness,
        demo.output.display()
    );
    Ok(())
}

fn load_brush_config(path: Option<&Path>) -> Result<BrushConfig> {
    let Some(path) = path else {
        return Ok(BrushConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read brush config {}", path.display()))?;
    let config = BrushConfig::from_json_str(&json)
        .with_context(|| format!("Invalid brush config {}", path.display()))?;
    info!("Loaded brush config from {}", path.display());
    Ok(config)
}

/// Build the requested solver; any failure leaves the controller on direct paint
fn build_fluid(mode: FluidMode, config: &FluidConfig) -> Option<FluidSimulator> {
    let result = match mode {
        FluidMode::Off => return None,
        FluidMode::Cpu => FluidSimulator::cpu(config),
        #[cfg(feature = "gpu")]
        FluidMode::Gpu => FluidSimulator::gpu(config),
        #[cfg(not(feature = "gpu"))]
        FluidMode::Gpu => {
            warn!("Built without the `gpu` feature, using direct paint");
            return None;
        }
    };

    result
        .map_err(|e| warn!("Fluid solver unavailable ({}), using direct paint", e))
        .ok()
}

fn write_png(surface: &CpuSurface, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(surface.width, surface.height, surface.to_rgba8())
        .context("Destination buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

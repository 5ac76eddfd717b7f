//! Per-frame brush orchestration
//!
//! The host owns the frame loop and calls [`BrushController::update`] once
//! per frame with a timestamp. Each frame:
//!
//! 1. drain pointer events and advance the pressure model
//! 2. raycast the pointer into a [`BrushPose`]
//! 3. step the bristles against the target surface
//! 4. if the pose is valid, the pointer is down and bristles touch the
//!    surface: splat into the fluid field (or paint directly through the
//!    fallback compositor)
//! 5. step the fluid once and copy the paint field into the destination
//!
//! Fluid failures are not fatal: the simulator is dropped and painting
//! continues through [`DirectPaintCompositor`].

use glam::Vec2;
use polish_config::BrushConfig;
use tracing::{debug, info, warn};

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

use crate::bristle::BristleSystem;
use crate::compositor::DirectPaintCompositor;
use crate::constants::COVERAGE_REPORT_STEP;
use crate::finish::{Finish, MaterialParams};
use crate::fluid::{FluidError, FluidSimulator};
use crate::input::{CursorStyle, InputMapper, PointerHost, ViewCamera};
use crate::raycast::RaycastTarget;
use crate::surface::CpuSurface;
use crate::types::{BrushPose, SegmentTransform};

/// Fired when a stroke starts or ends
pub type PaintCallback = Box<dyn FnMut() + Send + Sync>;

/// Fired with the new coverage percentage (0-100)
pub type CoverageCallback = Box<dyn FnMut(f32) + Send + Sync>;

#[derive(Default)]
struct BrushCallbacks {
    on_paint_start: Option<PaintCallback>,
    on_paint_end: Option<PaintCallback>,
    on_coverage_change: Option<CoverageCallback>,
}

/// Ties input, bristles and the paint path together for one target surface
#[cfg_attr(feature = "bevy", derive(Resource))]
pub struct BrushController {
    config: BrushConfig,
    input: InputMapper,
    bristles: BristleSystem,
    fluid: Option<FluidSimulator>,
    fluid_enabled: bool,
    compositor: DirectPaintCompositor,
    color: [f32; 3],
    opacity: f32,
    finish: Finish,
    active: bool,
    brush_visible: bool,
    disposed: bool,
    /// Cursor style in effect before activation, restored on deactivation
    saved_cursor: Option<CursorStyle>,
    last_time: Option<f64>,
    last_uv: Option<Vec2>,
    pose: BrushPose,
    painting: bool,
    /// The destination is cleared on the next update after `clear_nail`
    pending_clear: bool,
    last_reported_coverage: f32,
    callbacks: BrushCallbacks,
}

impl std::fmt::Debug for BrushController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrushController")
            .field("active", &self.active)
            .field("fluid", &self.fluid)
            .field("fluid_enabled", &self.fluid_enabled)
            .field("finish", &self.finish)
            .field("pose", &self.pose)
            .field("painting", &self.painting)
            .finish()
    }
}

impl BrushController {
    /// Build a controller. Without a simulator every stroke goes through the
    /// direct-paint compositor. A config that fails validation is replaced
    /// by the defaults.
    pub fn new(config: BrushConfig, fluid: Option<FluidSimulator>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("BrushController: invalid config ({}), using defaults", e);
                BrushConfig::default()
            }
        };
        let input = InputMapper::new(config.input.clone());
        let bristles = BristleSystem::new(config.bristles.clone());
        let compositor = DirectPaintCompositor::new(config.compositor.clone());

        info!(
            "BrushController: {} bristles, paint path = {}",
            bristles.bristle_count(),
            fluid.as_ref().map_or("direct", |f| f.backend_name())
        );

        Self {
            config,
            input,
            bristles,
            fluid,
            fluid_enabled: true,
            compositor,
            color: [1.0, 0.0, 0.0],
            opacity: 1.0,
            finish: Finish::default(),
            active: false,
            brush_visible: false,
            disposed: false,
            saved_cursor: None,
            last_time: None,
            last_uv: None,
            pose: BrushPose::default(),
            painting: false,
            pending_clear: false,
            last_reported_coverage: 0.0,
            callbacks: BrushCallbacks::default(),
        }
    }

    /// Start listening to pointer input, hide the system cursor and show the
    /// brush. Calling twice is a no-op.
    pub fn activate(&mut self, host: &mut dyn PointerHost) {
        if self.active || self.disposed {
            return;
        }
        self.input.attach(host);
        self.saved_cursor = Some(host.set_cursor(CursorStyle::Hidden));
        self.active = true;
        self.brush_visible = true;
        self.last_time = None;
        info!("BrushController: activated");
    }

    /// Stop listening, restore the cursor and hide the brush.
    ///
    /// The paint field is kept so reactivating continues the same nail.
    pub fn deactivate(&mut self, host: &mut dyn PointerHost) {
        if !self.active {
            return;
        }
        self.input.detach(host);
        if let Some(previous) = self.saved_cursor.take() {
            host.set_cursor(previous);
        }
        self.end_stroke();
        self.active = false;
        self.brush_visible = false;
        info!("BrushController: deactivated");
    }

    /// Advance one frame. `time` is the host's frame timestamp in seconds.
    ///
    /// Returns the number of bristle physics steps run.
    pub fn update(
        &mut self,
        time: f64,
        target: &dyn RaycastTarget,
        camera: &ViewCamera,
        destination: &mut CpuSurface,
    ) -> usize {
        if !self.active {
            return 0;
        }

        let dt = match self.last_time.replace(time) {
            Some(last) if time > last => (time - last) as f32,
            _ => 0.0,
        };

        if self.pending_clear {
            destination.clear([0.0; 4]);
            self.pending_clear = false;
        }

        self.input.pump_events();
        self.input.update_pressure(dt);

        let pose = self.input.get_brush_transform(target, camera);
        let steps = self.bristles.update(dt, &pose, target);
        self.pose = pose;

        let touching =
            pose.is_valid && self.input.is_pointer_down() && !self.bristles.contacts().is_empty();
        if touching {
            if !self.painting {
                self.begin_stroke();
            }
            self.paint(dt, destination);
        } else if self.painting {
            self.end_stroke();
        }

        if let Err(e) = self.settle_fluid(dt, destination) {
            self.disable_fluid(e);
        }

        self.report_coverage();
        steps
    }

    fn paint(&mut self, dt: f32, destination: &mut CpuSurface) {
        if let Some(uv) = self.pose.uv
            && self.fluid_enabled
            && let Some(fluid) = self.fluid.as_mut()
        {
            let velocity = match self.last_uv {
                Some(last) if dt > 0.0 => (uv - last) / dt * self.config.fluid.splat_force,
                _ => Vec2::ZERO,
            };
            self.last_uv = Some(uv);
            match fluid.splat(uv.x, uv.y, velocity, self.color) {
                Ok(()) => return,
                Err(e) => self.disable_fluid(e),
            }
        }

        self.compositor
            .paint(self.bristles.contacts(), self.color, self.opacity, destination);
    }

    fn settle_fluid(&mut self, dt: f32, destination: &mut CpuSurface) -> Result<(), FluidError> {
        if !self.fluid_enabled {
            return Ok(());
        }
        let Some(fluid) = self.fluid.as_mut() else {
            return Ok(());
        };
        fluid.step(dt)?;
        fluid.copy_to(destination)
    }

    fn disable_fluid(&mut self, error: FluidError) {
        warn!(
            "BrushController: fluid solver failed ({}), falling back to direct paint",
            error
        );
        self.fluid = None;
        self.last_uv = None;
        self.compositor.reset_stroke();
    }

    fn begin_stroke(&mut self) {
        self.painting = true;
        self.last_uv = None;
        self.compositor.reset_stroke();
        debug!("BrushController: stroke started");
        if let Some(callback) = self.callbacks.on_paint_start.as_mut() {
            callback();
        }
    }

    fn end_stroke(&mut self) {
        self.last_uv = None;
        self.compositor.reset_stroke();
        if !self.painting {
            return;
        }
        self.painting = false;
        debug!("BrushController: stroke ended");
        if let Some(callback) = self.callbacks.on_paint_end.as_mut() {
            callback();
        }
    }

    fn report_coverage(&mut self) {
        if self.callbacks.on_coverage_change.is_none() {
            return;
        }
        let coverage = self.coverage();
        if (coverage - self.last_reported_coverage).abs() < COVERAGE_REPORT_STEP
            && !(coverage == 0.0 && self.last_reported_coverage != 0.0)
        {
            return;
        }
        self.last_reported_coverage = coverage;
        if let Some(callback) = self.callbacks.on_coverage_change.as_mut() {
            callback(coverage);
        }
    }

    /// Share of the nail painted so far, as a percentage (0-100).
    ///
    /// Reads the fluid field when it is driving the paint, otherwise the
    /// compositor's coverage grid.
    pub fn coverage(&mut self) -> f32 {
        let threshold = self.config.fluid.coverage_threshold;
        if self.fluid_enabled
            && let Some(fluid) = self.fluid.as_mut()
        {
            match fluid.coverage(threshold) {
                Ok(coverage) => return coverage,
                Err(e) => warn!("BrushController: coverage readback failed: {}", e),
            }
        }
        self.compositor.get_coverage()
    }

    /// Set the polish color (linear RGB, clamped to [0, 1])
    pub fn set_color(&mut self, color: [f32; 3]) {
        self.color = color.map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 });
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    /// Opacity of direct-paint strokes
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    pub fn set_finish(&mut self, finish: Finish) {
        self.finish = finish;
        self.compositor.set_finish(finish);
        debug!("BrushController: finish set to {}", finish);
    }

    pub fn finish(&self) -> Finish {
        self.finish
    }

    /// Material the host should shade the nail with
    pub fn material_params(&self) -> MaterialParams {
        self.finish.material_params()
    }

    /// Wipe the nail: fluid field, compositor stroke and coverage.
    ///
    /// The destination surface is cleared on the next `update`.
    pub fn clear_nail(&mut self) {
        if let Some(fluid) = self.fluid.as_mut()
            && let Err(e) = fluid.clear()
        {
            self.disable_fluid(e);
        }
        self.compositor.clear();
        self.last_uv = None;
        self.pending_clear = true;
        info!("BrushController: nail cleared");
    }

    /// Route painting through the fluid solver (when present) or the compositor
    pub fn set_fluid_enabled(&mut self, enabled: bool) {
        if self.fluid_enabled != enabled {
            self.fluid_enabled = enabled;
            self.last_uv = None;
            self.compositor.reset_stroke();
            info!("BrushController: fluid {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// True when strokes go into the fluid field
    pub fn is_fluid_active(&self) -> bool {
        self.fluid_enabled && self.fluid.is_some()
    }

    /// Deactivate and release the fluid solver and its GPU resources.
    /// The controller ignores activation afterwards.
    pub fn dispose(&mut self, host: &mut dyn PointerHost) {
        if self.disposed {
            return;
        }
        self.deactivate(host);
        self.fluid = None;
        self.disposed = true;
        info!("BrushController: disposed");
    }

    pub fn on_paint_start(&mut self, callback: impl FnMut() + Send + Sync + 'static) {
        self.callbacks.on_paint_start = Some(Box::new(callback));
    }

    pub fn on_paint_end(&mut self, callback: impl FnMut() + Send + Sync + 'static) {
        self.callbacks.on_paint_end = Some(Box::new(callback));
    }

    pub fn on_coverage_change(&mut self, callback: impl FnMut(f32) + Send + Sync + 'static) {
        self.callbacks.on_coverage_change = Some(Box::new(callback));
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_brush_visible(&self) -> bool {
        self.brush_visible
    }

    pub fn is_painting(&self) -> bool {
        self.painting
    }

    /// Pose computed by the latest update
    pub fn pose(&self) -> &BrushPose {
        &self.pose
    }

    pub fn pressure(&self) -> f32 {
        self.input.pressure()
    }

    pub fn bristles(&self) -> &BristleSystem {
        &self.bristles
    }

    /// Bristle segment transforms for the host's instanced renderer
    pub fn segment_transforms(&self) -> &[SegmentTransform] {
        self.bristles.segment_transforms()
    }

    pub fn fluid_mut(&mut self) -> Option<&mut FluidSimulator> {
        self.fluid.as_mut()
    }

    pub fn config(&self) -> &BrushConfig {
        &self.config
    }
}

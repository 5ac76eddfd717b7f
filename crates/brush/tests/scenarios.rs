//! End-to-end brush scenarios driven through `BrushController`

use glam::{Mat4, Vec2, Vec3};
use polish_brush::*;

const FRAME: f64 = 1.0 / 60.0;
const VIEWPORT: f32 = 200.0;

fn camera() -> ViewCamera {
    ViewCamera::look_at(
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::ZERO,
        Vec3::Y,
        45f32.to_radians(),
        Vec2::splat(VIEWPORT),
    )
}

fn nail() -> TargetSurface {
    TargetSurface::new(SurfaceMesh::quad(1.0, 1.0), Mat4::IDENTITY)
}

fn fluid_controller(resolution: u32) -> BrushController {
    let config = BrushConfig {
        fluid: FluidConfig {
            resolution,
            ..Default::default()
        },
        ..Default::default()
    };
    let fluid = FluidSimulator::cpu(&config.fluid).unwrap();
    BrushController::new(config, Some(fluid))
}

struct Session {
    hub: PointerHub,
    controller: BrushController,
    target: TargetSurface,
    camera: ViewCamera,
    destination: CpuSurface,
    frame: usize,
}

impl Session {
    fn new(controller: BrushController, texture: u32) -> Self {
        let mut session = Self {
            hub: PointerHub::new(),
            controller,
            target: nail(),
            camera: camera(),
            destination: CpuSurface::new(texture, texture),
            frame: 0,
        };
        session.controller.activate(&mut session.hub);
        session
    }

    fn send(&mut self, kind: PointerEventKind, position: Vec2) {
        self.hub.dispatch(PointerEvent::new(kind, position));
    }

    fn tick(&mut self) -> usize {
        let time = self.frame as f64 * FRAME;
        self.frame += 1;
        self.controller
            .update(time, &self.target, &self.camera, &mut self.destination)
    }

    fn run(&mut self, frames: usize) {
        for _ in 0..frames {
            self.tick();
        }
    }
}

#[test]
fn test_hold_at_center_reaches_splat_strength() {
    let mut session = Session::new(fluid_controller(256), 128);
    session.send(PointerEventKind::Press, Vec2::splat(VIEWPORT * 0.5));
    session.run(61);

    let controller = &mut session.controller;
    assert_eq!(controller.pressure(), 1.0);
    assert!(controller.pose().is_valid);
    assert_eq!(controller.bristles().bristle_count(), 128);

    let floor = controller.config().bristles.pressure_floor;
    let contacts = controller.bristles().contacts();
    assert!(!contacts.is_empty());
    assert!(contacts.iter().all(|c| c.pressure >= floor && c.pressure <= 1.0));
    assert!(contacts.iter().any(|c| c.pressure > floor));

    let strength = controller.config().fluid.splat_strength;
    let alpha = controller
        .fluid_mut()
        .unwrap()
        .sample_paint(Vec2::splat(0.5))
        .unwrap()[3];
    // Nearest cell centers sit half a cell off the splat center on both axes
    assert!(alpha >= 0.95 * strength, "alpha {} below ceiling", alpha);
    assert!(alpha <= strength + 1e-5);
}

#[test]
fn test_hover_never_touches() {
    let mut session = Session::new(fluid_controller(32), 32);
    for frame in 0..60 {
        let x = VIEWPORT * (0.4 + 0.2 * frame as f32 / 60.0);
        session.send(PointerEventKind::Move, Vec2::new(x, VIEWPORT * 0.5));
        session.tick();
        assert!(session.controller.pose().is_valid);
        assert!(session.controller.bristles().contacts().is_empty());
        assert!(!session.controller.is_painting());
    }

    let field = session.controller.fluid_mut().unwrap().paint_field().unwrap();
    assert!(field.iter().all(|cell| *cell == [0.0; 4]));
    assert_eq!(session.controller.coverage(), 0.0);
}

#[test]
fn test_pointer_off_surface_never_paints() {
    let mut session = Session::new(fluid_controller(32), 32);
    // Viewport corner is outside the nail quad
    session.send(PointerEventKind::Press, Vec2::new(2.0, 2.0));

    for _ in 0..60 {
        session.tick();
        assert!(!session.controller.pose().is_valid);
        assert!(session.controller.bristles().contacts().is_empty());
    }

    session.send(PointerEventKind::Move, Vec2::new(VIEWPORT - 2.0, 2.0));
    session.run(30);

    let field = session.controller.fluid_mut().unwrap().paint_field().unwrap();
    assert!(field.iter().all(|cell| *cell == [0.0; 4]));
    assert!(session.destination.pixels().iter().all(|p| p[3] == 0.0));
}

#[test]
fn test_clear_nail_reports_zero_coverage() {
    for fluid in [true, false] {
        let controller = if fluid {
            fluid_controller(64)
        } else {
            BrushController::new(BrushConfig::default(), None)
        };
        let mut session = Session::new(controller, 64);
        session.send(PointerEventKind::Press, Vec2::splat(VIEWPORT * 0.5));
        session.run(30);
        session.send(PointerEventKind::Move, Vec2::new(VIEWPORT * 0.6, VIEWPORT * 0.5));
        session.run(10);
        assert!(session.controller.coverage() > 0.0);

        session.controller.clear_nail();
        assert_eq!(session.controller.coverage(), 0.0);
    }
}

#[test]
fn test_substeps_bounded_under_stalls() {
    let mut session = Session::new(BrushController::new(BrushConfig::default(), None), 32);
    session.send(PointerEventKind::Press, Vec2::splat(VIEWPORT * 0.5));
    let bound = session.controller.config().bristles.max_substeps();

    for time in [0.0, 0.016, 3.0, 3.001, 10.0, 10.5] {
        let steps = session
            .controller
            .update(time, &session.target, &session.camera, &mut session.destination);
        assert!(steps <= bound, "{} steps at t={}", steps, time);
    }
}

#[test]
fn test_stroke_keeps_bristle_invariants() {
    let mut session = Session::new(BrushController::new(BrushConfig::default(), None), 64);
    let bases: Vec<Vec3> = session
        .controller
        .bristles()
        .bristles()
        .iter()
        .map(|b| b.joints[0])
        .collect();
    let config = session.controller.config().bristles.clone();
    let epsilon = config.constraint_tolerance * config.segment_length();

    session.send(PointerEventKind::Press, Vec2::new(80.0, 100.0));
    for frame in 0..120 {
        let x = 80.0 + frame as f32 * 0.3;
        session.send(PointerEventKind::Move, Vec2::new(x, 100.0));
        let steps = session.tick();

        let bristles = session.controller.bristles();
        if steps > 0 {
            assert!(bristles.max_segment_error() < epsilon);
        }
        for (bristle, base) in bristles.bristles().iter().zip(&bases) {
            assert_eq!(bristle.joints[0], *base);
        }
        let pressure = session.controller.pressure();
        assert!((0.0..=1.0).contains(&pressure));
    }
    assert!(session.controller.coverage() > 0.0);
}

#[test]
fn test_compositor_throttle_is_noop() {
    let mut compositor = DirectPaintCompositor::new(CompositorConfig::default());
    let mut surface = CpuSurface::new(256, 256);
    let contact = |uv: Vec2| ContactPoint {
        position: Vec3::ZERO,
        uv,
        normal: Vec3::Z,
        pressure: 0.6,
        bristle_index: 3,
    };

    assert!(compositor.paint(&[contact(Vec2::splat(0.5))], [0.8, 0.1, 0.2], 1.0, &mut surface));
    let covered = compositor.coverage_grid().covered_cells();

    for step in 1..5 {
        let uv = Vec2::splat(0.5) + Vec2::new(step as f32 * 0.1 / 256.0, 0.0);
        assert!(!compositor.paint(&[contact(uv)], [0.8, 0.1, 0.2], 1.0, &mut surface));
    }
    assert_eq!(compositor.coverage_grid().covered_cells(), covered);
}

//! Scripted pointer input standing in for a user's stroke

use glam::Vec2;
use polish_brush::{PointerEvent, PointerEventKind};

/// Frames spent hovering before the first press
const LEAD_IN_FRAMES: usize = 10;

/// Horizontal passes across the nail
const PASSES: usize = 5;

/// A boustrophedon swipe over the central part of the viewport.
///
/// Each pass presses at one side, drags across and releases, so the brush
/// lifts between rows the way a person repaints a nail.
#[derive(Debug, Clone)]
pub struct SwipeGesture {
    viewport: Vec2,
    frames: usize,
}

impl SwipeGesture {
    pub fn new(viewport: Vec2, frames: usize) -> Self {
        Self { viewport, frames }
    }

    /// Events to dispatch before simulating `frame`
    pub fn events(&self, frame: usize) -> Vec<PointerEvent> {
        if frame < LEAD_IN_FRAMES {
            let hover = self.point(0, 0.0);
            return vec![PointerEvent::new(PointerEventKind::Move, hover)];
        }

        let active = self.frames.saturating_sub(LEAD_IN_FRAMES).max(PASSES);
        let per_pass = (active / PASSES).max(2);
        let local = frame - LEAD_IN_FRAMES;
        let pass = local / per_pass;
        if pass >= PASSES {
            return Vec::new();
        }

        let step = local % per_pass;
        let t = step as f32 / (per_pass - 1) as f32;
        let position = self.point(pass, t);

        match step {
            0 => vec![PointerEvent::new(PointerEventKind::Press, position)],
            s if s + 1 == per_pass => vec![PointerEvent::new(PointerEventKind::Release, position)],
            _ => vec![PointerEvent::new(PointerEventKind::Move, position)],
        }
    }

    fn point(&self, pass: usize, t: f32) -> Vec2 {
        let t = if pass % 2 == 0 { t } else { 1.0 - t };
        let row = (pass as f32 + 0.5) / PASSES as f32;
        Vec2::new(
            self.viewport.x * (0.2 + 0.6 * t),
            self.viewport.y * (0.2 + 0.6 * row),
        )
    }
}

//! Pointer input to brush pose mapping
//!
//! The host owns the pointer source ([`PointerHost`]); the [`InputMapper`]
//! registers a channel listener on attach, drains events once per frame and
//! turns the latest pointer position into a [`BrushPose`] by raycasting
//! against the target surface.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use glam::{Mat4, Vec2, Vec3};
use polish_config::InputConfig;
use tracing::{debug, info};

use crate::raycast::RaycastTarget;
use crate::types::{BrushPose, Ray};

/// Kinds of pointer events the mapper listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Press,
    Move,
    Release,
    Leave,
    Cancel,
}

/// A pointer event in viewport pixel coordinates (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub position: Vec2,
    /// Device pressure when the hardware reports it (pen/touch)
    pub pressure: Option<f32>,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            pressure: None,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = Some(pressure);
        self
    }
}

/// Cursor appearance over the target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    #[default]
    Default,
    Crosshair,
    /// Cursor hidden while the 3D brush is shown
    Hidden,
}

/// Handle returned by [`PointerHost::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The element that produces pointer events and owns the cursor
pub trait PointerHost {
    /// Register a listener; events are delivered over the sender until removed
    fn add_listener(&mut self, sender: Sender<PointerEvent>) -> ListenerId;

    /// Remove a listener. Returns false if it was not registered.
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    /// Change the cursor, returning the previous style
    fn set_cursor(&mut self, style: CursorStyle) -> CursorStyle;

    fn cursor(&self) -> CursorStyle;
}

/// In-process pointer source that fans events out to registered listeners
#[derive(Debug, Default)]
pub struct PointerHub {
    listeners: Vec<(ListenerId, Sender<PointerEvent>)>,
    next_id: u64,
    cursor: CursorStyle,
}

impl PointerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every listener, returning how many received it.
    ///
    /// Listeners whose receiving end has been dropped are pruned.
    pub fn dispatch(&mut self, event: PointerEvent) -> usize {
        let before = self.listeners.len();
        self.listeners
            .retain(|(_, sender)| sender.send(event).is_ok());
        let pruned = before - self.listeners.len();
        if pruned > 0 {
            debug!("PointerHub: pruned {} disconnected listener(s)", pruned);
        }
        self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl PointerHost for PointerHub {
    fn add_listener(&mut self, sender: Sender<PointerEvent>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, sender));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    fn set_cursor(&mut self, style: CursorStyle) -> CursorStyle {
        std::mem::replace(&mut self.cursor, style)
    }

    fn cursor(&self) -> CursorStyle {
        self.cursor
    }
}

/// Perspective camera used to turn viewport positions into world rays
#[derive(Debug, Clone, Copy)]
pub struct ViewCamera {
    position: Vec3,
    inverse_view_projection: Mat4,
    viewport: Vec2,
}

impl ViewCamera {
    const NEAR: f32 = 0.01;
    const FAR: f32 = 100.0;

    /// Right-handed look-at camera. `fov_y` in radians, `viewport` in pixels.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, viewport: Vec2) -> Self {
        let viewport = viewport.max(Vec2::ONE);
        let view = Mat4::look_at_rh(eye, target, up);
        let projection = Mat4::perspective_rh(fov_y, viewport.x / viewport.y, Self::NEAR, Self::FAR);
        Self {
            position: eye,
            inverse_view_projection: (projection * view).inverse(),
            viewport,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// World ray through a viewport pixel position
    pub fn screen_ray(&self, screen: Vec2) -> Ray {
        let ndc = Vec2::new(
            2.0 * screen.x / self.viewport.x - 1.0,
            1.0 - 2.0 * screen.y / self.viewport.y,
        );
        let near = self
            .inverse_view_projection
            .project_point3(ndc.extend(0.0));
        let far = self
            .inverse_view_projection
            .project_point3(ndc.extend(1.0));
        Ray::new(near, far - near)
    }
}

/// Converts pointer input into a brush pose and a simulated pressure value
#[derive(Debug)]
pub struct InputMapper {
    config: InputConfig,
    receiver: Option<Receiver<PointerEvent>>,
    listener: Option<ListenerId>,
    /// Latest pointer position, `None` while outside the element
    pointer: Option<Vec2>,
    pointer_down: bool,
    device_pressure: Option<f32>,
    pressure: f32,
}

impl InputMapper {
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            receiver: None,
            listener: None,
            pointer: None,
            pointer_down: false,
            device_pressure: None,
            pressure: 0.0,
        }
    }

    /// Register pointer listeners on the host. Calling twice is a no-op.
    pub fn attach(&mut self, host: &mut dyn PointerHost) {
        if self.listener.is_some() {
            return;
        }
        let (sender, receiver) = unbounded();
        self.listener = Some(host.add_listener(sender));
        self.receiver = Some(receiver);
        info!("InputMapper: attached");
    }

    /// Deregister listeners and forget any held pointer state.
    ///
    /// Safe to call when not attached.
    pub fn detach(&mut self, host: &mut dyn PointerHost) {
        if let Some(id) = self.listener.take() {
            host.remove_listener(id);
            info!("InputMapper: detached");
        }
        self.receiver = None;
        self.pointer_down = false;
        self.device_pressure = None;
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Drain pending pointer events. Returns the number processed.
    pub fn pump_events(&mut self) -> usize {
        let Some(receiver) = self.receiver.as_ref() else {
            return 0;
        };

        let mut events = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("InputMapper: pointer host disconnected");
                    break;
                }
            }
        }

        for event in &events {
            self.handle_event(event);
        }
        events.len()
    }

    fn handle_event(&mut self, event: &PointerEvent) {
        let device_pressure = event.pressure.filter(|p| *p > 0.0).map(|p| p.min(1.0));
        match event.kind {
            PointerEventKind::Press => {
                self.pointer = Some(event.position);
                self.pointer_down = true;
                self.device_pressure = device_pressure;
            }
            PointerEventKind::Move => {
                self.pointer = Some(event.position);
                if self.pointer_down && device_pressure.is_some() {
                    self.device_pressure = device_pressure;
                }
            }
            PointerEventKind::Release => {
                self.pointer = Some(event.position);
                self.pointer_down = false;
                self.device_pressure = None;
            }
            PointerEventKind::Leave | PointerEventKind::Cancel => {
                self.pointer = None;
                self.pointer_down = false;
                self.device_pressure = None;
            }
        }
    }

    /// Advance the pressure model by `dt` seconds.
    ///
    /// Device pressure is used directly when reported; otherwise pressure
    /// ramps toward 1 while held and decays toward 0 after release.
    pub fn update_pressure(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let next = match (self.pointer_down, self.device_pressure) {
            (true, Some(device)) => device,
            (true, None) => self.pressure + self.config.pressure_ramp_rate * dt,
            (false, _) => self.pressure - self.config.pressure_decay_rate * dt,
        };

        self.pressure = if next.is_finite() {
            next.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Current pressure, always in [0, 1]
    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    pub fn is_pointer_down(&self) -> bool {
        self.pointer_down
    }

    pub fn pointer_position(&self) -> Option<Vec2> {
        self.pointer
    }

    /// Raycast the pointer against the target and place the brush head.
    ///
    /// On a hit the pose is valid and sits above the hit point along the
    /// viewer-facing normal, lower with more pressure. On a miss (or with the
    /// pointer outside the element) the pose is invalid and parked along the
    /// view ray so the brush stays visible.
    pub fn get_brush_transform(&self, target: &dyn RaycastTarget, camera: &ViewCamera) -> BrushPose {
        let screen = self.pointer.unwrap_or(camera.viewport() * 0.5);
        let ray = camera.screen_ray(screen);

        let hit = self
            .pointer
            .and_then(|_| target.raycast(&ray, f32::INFINITY));

        let Some(hit) = hit else {
            return BrushPose {
                position: ray.at(self.config.miss_distance),
                normal: -ray.direction,
                pressure: self.pressure,
                is_valid: false,
                uv: None,
            };
        };

        let normal = if hit.normal.dot(ray.direction) > 0.0 {
            -hit.normal
        } else {
            hit.normal
        };

        let height = self.config.hover_height
            + (self.config.press_height - self.config.hover_height) * self.pressure;

        BrushPose {
            position: hit.position + normal * height,
            normal,
            pressure: self.pressure,
            is_valid: true,
            uv: Some(target.resolve_uv(&hit)),
        }
    }
}

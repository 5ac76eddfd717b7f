//! Polish brush simulation - bristle physics coupled to a paint field
//!
//! This crate provides the real-time brush used to lay polish onto a
//! raycastable surface:
//! - [`input`] - Pointer events to brush pose and simulated pressure
//! - [`bristle`] - Multi-joint bristle physics with surface contacts
//! - [`fluid`] - Stable-fluids paint/velocity grid in surface UV space
//! - [`compositor`] - Direct stroke rasterizer used when no solver is available
//! - [`controller`] - Per-frame orchestration of all of the above
//! - [`raycast`] - Ray-mesh intersection and the target surface abstraction
//! - [`surface`] - CPU RGBA destination texture
//! - [`finish`] - Polish finish profiles and material parameters
//!
//! The crate is host-agnostic: a frame loop owned by the application calls
//! [`controller::BrushController::update`] once per frame.

pub mod bristle;
pub mod compositor;
pub mod constants;
pub mod controller;
pub mod finish;
pub mod fluid;
pub mod input;
pub mod raycast;
pub mod surface;
pub mod types;

pub use bristle::*;
pub use compositor::*;
pub use constants::*;
pub use controller::*;
pub use finish::*;
pub use fluid::*;
pub use input::*;
pub use raycast::*;
pub use surface::*;
pub use types::*;

pub use polish_config::{
    BristleConfig, BrushConfig, CompositorConfig, ConfigError, FluidConfig, InputConfig,
};

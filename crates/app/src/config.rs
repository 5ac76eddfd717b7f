//! Demo configuration, read from the environment

use std::path::PathBuf;

use polish_brush::Finish;
use tracing::warn;

/// Which paint path the demo wires into the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FluidMode {
    /// Reference grid solver on the CPU (default, always available)
    #[default]
    Cpu,
    /// wgpu compute solver; falls back to direct paint without an adapter
    Gpu,
    /// No solver: strokes go straight through the direct-paint compositor
    Off,
}

impl FluidMode {
    /// Parse from environment variable POLISH_FLUID
    pub fn from_env() -> Self {
        match std::env::var("POLISH_FLUID").as_deref() {
            Ok("gpu") => Self::Gpu,
            Ok("off") | Ok("direct") => Self::Off,
            Ok("cpu") | Ok(_) | Err(_) => Self::Cpu,
        }
    }
}

/// Demo settings
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub fluid_mode: FluidMode,
    /// Optional JSON file with `BrushConfig` overrides (POLISH_CONFIG)
    pub brush_config: Option<PathBuf>,
    /// Frames to simulate at 60 Hz (POLISH_FRAMES)
    pub frames: usize,
    /// Destination texture edge length (POLISH_TEXTURE_SIZE)
    pub texture_size: u32,
    /// PNG written after the run (POLISH_OUTPUT)
    pub output: PathBuf,
    /// Polish finish identifier (POLISH_FINISH)
    pub finish: Finish,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fluid_mode: FluidMode::from_env(),
            brush_config: std::env::var_os("POLISH_CONFIG").map(PathBuf::from),
            frames: env_parse("POLISH_FRAMES", 240),
            texture_size: env_parse("POLISH_TEXTURE_SIZE", polish_brush::DEFAULT_TEXTURE_SIZE),
            output: std::env::var_os("POLISH_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("polish.png")),
            finish: env_parse("POLISH_FINISH", Finish::default()),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            warn!("Ignoring {}={:?}: {}", key, value, e);
            default
        }),
        Err(_) => default,
    }
}

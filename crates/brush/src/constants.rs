/// Epsilon for floating point comparisons in ray intersection.
pub const RAY_EPSILON: f32 = 1e-6;

/// Segments shorter than this are treated as collapsed and get no render transform.
pub const MIN_SEGMENT_LENGTH: f32 = 1e-6;

/// A pose jump longer than this multiple of the bristle length re-seats the bristles at rest.
pub const MAX_INERTIA_JUMP: f32 = 1.0;

/// Bristles taper to this fraction of their base radius at the tip.
pub const TIP_TAPER: f32 = 0.35;

/// Default destination texture edge length used by the demo host.
pub const DEFAULT_TEXTURE_SIZE: u32 = 512;

/// Coverage must move by at least this many percentage points before the coverage callback fires again.
pub const COVERAGE_REPORT_STEP: f32 = 0.1;

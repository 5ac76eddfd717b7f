//! Direct-paint compositor used when no fluid solver is available
//!
//! Strokes are drawn straight into the destination surface between
//! successive pressure-weighted contact centroids. Each segment is layered:
//! a darker, wider underlay for edge shading, the main stroke, and a thin
//! highlight offset perpendicular to the stroke direction.

use glam::Vec2;
use polish_config::CompositorConfig;
use tracing::debug;

use crate::finish::Finish;
use crate::surface::CpuSurface;
use crate::types::ContactPoint;

/// Blend factor from the main color toward white for the gloss highlight
const HIGHLIGHT_LIGHTEN: f32 = 0.7;

/// Width fraction of the main stroke at zero contact pressure
const MIN_PRESSURE_WIDTH: f32 = 0.35;

/// Coarse per-cell coverage, used only for completion reporting
#[derive(Debug, Clone)]
pub struct CoverageGrid {
    size: u32,
    cells: Vec<bool>,
    covered: usize,
}

impl CoverageGrid {
    pub fn new(size: u32) -> Self {
        let size = size.max(1);
        Self {
            size,
            cells: vec![false; (size as usize) * (size as usize)],
            covered: 0,
        }
    }

    /// Mark every cell whose center lies within `radius` (UV units) of the segment
    pub fn mark_segment(&mut self, from: Vec2, to: Vec2, radius: f32) {
        if radius <= 0.0 || !(from.is_finite() && to.is_finite()) {
            return;
        }

        let n = self.size as f32;
        let lo = ((from.min(to) - Vec2::splat(radius)) * n).floor().max(Vec2::ZERO);
        let hi = ((from.max(to) + Vec2::splat(radius)) * n).ceil().min(Vec2::splat(n));

        let segment = to - from;
        let length_sq = segment.length_squared();

        for y in lo.y as u32..hi.y as u32 {
            for x in lo.x as u32..hi.x as u32 {
                let center = (Vec2::new(x as f32, y as f32) + 0.5) / n;
                let t = if length_sq > 0.0 {
                    ((center - from).dot(segment) / length_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if (center - (from + segment * t)).length() > radius {
                    continue;
                }
                let index = (y as usize) * (self.size as usize) + (x as usize);
                if !self.cells[index] {
                    self.cells[index] = true;
                    self.covered += 1;
                }
            }
        }
    }

    /// Covered share of the grid as a percentage (0-100)
    pub fn percentage(&self) -> f32 {
        self.covered as f32 / self.cells.len() as f32 * 100.0
    }

    pub fn covered_cells(&self) -> usize {
        self.covered
    }

    pub fn clear(&mut self) {
        self.cells.fill(false);
        self.covered = 0;
    }
}

/// Fallback painter: contacts in, layered strokes out
#[derive(Debug, Clone)]
pub struct DirectPaintCompositor {
    config: CompositorConfig,
    finish: Finish,
    /// Last painted centroid in destination pixels
    last_point: Option<Vec2>,
    coverage: CoverageGrid,
}

impl DirectPaintCompositor {
    pub fn new(config: CompositorConfig) -> Self {
        let coverage = CoverageGrid::new(config.coverage_grid);
        Self {
            config,
            finish: Finish::default(),
            last_point: None,
            coverage,
        }
    }

    pub fn set_finish(&mut self, finish: Finish) {
        self.finish = finish;
    }

    pub fn finish(&self) -> Finish {
        self.finish
    }

    /// Paint the current contact set into `surface`.
    ///
    /// The first call after a reset lays a single dab at the centroid. After
    /// that a segment is drawn only once the centroid has travelled at least
    /// `min_distance` pixels from the last painted point; shorter moves are a
    /// no-op. Returns whether anything was drawn.
    pub fn paint(
        &mut self,
        contacts: &[ContactPoint],
        color: [f32; 3],
        opacity: f32,
        surface: &mut CpuSurface,
    ) -> bool {
        let Some((centroid_uv, pressure)) = weighted_centroid(contacts) else {
            return false;
        };
        let size = Vec2::new(surface.width as f32, surface.height as f32);
        let point = centroid_uv * size;

        let from = match self.last_point {
            Some(last) if last.distance(point) < self.config.min_distance => return false,
            Some(last) => last,
            None => point,
        };

        let width = self.config.stroke_width * (MIN_PRESSURE_WIDTH + (1.0 - MIN_PRESSURE_WIDTH) * pressure);
        self.draw_layers(surface, from, point, width, color, opacity.clamp(0.0, 1.0));

        self.coverage
            .mark_segment(from / size, point / size, width * 0.5 / size.max_element());
        self.last_point = Some(point);

        debug!(
            "DirectPaintCompositor::paint: {} contacts, centroid=({:.1}, {:.1}), width={:.1}",
            contacts.len(),
            point.x,
            point.y,
            width
        );
        true
    }

    fn draw_layers(
        &self,
        surface: &mut CpuSurface,
        from: Vec2,
        to: Vec2,
        width: f32,
        color: [f32; 3],
        opacity: f32,
    ) {
        let profile = self.finish.profile();
        let radius = width * 0.5;

        let shade = 1.0 - profile.underlay_darkening;
        let underlay = [color[0] * shade, color[1] * shade, color[2] * shade, 1.0];
        surface.stroke_segment(
            from,
            to,
            radius * self.config.underlay_width_scale,
            underlay,
            opacity * self.config.underlay_opacity,
            profile.hardness * 0.5,
        );

        let main = [color[0], color[1], color[2], 1.0];
        surface.stroke_segment(from, to, radius, main, opacity, profile.hardness);

        if profile.highlight <= 0.0 {
            return;
        }
        let direction = (to - from).normalize_or_zero();
        let offset = direction.perp() * width * self.config.highlight_offset;
        let light = color.map(|c| c + (1.0 - c) * HIGHLIGHT_LIGHTEN);
        surface.stroke_segment(
            from + offset,
            to + offset,
            radius * self.config.highlight_width_scale,
            [light[0], light[1], light[2], 1.0],
            opacity * profile.highlight,
            profile.hardness,
        );
    }

    /// Coverage percentage (0-100) since the last clear
    pub fn get_coverage(&self) -> f32 {
        self.coverage.percentage()
    }

    pub fn coverage_grid(&self) -> &CoverageGrid {
        &self.coverage
    }

    /// Forget the last painted point so the next stroke starts fresh
    pub fn reset_stroke(&mut self) {
        self.last_point = None;
    }

    /// Reset stroke state and coverage
    pub fn clear(&mut self) {
        self.last_point = None;
        self.coverage.clear();
    }
}

/// Pressure-weighted mean UV and mean pressure of a contact set
fn weighted_centroid(contacts: &[ContactPoint]) -> Option<(Vec2, f32)> {
    let (sum, weight, count) = contacts
        .iter()
        .filter(|c| c.uv.is_finite() && c.pressure.is_finite())
        .fold((Vec2::ZERO, 0.0, 0usize), |(sum, weight, count), c| {
            let p = c.pressure.clamp(0.0, 1.0);
            (sum + c.uv * p, weight + p, count + 1)
        });
    if weight <= 0.0 {
        return None;
    }
    let mean_pressure = (weight / count as f32).clamp(0.0, 1.0);
    Some((sum / weight, mean_pressure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn contact(uv: Vec2, pressure: f32) -> ContactPoint {
        ContactPoint {
            position: Vec3::ZERO,
            uv,
            normal: Vec3::Z,
            pressure,
            bristle_index: 0,
        }
    }

    fn compositor() -> DirectPaintCompositor {
        DirectPaintCompositor::new(CompositorConfig::default())
    }

    #[test]
    fn test_weighted_centroid() {
        let contacts = [contact(Vec2::new(0.2, 0.5), 0.25), contact(Vec2::new(0.6, 0.5), 0.75)];
        let (uv, pressure) = weighted_centroid(&contacts).unwrap();
        assert!((uv - Vec2::new(0.5, 0.5)).length() < 1e-6);
        assert!((pressure - 0.5).abs() < 1e-6);
        assert!(weighted_centroid(&[]).is_none());
    }

    #[test]
    fn test_weighted_centroid_skips_non_finite() {
        let contacts = [
            contact(Vec2::new(f32::NAN, 0.5), 1.0),
            contact(Vec2::new(0.3, 0.4), 0.8),
            contact(Vec2::new(0.3, 0.4), f32::INFINITY),
        ];
        let (uv, pressure) = weighted_centroid(&contacts).unwrap();
        assert!((uv - Vec2::new(0.3, 0.4)).length() < 1e-6);
        assert!((pressure - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_first_contact_paints_dab() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(128, 128);

        let drawn = compositor.paint(&[contact(Vec2::splat(0.5), 1.0)], [1.0, 0.0, 0.0], 1.0, &mut surface);

        assert!(drawn);
        assert!(surface.get_pixel(64, 64).unwrap()[3] > 0.5);
        assert!(compositor.get_coverage() > 0.0);
    }

    #[test]
    fn test_below_min_distance_is_noop() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(128, 128);
        let color = [0.2, 0.4, 0.8];

        assert!(compositor.paint(&[contact(Vec2::splat(0.5), 1.0)], color, 1.0, &mut surface));
        let coverage = compositor.coverage_grid().covered_cells();
        let pixels = surface.pixels().to_vec();

        // One pixel of travel on a 128px surface, under the 3px threshold
        let nudged = Vec2::splat(0.5) + Vec2::new(1.0 / 128.0, 0.0);
        assert!(!compositor.paint(&[contact(nudged, 1.0)], color, 1.0, &mut surface));

        assert_eq!(compositor.coverage_grid().covered_cells(), coverage);
        assert_eq!(surface.pixels(), pixels.as_slice());
    }

    #[test]
    fn test_segment_connects_centroids() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(256, 256);

        compositor.paint(&[contact(Vec2::new(0.2, 0.5), 1.0)], [1.0; 3], 1.0, &mut surface);
        compositor.paint(&[contact(Vec2::new(0.8, 0.5), 1.0)], [1.0; 3], 1.0, &mut surface);

        // Midpoint of the segment is painted
        assert!(surface.get_pixel(128, 128).unwrap()[3] > 0.5);
    }

    #[test]
    fn test_reset_stroke_starts_fresh() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(256, 256);

        compositor.paint(&[contact(Vec2::new(0.2, 0.5), 1.0)], [1.0; 3], 1.0, &mut surface);
        compositor.reset_stroke();
        compositor.paint(&[contact(Vec2::new(0.8, 0.5), 1.0)], [1.0; 3], 1.0, &mut surface);

        assert_eq!(surface.get_pixel(128, 128).unwrap()[3], 0.0);
    }

    #[test]
    fn test_clear_resets_coverage() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(64, 64);
        compositor.paint(&[contact(Vec2::splat(0.5), 1.0)], [1.0; 3], 1.0, &mut surface);
        assert!(compositor.get_coverage() > 0.0);

        compositor.clear();
        assert_eq!(compositor.get_coverage(), 0.0);
    }

    #[test]
    fn test_zero_pressure_contacts_ignored() {
        let mut compositor = compositor();
        let mut surface = CpuSurface::new(64, 64);
        assert!(!compositor.paint(&[contact(Vec2::splat(0.5), 0.0)], [1.0; 3], 1.0, &mut surface));
    }

    #[test]
    fn test_coverage_grid_marks_capsule() {
        let mut grid = CoverageGrid::new(10);
        grid.mark_segment(Vec2::new(0.05, 0.05), Vec2::new(0.95, 0.05), 0.01);
        assert_eq!(grid.covered_cells(), 10);
        assert!((grid.percentage() - 10.0).abs() < 1e-4);
    }
}

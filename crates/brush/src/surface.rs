//! CPU destination surface - RGBA f32 storage for composited polish

use glam::Vec2;
use tracing::debug;

/// The destination drawable the brush writes into.
/// Stores pixels as [f32; 4] (linear RGBA, straight alpha), row-major.
#[derive(Debug, Clone)]
pub struct CpuSurface {
    /// Surface dimensions
    pub width: u32,
    pub height: u32,
    pixels: Vec<[f32; 4]>,
}

impl CpuSurface {
    /// Create a new surface with the given dimensions, initialized to transparent black
    pub fn new(width: u32, height: u32) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            pixels: vec![[0.0, 0.0, 0.0, 0.0]; pixel_count],
        }
    }

    /// Clear the surface to a solid color
    pub fn clear(&mut self, color: [f32; 4]) {
        self.pixels.fill(color);
    }

    /// Get a pixel at the given coordinates
    /// Returns None if coordinates are out of bounds
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize) * (self.width as usize) + (x as usize);
        Some(self.pixels[index])
    }

    /// Set a pixel at the given coordinates
    /// Does nothing if coordinates are out of bounds
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [f32; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y as usize) * (self.width as usize) + (x as usize);
        self.pixels[index] = color;
    }

    /// Blend a color onto an existing pixel using alpha compositing
    /// Formula: out = src * alpha + dst * (1 - alpha)
    #[inline]
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: [f32; 4], opacity: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y as usize) * (self.width as usize) + (x as usize);
        let dst = self.pixels[index];

        let src_alpha = (color[3] * opacity).clamp(0.0, 1.0);
        let inv_src_alpha = 1.0 - src_alpha;

        self.pixels[index] = [
            color[0] * src_alpha + dst[0] * inv_src_alpha,
            color[1] * src_alpha + dst[1] * inv_src_alpha,
            color[2] * src_alpha + dst[2] * inv_src_alpha,
            src_alpha + dst[3] * inv_src_alpha,
        ];
    }

    /// Rasterize a round-capped line segment (a capsule) with soft edges.
    ///
    /// Coordinates are in pixels. Returns the affected bounding box
    /// (x, y, width, height), or None if the segment is entirely off-surface.
    pub fn stroke_segment(
        &mut self,
        from: Vec2,
        to: Vec2,
        radius: f32,
        color: [f32; 4],
        opacity: f32,
        hardness: f32,
    ) -> Option<(u32, u32, u32, u32)> {
        if radius <= 0.0 || opacity <= 0.0 {
            return None;
        }

        let lo = from.min(to) - Vec2::splat(radius);
        let hi = from.max(to) + Vec2::splat(radius);

        let x_min = (lo.x.floor().max(0.0) as u32).min(self.width);
        let y_min = (lo.y.floor().max(0.0) as u32).min(self.height);
        let x_max = (hi.x.ceil().max(0.0) as u32).min(self.width);
        let y_max = (hi.y.ceil().max(0.0) as u32).min(self.height);

        if x_min >= x_max || y_min >= y_max {
            return None;
        }

        let segment = to - from;
        let length_sq = segment.length_squared();

        for py in y_min..y_max {
            for px in x_min..x_max {
                let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let t = if length_sq > 0.0 {
                    ((p - from).dot(segment) / length_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let distance = (p - (from + segment * t)).length() / radius;
                if distance > 1.0 {
                    continue;
                }

                let falloff = calculate_hardness_falloff(distance, hardness);
                if falloff > 0.0 {
                    self.blend_pixel(px, py, color, opacity * falloff);
                }
            }
        }

        debug!(
            "CpuSurface::stroke_segment: ({:.1}, {:.1}) -> ({:.1}, {:.1}), radius={:.1}",
            from.x, from.y, to.x, to.y, radius
        );

        Some((x_min, y_min, x_max - x_min, y_max - y_min))
    }

    /// Overwrite the surface with a square RGBA grid using nearest-sample scaling.
    ///
    /// This is lossy when the grid and surface resolutions differ.
    pub fn resample_nearest(&mut self, source: &[[f32; 4]], source_size: u32) {
        if source_size == 0 || source.len() < (source_size as usize).pow(2) {
            return;
        }

        let size = source_size as usize;
        for y in 0..self.height as usize {
            let sy = (y * size) / self.height as usize;
            let row = y * self.width as usize;
            for x in 0..self.width as usize {
                let sx = (x * size) / self.width as usize;
                self.pixels[row + x] = source[sy * size + sx];
            }
        }
    }

    /// Convert to 8-bit sRGB RGBA for upload or export
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            data.push(linear_to_srgb_u8(pixel[0]));
            data.push(linear_to_srgb_u8(pixel[1]));
            data.push(linear_to_srgb_u8(pixel[2]));
            data.push((pixel[3].clamp(0.0, 1.0) * 255.0) as u8);
        }
        data
    }

    /// Get raw pixel data for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Get the total number of pixels
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }
}

/// Calculate falloff based on hardness
/// distance_normalized is 0 at center, 1 at edge
/// hardness is 0.0 (soft) to 1.0 (hard)
#[inline]
pub fn calculate_hardness_falloff(distance_normalized: f32, hardness: f32) -> f32 {
    if hardness >= 1.0 {
        if distance_normalized <= 1.0 { 1.0 } else { 0.0 }
    } else {
        let t = distance_normalized.clamp(0.0, 1.0);
        let soft = 1.0 - t;
        soft * (1.0 - hardness) + hardness
    }
}

/// Convert linear color to sRGB u8.
pub fn linear_to_srgb_u8(linear: f32) -> u8 {
    let srgb = if linear <= 0.0031308 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    };
    (srgb.clamp(0.0, 1.0) * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_surface() {
        let surface = CpuSurface::new(100, 100);
        assert_eq!(surface.width, 100);
        assert_eq!(surface.height, 100);
        assert_eq!(surface.pixel_count(), 10000);
    }

    #[test]
    fn test_get_set_pixel() {
        let mut surface = CpuSurface::new(10, 10);
        let color = [1.0, 0.5, 0.25, 1.0];

        surface.set_pixel(5, 5, color);
        assert_eq!(surface.get_pixel(5, 5), Some(color));
        assert_eq!(surface.get_pixel(100, 100), None);
    }

    #[test]
    fn test_blend_pixel() {
        let mut surface = CpuSurface::new(10, 10);
        surface.clear([1.0, 1.0, 1.0, 1.0]);

        surface.blend_pixel(5, 5, [1.0, 0.0, 0.0, 1.0], 0.5);

        let result = surface.get_pixel(5, 5).unwrap();
        assert!((result[0] - 1.0).abs() < 0.01);
        assert!((result[1] - 0.5).abs() < 0.01);
        assert!((result[2] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_stroke_segment_paints_along_line() {
        let mut surface = CpuSurface::new(64, 64);
        let result = surface.stroke_segment(
            Vec2::new(10.0, 32.0),
            Vec2::new(50.0, 32.0),
            4.0,
            [1.0, 0.0, 0.0, 1.0],
            1.0,
            1.0,
        );
        assert!(result.is_some());

        // On the line
        assert!(surface.get_pixel(30, 32).unwrap()[3] > 0.99);
        // Well off the line
        assert_eq!(surface.get_pixel(30, 50).unwrap()[3], 0.0);
    }

    #[test]
    fn test_stroke_segment_off_surface() {
        let mut surface = CpuSurface::new(16, 16);
        let result = surface.stroke_segment(
            Vec2::new(-50.0, -50.0),
            Vec2::new(-40.0, -40.0),
            2.0,
            [1.0; 4],
            1.0,
            1.0,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_resample_nearest_upscale() {
        let source = vec![
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        let mut surface = CpuSurface::new(4, 4);
        surface.resample_nearest(&source, 2);

        assert_eq!(surface.get_pixel(0, 0), Some(source[0]));
        assert_eq!(surface.get_pixel(3, 0), Some(source[1]));
        assert_eq!(surface.get_pixel(1, 3), Some(source[2]));
        assert_eq!(surface.get_pixel(3, 3), Some(source[3]));
    }

    #[test]
    fn test_hardness_falloff() {
        assert_eq!(calculate_hardness_falloff(0.5, 1.0), 1.0);
        assert_eq!(calculate_hardness_falloff(0.0, 0.0), 1.0);
        assert_eq!(calculate_hardness_falloff(0.5, 0.0), 0.5);
        assert_eq!(calculate_hardness_falloff(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_to_rgba8() {
        let mut surface = CpuSurface::new(1, 1);
        surface.set_pixel(0, 0, [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(surface.to_rgba8(), vec![255, 0, 0, 127]);
    }

    #[test]
    fn test_as_bytes() {
        let surface = CpuSurface::new(2, 2);
        // 4 pixels * 4 components * 4 bytes per f32 = 64 bytes
        assert_eq!(surface.as_bytes().len(), 64);
    }
}

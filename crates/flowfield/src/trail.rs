// Persistent, fading offscreen trail buffer

use crate::cache::ViewportFieldCache;
use crate::palette::IntensityRamp;
use crate::particles::{ParticleSystem, Segment};
use glam::Vec2;
use image::{Rgba, Rgba32FImage, RgbaImage};
use rand::Rng;

/// Offscreen RGBA buffer (straight alpha) that survives across frames.
#[derive(Debug, Clone)]
pub struct TrailSurface {
    pixels: Rgba32FImage,
    /// Per-pixel coverage of the stroke in progress.
    coverage: Vec<f32>,
    touched: Vec<usize>,
}

impl TrailSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: Rgba32FImage::new(width, height),
            coverage: vec![0.0; (width * height) as usize],
            touched: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Reallocates and clears when the size differs. Returns whether it did.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.pixels.dimensions() == (width, height) {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn clear(&mut self) {
        self.pixels.pixels_mut().for_each(|p| *p = Rgba([0.0; 4]));
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        self.pixels.put_pixel(x, y, Rgba(rgba));
    }

    /// Destination-in with a fill of alpha `opacity`: alpha decays, colour is kept.
    pub fn fade(&mut self, opacity: f32) {
        for pixel in self.pixels.pixels_mut() {
            pixel.0[3] *= opacity;
        }
    }

    /// Strokes all segments as one path in a single colour, so overlaps within the
    /// batch do not accumulate.
    pub fn stroke_segments(&mut self, segments: impl IntoIterator<Item = Segment>, color: [f32; 4], line_width: f32) {
        let (width, height) = self.pixels.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let reach = line_width / 2.0 + 0.5;

        for segment in segments {
            let lo = segment.from.min(segment.to) - Vec2::splat(reach);
            let hi = segment.from.max(segment.to) + Vec2::splat(reach);
            let x0 = lo.x.floor().max(0.0) as u32;
            let y0 = lo.y.floor().max(0.0) as u32;
            let x1 = (hi.x.ceil().max(0.0) as u32).min(width - 1);
            let y1 = (hi.y.ceil().max(0.0) as u32).min(height - 1);
            if x0 > x1 || y0 > y1 {
                continue;
            }

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let distance = distance_to_segment(center, segment.from, segment.to);
                    let cover = (reach - distance).clamp(0.0, 1.0);
                    if cover <= 0.0 {
                        continue;
                    }
                    let index = (y * width + x) as usize;
                    if self.coverage[index] == 0.0 {
                        self.touched.push(index);
                    }
                    self.coverage[index] = self.coverage[index].max(cover);
                }
            }
        }

        for index in self.touched.drain(..) {
            let cover = std::mem::take(&mut self.coverage[index]);
            let x = index as u32 % width;
            let y = index as u32 / width;
            let dst = self.pixels.get_pixel_mut(x, y);
            dst.0 = source_over(color, color[3] * cover, dst.0);
        }
    }

    /// Source-over of the whole surface onto an 8-bit target of the same size.
    pub fn composite_onto(&self, target: &mut RgbaImage) {
        let width = self.pixels.width().min(target.width());
        let height = self.pixels.height().min(target.height());
        for y in 0..height {
            for x in 0..width {
                let src = self.pixels.get_pixel(x, y).0;
                if src[3] <= 0.0 {
                    continue;
                }
                let dst = target.get_pixel_mut(x, y);
                let below = dst.0.map(|c| c as f32 / 255.0);
                let blended = source_over(src, src[3], below);
                dst.0 = blended.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        let (width, height) = self.pixels.dimensions();
        let mut out = RgbaImage::new(width, height);
        self.composite_onto(&mut out);
        out
    }

    pub fn as_image(&self) -> &Rgba32FImage {
        &self.pixels
    }
}

fn distance_to_segment(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

/// Straight-alpha source-over; `alpha` replaces the source's own alpha.
fn source_over(src: [f32; 4], alpha: f32, dst: [f32; 4]) -> [f32; 4] {
    let out_alpha = alpha + dst[3] * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return [0.0; 4];
    }
    let mut out = [0.0, 0.0, 0.0, out_alpha];
    for k in 0..3 {
        out[k] = (src[k] * alpha + dst[k] * dst[3] * (1.0 - alpha)) / out_alpha;
    }
    out
}

/// Runs one animation frame: fade, evolve, stroke per bucket, commit, composite.
#[derive(Debug, Clone)]
pub struct TrailCompositor {
    surface: TrailSurface,
    fade_opacity: f32,
    line_width: f32,
}

impl TrailCompositor {
    pub fn new(width: u32, height: u32, fade_opacity: f32, line_width: f32) -> Self {
        Self {
            surface: TrailSurface::new(width, height),
            fade_opacity,
            line_width,
        }
    }

    pub fn surface(&self) -> &TrailSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut TrailSurface {
        &mut self.surface
    }

    pub fn set_fade_opacity(&mut self, opacity: f32) {
        self.fade_opacity = opacity;
    }

    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        self.surface.resize(width, height)
    }

    /// Returns the number of segments drawn.
    pub fn frame<R: Rng>(
        &mut self,
        particles: &mut ParticleSystem,
        cache: &ViewportFieldCache,
        ramp: &IntensityRamp,
        rng: &mut R,
        target: &mut RgbaImage,
    ) -> usize {
        self.surface.fade(self.fade_opacity);

        particles.evolve(cache, ramp, rng);

        let mut drawn = 0;
        for bucket in 0..particles.bucket_count() {
            let queued = particles.bucket(bucket).len();
            if queued == 0 {
                continue;
            }
            drawn += queued;
            self.surface
                .stroke_segments(particles.segments(bucket), ramp.color(bucket), self.line_width);
        }
        particles.commit();

        self.surface.composite_onto(target);
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn segment(from: (f32, f32), to: (f32, f32)) -> Segment {
        Segment {
            from: Vec2::new(from.0, from.1),
            to: Vec2::new(to.0, to.1),
        }
    }

    #[rstest]
    #[case(0.88)]
    #[case(0.97)]
    fn test_fade_decays_geometrically(#[case] opacity: f32) {
        let mut surface = TrailSurface::new(4, 4);
        surface.put_pixel(1, 1, [0.2, 0.4, 0.6, 1.0]);
        let mut previous = 1.0;
        for n in 1..=50 {
            surface.fade(opacity);
            let alpha = surface.pixel(1, 1)[3];
            assert!(alpha < previous);
            assert!((alpha - opacity.powi(n)).abs() < 1e-4);
            previous = alpha;
        }
        assert_eq!(&surface.pixel(1, 1)[..3], &[0.2, 0.4, 0.6]);
    }

    #[test]
    fn test_stroke_covers_pixels_along_segment() {
        let mut surface = TrailSurface::new(10, 10);
        surface.stroke_segments([segment((1.0, 5.5), (8.0, 5.5))], [1.0, 1.0, 1.0, 1.0], 0.65);
        assert!(surface.pixel(4, 5)[3] > 0.5);
        assert_eq!(surface.pixel(4, 0)[3], 0.0);
        assert_eq!(surface.pixel(9, 9)[3], 0.0);
    }

    #[test]
    fn test_overlapping_segments_in_one_batch_do_not_stack() {
        let mut once = TrailSurface::new(10, 10);
        once.stroke_segments([segment((1.0, 5.5), (8.0, 5.5))], [1.0, 1.0, 1.0, 0.5], 0.65);
        let mut twice = TrailSurface::new(10, 10);
        twice.stroke_segments(
            [segment((1.0, 5.5), (8.0, 5.5)), segment((1.0, 5.5), (8.0, 5.5))],
            [1.0, 1.0, 1.0, 0.5],
            0.65,
        );
        assert_eq!(once.pixel(4, 5), twice.pixel(4, 5));
    }

    #[test]
    fn test_segments_outside_surface_are_ignored() {
        let mut surface = TrailSurface::new(10, 10);
        surface.stroke_segments([segment((-20.0, -20.0), (-15.0, -15.0))], [1.0; 4], 0.65);
        assert!(surface.as_image().pixels().all(|p| p.0[3] == 0.0));
    }

    #[test]
    fn test_resize_clears_surface() {
        let mut surface = TrailSurface::new(4, 4);
        surface.put_pixel(0, 0, [1.0; 4]);
        assert!(!surface.resize(4, 4));
        assert_eq!(surface.pixel(0, 0)[3], 1.0);
        assert!(surface.resize(6, 3));
        assert_eq!((surface.width(), surface.height()), (6, 3));
        assert!(surface.as_image().pixels().all(|p| p.0[3] == 0.0));
    }

    #[test]
    fn test_composite_is_source_over() {
        let mut surface = TrailSurface::new(2, 1);
        surface.put_pixel(0, 0, [1.0, 1.0, 1.0, 0.5]);
        let mut target = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        surface.composite_onto(&mut target);
        assert_eq!(target.get_pixel(0, 0).0, [128, 128, 128, 255]);
        assert_eq!(target.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }
}

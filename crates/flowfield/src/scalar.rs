// Colour-mapped raster of a scalar field over the viewport

use crate::field::ScalarField;
use crate::palette::Palette;
use crate::viewport::MapViewport;
use glam::Vec2;
use image::{Rgba, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// Flat colour per palette range.
    Banded,
    /// Linear blend between range minima.
    Gradient,
}

/// Block-wise scalar overlay renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarOverlay {
    /// Block size in pixels; one field query per block.
    pub step: u32,
    pub opacity: f32,
    pub style: ScalarStyle,
}

impl Default for ScalarOverlay {
    fn default() -> Self {
        Self {
            step: 4,
            opacity: 0.7,
            style: ScalarStyle::Gradient,
        }
    }
}

impl ScalarOverlay {
    /// Rasterises `field` at the map's current geometry. No-data blocks stay transparent.
    pub fn render(&self, map: &dyn MapViewport, field: &ScalarField, palette: &Palette) -> RgbaImage {
        let geometry = map.geometry();
        let mut image = RgbaImage::new(geometry.width, geometry.height);
        let step = self.step.max(1);
        let alpha = (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;

        for by in (0..geometry.height).step_by(step as usize) {
            for bx in (0..geometry.width).step_by(step as usize) {
                let center = Vec2::new(
                    (bx + step / 2).min(geometry.width - 1) as f32,
                    (by + step / 2).min(geometry.height - 1) as f32,
                );
                let Some(color) = map
                    .pixel_to_lon_lat(center)
                    .and_then(|lon_lat| field.interpolate(lon_lat.x, lon_lat.y))
                    .and_then(|value| self.color(palette, value))
                else {
                    continue;
                };

                let pixel = Rgba([color[0], color[1], color[2], alpha]);
                for y in by..(by + step).min(geometry.height) {
                    for x in bx..(bx + step).min(geometry.width) {
                        image.put_pixel(x, y, pixel);
                    }
                }
            }
        }
        image
    }

    fn color(&self, palette: &Palette, value: f32) -> Option<[u8; 3]> {
        match self.style {
            ScalarStyle::Banded => palette.color_for(value).map(|c| [c[0], c[1], c[2]]),
            ScalarStyle::Gradient => Some(palette.gradient(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HolePolicy;
    use crate::grid::{GridHeader, GridRecord};
    use crate::palette::Quantity;
    use crate::viewport::{EquirectViewport, ViewportGeometry};
    use glam::DVec2;

    /// Temperature grid over lon 0..4, lat 4..0 with one missing sample in the east.
    fn temperature() -> ScalarField {
        let header = GridHeader::new(DVec2::new(0.0, 4.0), DVec2::new(1.0, -1.0), 5, 5).with_parameter(0, 0);
        let mut data = vec![Some(20.0); 25];
        data[2 * 5 + 4] = None;
        ScalarField::build(&GridRecord::new(header, data).unwrap(), HolePolicy::Strict).unwrap()
    }

    fn map() -> EquirectViewport {
        EquirectViewport::new(ViewportGeometry::new(40, 40, DVec2::new(2.0, 2.0), 0.1))
    }

    #[test]
    fn test_banded_render_uses_palette_colour() {
        let overlay = ScalarOverlay {
            step: 4,
            opacity: 1.0,
            style: ScalarStyle::Banded,
        };
        let image = overlay.render(&map(), &temperature(), Palette::for_quantity(Quantity::Temp));
        assert_eq!(image.get_pixel(10, 10).0, [247, 251, 59, 255]);
    }

    #[test]
    fn test_no_data_blocks_stay_transparent() {
        let image = ScalarOverlay::default().render(&map(), &temperature(), Palette::for_quantity(Quantity::Temp));
        // Pixel (38, 20) maps to lon 3.8, lat 2.0, next to the missing sample at (4, 2).
        assert_eq!(image.get_pixel(38, 20).0[3], 0);
        assert_eq!(image.get_pixel(2, 2).0[3], 179);
    }
}

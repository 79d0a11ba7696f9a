// Colour tables: the particle intensity ramp and per-quantity scalar scales

use serde::{Deserialize, Serialize};

/// Darkest bucket brightness of the intensity ramp.
pub const RAMP_FLOOR: u32 = 85;
pub const RAMP_CEILING: u32 = 255;

/// Speed-bucketed stroke styles, from dim to bright.
///
/// Particles are grouped by bucket each frame so one stroke call covers a whole bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityRamp {
    colors: Vec<[f32; 4]>,
    max_intensity: f32,
}

impl IntensityRamp {
    pub fn new(step: u32, max_intensity: f32, stroke_color: [f32; 4]) -> Self {
        let step = step.max(1) as usize;
        let colors = (RAMP_FLOOR..=RAMP_CEILING)
            .step_by(step)
            .map(|j| {
                let brightness = j as f32 / RAMP_CEILING as f32;
                [
                    stroke_color[0] * brightness,
                    stroke_color[1] * brightness,
                    stroke_color[2] * brightness,
                    stroke_color[3],
                ]
            })
            .collect();
        Self {
            colors,
            max_intensity,
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(
            config.intensity_scale_step,
            config.max_intensity,
            config.stroke_color,
        )
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color(&self, bucket: usize) -> [f32; 4] {
        self.colors[bucket.min(self.colors.len() - 1)]
    }

    pub fn colors(&self) -> &[[f32; 4]] {
        &self.colors
    }

    /// Monotonically non-decreasing in `speed`, clamped at `max_intensity`.
    pub fn index_for(&self, speed: f32) -> usize {
        let clamped = speed.max(0.0).min(self.max_intensity);
        ((clamped / self.max_intensity) * (self.colors.len() - 1) as f32).floor() as usize
    }

    /// RGBA8 strip of `width` texels sampled across the ramp, for shader lookups.
    pub fn to_texture_bytes(&self, width: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(width * 4);
        for x in 0..width {
            let t = if width > 1 { x as f32 / (width - 1) as f32 } else { 0.0 };
            let color = self.color(self.index_for(t * self.max_intensity));
            bytes.extend(color.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
        bytes
    }
}

/// Physical quantity of a scalar layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "PM10")]
    Pm10,
    #[serde(rename = "PM2.5")]
    Pm25,
    #[serde(rename = "TEMP")]
    Temp,
}

/// Half-open `[min, max)` value interval with its colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRange {
    pub min: f32,
    pub max: f32,
    pub rgba: [u8; 4],
}

const fn range(min: f32, max: f32, r: u8, g: u8, b: u8) -> ColorRange {
    ColorRange {
        min,
        max,
        rgba: [r, g, b, 255],
    }
}

/// Immutable colour scale for one quantity, injected wherever a legend or overlay needs it.
#[derive(Debug, PartialEq)]
pub struct Palette {
    pub quantity: Quantity,
    pub unit: &'static str,
    /// Decimal places used when formatting values for labels.
    pub decimals: usize,
    pub ranges: &'static [ColorRange],
}

impl Palette {
    pub fn for_quantity(quantity: Quantity) -> &'static Palette {
        match quantity {
            Quantity::O3 => &O3,
            Quantity::Pm10 => &PM10,
            Quantity::Pm25 => &PM25,
            Quantity::Temp => &TEMP,
        }
    }

    /// Discrete colour of the range containing `value`.
    pub fn color_for(&self, value: f32) -> Option<[u8; 4]> {
        self.ranges
            .iter()
            .find(|r| value >= r.min && value < r.max)
            .map(|r| r.rgba)
    }

    /// Gradient stops at each range minimum.
    pub fn stops(&self) -> impl Iterator<Item = (f32, [u8; 3])> + '_ {
        self.ranges
            .iter()
            .filter(|r| r.min.is_finite())
            .map(|r| (r.min, [r.rgba[0], r.rgba[1], r.rgba[2]]))
    }

    /// Continuous colour: linear RGB blend between neighbouring stops, clamped at both ends.
    pub fn gradient(&self, value: f32) -> [u8; 3] {
        let stops: Vec<_> = self.stops().collect();
        let Some(&(first_value, first_color)) = stops.first() else {
            return [0, 0, 0];
        };
        if value <= first_value {
            return first_color;
        }
        for pair in stops.windows(2) {
            let (lo, lo_color) = pair[0];
            let (hi, hi_color) = pair[1];
            if value < hi {
                let t = (value - lo) / (hi - lo);
                let mut out = [0u8; 3];
                for k in 0..3 {
                    let c = lo_color[k] as f32 + (hi_color[k] as f32 - lo_color[k] as f32) * t;
                    out[k] = c.round().clamp(0.0, 255.0) as u8;
                }
                return out;
            }
        }
        stops[stops.len() - 1].1
    }

    pub fn format(&self, value: f32) -> String {
        format!("{value:.prec$} {}", self.unit, prec = self.decimals)
    }
}

const INF: f32 = f32::INFINITY;

pub static O3: Palette = Palette {
    quantity: Quantity::O3,
    unit: "ppm",
    decimals: 3,
    ranges: &[
        range(0.0, 0.01, 135, 192, 232),
        range(0.01, 0.02, 76, 162, 244),
        range(0.02, 0.03, 53, 150, 249),
        range(0.03, 0.04, 99, 254, 99),
        range(0.04, 0.05, 0, 234, 0),
        range(0.05, 0.06, 0, 216, 0),
        range(0.06, 0.07, 0, 177, 0),
        range(0.07, 0.08, 0, 138, 0),
        range(0.08, 0.09, 0, 117, 0),
        range(0.09, 0.1, 224, 224, 0),
        range(0.1, 0.11, 193, 193, 0),
        range(0.11, 0.12, 177, 177, 0),
        range(0.12, 0.13, 146, 146, 0),
        range(0.13, 0.14, 115, 115, 0),
        range(0.14, 0.15, 100, 100, 0),
        range(0.15, 0.16, 255, 150, 150),
        range(0.16, 0.17, 255, 120, 120),
        range(0.17, 0.18, 255, 90, 90),
        range(0.18, 0.19, 255, 60, 60),
        range(0.19, INF, 255, 0, 0),
    ],
};

pub static PM10: Palette = Palette {
    quantity: Quantity::Pm10,
    unit: "µg/m³",
    decimals: 0,
    ranges: &[
        range(0.0, 6.0, 135, 192, 232),
        range(6.0, 18.0, 76, 162, 244),
        range(18.0, 31.0, 53, 150, 249),
        range(31.0, 40.0, 99, 254, 99),
        range(40.0, 48.0, 0, 234, 0),
        range(48.0, 56.0, 0, 216, 0),
        range(56.0, 64.0, 0, 177, 0),
        range(64.0, 72.0, 0, 138, 0),
        range(72.0, 81.0, 0, 117, 0),
        range(81.0, 93.0, 224, 224, 0),
        range(93.0, 105.0, 193, 193, 0),
        range(105.0, 117.0, 177, 177, 0),
        range(117.0, 130.0, 146, 146, 0),
        range(130.0, 142.0, 115, 115, 0),
        range(142.0, 151.0, 100, 100, 0),
        range(151.0, 191.0, 255, 150, 150),
        range(191.0, 231.0, 255, 120, 120),
        range(231.0, 271.0, 255, 90, 90),
        range(271.0, 320.0, 255, 60, 60),
        range(320.0, INF, 255, 0, 0),
    ],
};

pub static PM25: Palette = Palette {
    quantity: Quantity::Pm25,
    unit: "µg/m³",
    decimals: 0,
    ranges: &[
        range(0.0, 5.0, 135, 192, 232),
        range(5.0, 10.0, 76, 162, 244),
        range(10.0, 16.0, 53, 150, 249),
        range(16.0, 19.0, 99, 254, 99),
        range(19.0, 22.0, 0, 234, 0),
        range(22.0, 26.0, 0, 216, 0),
        range(26.0, 30.0, 0, 177, 0),
        range(30.0, 33.0, 0, 138, 0),
        range(33.0, 36.0, 0, 117, 0),
        range(36.0, 42.0, 224, 224, 0),
        range(42.0, 48.0, 193, 193, 0),
        range(48.0, 55.0, 177, 177, 0),
        range(55.0, 62.0, 146, 146, 0),
        range(62.0, 69.0, 115, 115, 0),
        range(69.0, 76.0, 100, 100, 0),
        range(76.0, 107.0, 255, 150, 150),
        range(107.0, 138.0, 255, 120, 120),
        range(138.0, 169.0, 255, 90, 90),
        range(169.0, 200.0, 255, 60, 60),
        range(200.0, INF, 255, 0, 0),
    ],
};

pub static TEMP: Palette = Palette {
    quantity: Quantity::Temp,
    unit: "℃",
    decimals: 1,
    ranges: &[
        range(-80.15, -67.15, 37, 4, 42),
        range(-67.15, -54.15, 41, 10, 130),
        range(-54.15, -40.0, 81, 40, 40),
        range(-40.0, -17.78, 192, 37, 149),
        range(-17.78, 0.0, 70, 215, 215),
        range(0.0, 2.0, 21, 84, 187),
        range(2.0, 17.85, 24, 132, 14),
        range(17.85, 24.85, 247, 251, 59),
        range(24.85, 37.85, 235, 167, 21),
        range(37.85, 54.85, 230, 71, 39),
        range(54.85, INF, 88, 27, 67),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn default_ramp() -> IntensityRamp {
        IntensityRamp::new(10, 17.0, [1.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_default_ramp_has_eighteen_buckets() {
        let ramp = default_ramp();
        assert_eq!(ramp.len(), 18);
        assert!((ramp.color(0)[0] - 85.0 / 255.0).abs() < 1e-6);
        assert!((ramp.color(17)[0] - 1.0).abs() < 1e-6);
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(-2.0, 0)]
    #[case(8.5, 8)]
    #[case(17.0, 17)]
    #[case(100.0, 17)]
    fn test_index_for(#[case] speed: f32, #[case] expected: usize) {
        assert_eq!(default_ramp().index_for(speed), expected);
    }

    #[test]
    fn test_index_for_is_monotonic() {
        let ramp = default_ramp();
        let mut previous = 0;
        for step in 0..400 {
            let index = ramp.index_for(step as f32 * 0.05);
            assert!(index >= previous);
            previous = index;
        }
    }

    #[test]
    fn test_stroke_color_tints_ramp() {
        let ramp = IntensityRamp::new(10, 17.0, [0.0, 0.5, 1.0, 0.8]);
        let last = ramp.color(ramp.len() - 1);
        assert_eq!(last, [0.0, 0.5, 1.0, 0.8]);
    }

    #[test]
    fn test_ramp_texture_spans_buckets() {
        let bytes = default_ramp().to_texture_bytes(256);
        assert_eq!(bytes.len(), 256 * 4);
        assert_eq!(bytes[0], 85);
        assert_eq!(bytes[255 * 4], 255);
    }

    #[rstest]
    #[case(Quantity::O3, 0.005, Some([135, 192, 232, 255]))]
    #[case(Quantity::O3, 0.01, Some([76, 162, 244, 255]))]
    #[case(Quantity::O3, 5.0, Some([255, 0, 0, 255]))]
    #[case(Quantity::O3, -0.1, None)]
    #[case(Quantity::Pm10, 150.0, Some([100, 100, 0, 255]))]
    #[case(Quantity::Temp, -100.0, None)]
    fn test_color_for(#[case] quantity: Quantity, #[case] value: f32, #[case] expected: Option<[u8; 4]>) {
        assert_eq!(Palette::for_quantity(quantity).color_for(value), expected);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        for quantity in [Quantity::O3, Quantity::Pm10, Quantity::Pm25, Quantity::Temp] {
            let ranges = Palette::for_quantity(quantity).ranges;
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].max, pair[1].min, "{quantity:?}");
            }
        }
    }

    #[test]
    fn test_gradient_blends_between_stops() {
        let palette = Palette::for_quantity(Quantity::Pm10);
        assert_eq!(palette.gradient(-5.0), [135, 192, 232]);
        assert_eq!(palette.gradient(3.0), [106, 177, 238]);
        assert_eq!(palette.gradient(1000.0), [255, 0, 0]);
    }

    #[test]
    fn test_format_uses_unit_and_precision() {
        assert_eq!(Palette::for_quantity(Quantity::O3).format(0.0421), "0.042 ppm");
        assert_eq!(Palette::for_quantity(Quantity::Temp).format(12.34), "12.3 ℃");
    }
}

// Texture encodings shared by the host and the WGSL passes

use crate::config::GpuConfig;
use crate::field::VectorField;
use crate::grid::GridHeader;
use crate::viewport::GeoExtent;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::Rng;

/// Vector field packed into RGBA8 texels: R = u, G = v normalised by the field's range,
/// B = 255 where data exists. Missing cells are `[0, 0, 0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindTexture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub min: Vec2,
    pub max: Vec2,
    /// Present corners a lookup needs, from the field's hole policy.
    pub min_corners: u32,
}

impl WindTexture {
    pub fn encode(field: &VectorField) -> Self {
        let header = field.header();
        let (min, max) = field
            .value_range()
            .map(|range| (range.min, range.max))
            .unwrap_or((Vec2::ZERO, Vec2::ZERO));
        let span = max - min;

        let mut pixels = Vec::with_capacity(header.len() * 4);
        for row in 0..header.height {
            for col in 0..header.width {
                match field.cell(col, row) {
                    Some([u, v]) => pixels.extend_from_slice(&[
                        quantize(u - min.x, span.x),
                        quantize(v - min.y, span.y),
                        255,
                        255,
                    ]),
                    None => pixels.extend_from_slice(&[0, 0, 0, 255]),
                }
            }
        }

        Self {
            width: header.width as u32,
            height: header.height as u32,
            pixels,
            min,
            max,
            min_corners: field.policy().min_corners() as u32,
        }
    }

    fn texel(&self, col: u32, row: u32) -> [u8; 4] {
        let index = ((row * self.width + col) * 4) as usize;
        [
            self.pixels[index],
            self.pixels[index + 1],
            self.pixels[index + 2],
            self.pixels[index + 3],
        ]
    }

    /// Dequantised velocity of one texel.
    pub fn decode(&self, col: u32, row: u32) -> Option<Vec2> {
        let [r, g, b, _] = self.texel(col, row);
        if b < 128 {
            return None;
        }
        Some(self.min + (self.max - self.min) * Vec2::new(r as f32, g as f32) / 255.0)
    }

    /// Manual bilinear lookup at fractional texel indices, as the shaders do it.
    ///
    /// Missing corners count as zero once `min_corners` of the four are present.
    pub fn sample(&self, i: f32, j: f32) -> Option<Vec2> {
        let (i0, j0, i1, j1) = (i.floor(), j.floor(), i.ceil(), j.ceil());
        if i0 < 0.0 || j0 < 0.0 || i1 >= self.width as f32 || j1 >= self.height as f32 {
            return None;
        }
        let (tx, ty) = (i - i0, j - j0);
        let corners = [
            self.decode(i0 as u32, j0 as u32),
            self.decode(i1 as u32, j0 as u32),
            self.decode(i0 as u32, j1 as u32),
            self.decode(i1 as u32, j1 as u32),
        ];
        let present = corners.iter().filter(|c| c.is_some()).count() as u32;
        if present < self.min_corners {
            return None;
        }
        let [g00, g10, g01, g11] = corners.map(|c| c.unwrap_or(Vec2::ZERO));
        Some(g00.lerp(g10, tx).lerp(g01.lerp(g11, tx), ty))
    }
}

fn quantize(offset: f32, span: f32) -> u8 {
    if span <= 0.0 {
        return 0;
    }
    (255.0 * offset / span).floor().clamp(0.0, 255.0) as u8
}

/// Packs a normalised `[0, 1)` position into two 16-bit fixed-point values:
/// low bytes in R/G, high bytes in B/A.
pub fn encode_position(position: Vec2) -> [u8; 4] {
    let p = position.clamp(Vec2::ZERO, Vec2::splat(0.999_99)) * 255.0;
    let high = p.floor();
    let low = (p - high) * 255.0;
    [
        low.x.round() as u8,
        low.y.round() as u8,
        high.x as u8,
        high.y as u8,
    ]
}

pub fn decode_position(texel: [u8; 4]) -> Vec2 {
    let [r, g, b, a] = texel.map(|c| c as f32 / 255.0);
    Vec2::new(r / 255.0 + b, g / 255.0 + a)
}

/// Square RGBA8 texture holding one encoded particle position per texel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleStateTexture {
    pub side: u32,
    pub pixels: Vec<u8>,
}

impl ParticleStateTexture {
    pub fn random<R: Rng>(side: u32, rng: &mut R) -> Self {
        let count = side as usize * side as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            let position = Vec2::new(rng.random(), rng.random());
            pixels.extend_from_slice(&encode_position(position));
        }
        Self { side, pixels }
    }

    pub fn len(&self) -> usize {
        self.side as usize * self.side as usize
    }

    pub fn is_empty(&self) -> bool {
        self.side == 0
    }

    pub fn position(&self, index: usize) -> Vec2 {
        let i = index * 4;
        decode_position([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }
}

/// Two same-shaped resources used alternately as source and destination.
#[derive(Debug)]
pub struct PingPong<T> {
    pair: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            pair: [first, second],
            read: 0,
        }
    }

    pub fn read(&self) -> &T {
        &self.pair[self.read]
    }

    pub fn write(&self) -> &T {
        &self.pair[1 - self.read]
    }

    pub fn read_index(&self) -> usize {
        self.read
    }

    pub fn get(&self, index: usize) -> &T {
        &self.pair[index]
    }

    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }
}

/// Seeded hash noise, the same formula as `rand` in `update.wgsl`.
pub fn pseudo_random(co: Vec2) -> f32 {
    let t = co.dot(Vec2::new(12.9898, 78.233));
    let x = t.sin() * (4375.85453 + t);
    (x - x.floor()).min(1.0 - f32::EPSILON)
}

/// Uniform block shared by the update and draw passes. Layout matches `FieldUniforms` in WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FieldUniforms {
    pub wind_min: [f32; 2],
    pub wind_max: [f32; 2],
    pub grid_origin: [f32; 2],
    pub grid_delta: [f32; 2],
    pub grid_size: [f32; 2],
    pub extent_min: [f32; 2],
    pub extent_max: [f32; 2],
    /// Normalised-position displacement per unit velocity, per axis.
    pub displacement_scale: [f32; 2],
    pub rand_seed: f32,
    pub drop_rate: f32,
    pub drop_rate_bump: f32,
    pub state_side: f32,
    pub min_corners: f32,
    /// Lenient fields keep particles on in-view holes instead of dropping them.
    pub lenient: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ScreenUniforms {
    pub opacity: f32,
    pub _pad: [f32; 3],
}

impl ScreenUniforms {
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            _pad: [0.0; 3],
        }
    }
}

impl FieldUniforms {
    /// Uniforms for one frame over `extent`, drawn into a `size` pixel target.
    pub fn new(
        wind: &WindTexture,
        header: &GridHeader,
        extent: &GeoExtent,
        size: (u32, u32),
        config: &GpuConfig,
        state_side: u32,
        rand_seed: f32,
    ) -> Self {
        let (width, height) = (size.0.max(1) as f32, size.1.max(1) as f32);
        let k = config.velocity_scale_factor * config.speed_scale;
        Self {
            wind_min: wind.min.to_array(),
            wind_max: wind.max.to_array(),
            grid_origin: [header.origin_lon as f32, header.origin_lat as f32],
            grid_delta: [header.delta_lon as f32, header.delta_lat as f32],
            grid_size: [header.width as f32, header.height as f32],
            extent_min: extent.min.as_vec2().to_array(),
            extent_max: extent.max.as_vec2().to_array(),
            // Same pixel displacement as the canvas path, expressed in normalised units.
            displacement_scale: [height * k / width, k],
            rand_seed,
            drop_rate: config.drop_rate,
            drop_rate_bump: config.drop_rate_bump,
            state_side: state_side as f32,
            min_corners: wind.min_corners as f32,
            lenient: if wind.min_corners < 4 { 1.0 } else { 0.0 },
            _pad: [0.0; 2],
        }
    }

    /// Fractional texel indices of a normalised screen position.
    fn grid_index(&self, position: Vec2) -> Vec2 {
        let min = Vec2::from_array(self.extent_min);
        let max = Vec2::from_array(self.extent_max);
        let lon = min.x + (max.x - min.x) * position.x;
        let lat = max.y + (min.y - max.y) * position.y;
        (Vec2::new(lon, lat) - Vec2::from_array(self.grid_origin)) / Vec2::from_array(self.grid_delta)
    }

    /// Host mirror of the update pass for one particle.
    pub fn advance(&self, wind: &WindTexture, position: Vec2) -> Vec2 {
        let index = self.grid_index(position);
        let sampled = wind.sample(index.x, index.y);
        let velocity = sampled.unwrap_or(Vec2::ZERO);
        let top_speed = Vec2::from_array(self.wind_max)
            .abs()
            .max(Vec2::from_array(self.wind_min).abs())
            .length()
            .max(f32::EPSILON);
        let speed_t = velocity.length() / top_speed;

        let offset = Vec2::new(velocity.x, -velocity.y) * Vec2::from_array(self.displacement_scale);
        let moved = position + offset;

        let seed = (position + Vec2::splat(self.rand_seed)) * self.rand_seed;
        let drop_rate = self.drop_rate + speed_t * self.drop_rate_bump;
        let outside = moved.cmplt(Vec2::ZERO).any() || moved.cmpge(Vec2::ONE).any();
        let hole = sampled.is_none() && self.lenient < 0.5;
        let drop = hole || outside || pseudo_random(seed) > 1.0 - drop_rate;
        if drop {
            Vec2::new(
                pseudo_random(seed + Vec2::splat(1.3)),
                pseudo_random(seed + Vec2::splat(2.1)),
            )
        } else {
            moved
        }
    }
}

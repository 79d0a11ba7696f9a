// Viewport-aligned resampling of a vector field in screen-pixel units

use crate::config::{EngineConfig, HolePolicy};
use crate::field::{Cell, VectorField, bilinear, resolve_corners};
use crate::particles::Particle;
use crate::viewport::{MapViewport, ViewportGeometry};
use glam::Vec2;
use rand::Rng;

/// Per-frame pixel displacement at a screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSample {
    pub dx: f32,
    pub dy: f32,
    pub magnitude: f32,
}

impl CacheSample {
    fn from_components([dx, dy]: [f32; 2]) -> Self {
        Self {
            dx,
            dy,
            magnitude: dx.hypot(dy),
        }
    }

    pub fn displacement(&self) -> Vec2 {
        Vec2::new(self.dx, self.dy)
    }
}

/// Dense lattice of field samples every `step` pixels, valid for exactly one viewport geometry.
#[derive(Debug, Clone)]
pub struct ViewportFieldCache {
    geometry: ViewportGeometry,
    step: f32,
    columns: usize,
    rows: usize,
    /// Row-major, `None` is the no-data sentinel.
    samples: Vec<Option<[f32; 2]>>,
    policy: HolePolicy,
}

impl ViewportFieldCache {
    /// Resamples `field` over the map's current viewport.
    ///
    /// Returns `None` when the viewport has no area yet.
    pub fn build(map: &dyn MapViewport, field: &VectorField, config: &EngineConfig) -> Option<Self> {
        let geometry = map.geometry();
        if geometry.width == 0 || geometry.height == 0 {
            return None;
        }

        let step = config.step.max(1);
        // Lattice reaches at least the last pixel row and column.
        let columns = (geometry.width - 1).div_ceil(step) as usize + 1;
        let rows = (geometry.height - 1).div_ceil(step) as usize + 1;
        let velocity_scale = config.velocity_scale(geometry.height);
        let flip = if config.flip_y { -1.0 } else { 1.0 };

        let mut samples = Vec::with_capacity(columns * rows);
        for row in 0..rows {
            let y = (row as u32 * step) as f32;
            for col in 0..columns {
                let x = (col as u32 * step) as f32;
                let sample = map
                    .pixel_to_lon_lat(Vec2::new(x, y))
                    .filter(|lon_lat| lon_lat.is_finite())
                    .and_then(|lon_lat| field.interpolate(lon_lat.x, lon_lat.y))
                    .map(|wind| [wind.u * velocity_scale, wind.v * velocity_scale * flip]);
                samples.push(sample);
            }
        }

        let defined = samples.iter().filter(|s| s.is_some()).count();
        log::debug!(
            "Built viewport cache {}x{} ({} of {} samples defined)",
            columns,
            rows,
            defined,
            samples.len()
        );

        Some(Self {
            geometry,
            step: step as f32,
            columns,
            rows,
            samples,
            policy: field.policy(),
        })
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn lattice_size(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    pub fn is_valid_for(&self, geometry: &ViewportGeometry) -> bool {
        self.geometry == *geometry
    }

    fn max_x(&self) -> f32 {
        self.geometry.width.saturating_sub(1) as f32
    }

    fn max_y(&self) -> f32 {
        self.geometry.height.saturating_sub(1) as f32
    }

    /// Inside the drawable pixel area, regardless of data.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.max_x() && y <= self.max_y()
    }

    fn lattice(&self, col: usize, row: usize) -> Option<[f32; 2]> {
        self.samples[row * self.columns + col]
    }

    /// Second bilinear pass over the pixel lattice, honouring the hole policy.
    pub fn sample(&self, x: f32, y: f32) -> Option<CacheSample> {
        if !self.contains(x, y) {
            return None;
        }
        let cell = Cell::locate(
            (x / self.step) as f64,
            (y / self.step) as f64,
            self.columns,
            self.rows,
        )?;
        let corners = resolve_corners(cell.gather(|c, r| self.lattice(c, r)), self.policy)?;
        Some(CacheSample::from_components(bilinear(cell.tx, cell.ty, corners)))
    }

    pub fn is_defined(&self, x: f32, y: f32) -> bool {
        self.sample(x, y).is_some()
    }

    /// Uniform random point in bounds that lands on data, or the last attempt after `attempts` misses.
    pub fn random_position<R: Rng>(&self, rng: &mut R, attempts: u32) -> Vec2 {
        let mut position = Vec2::ZERO;
        for _ in 0..attempts.max(1) {
            position = Vec2::new(
                rng.random::<f32>() * self.max_x(),
                rng.random::<f32>() * self.max_y(),
            );
            if self.is_defined(position.x, position.y) {
                break;
            }
        }
        position
    }

    pub fn randomize_into<R: Rng>(&self, particle: &mut Particle, rng: &mut R, attempts: u32) {
        let position = self.random_position(rng, attempts);
        particle.x = position.x;
        particle.y = position.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridHeader, GridRecord};
    use crate::viewport::EquirectViewport;
    use glam::DVec2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// 11x11 one-degree grid over lon 0..10, lat 0..10 with uniform wind.
    fn uniform_field(u: f32, v: f32, policy: HolePolicy) -> VectorField {
        let header = GridHeader::new(DVec2::new(0.0, 10.0), DVec2::new(1.0, -1.0), 11, 11);
        let u_rec = GridRecord::new(header.with_parameter(2, 2), vec![Some(u); 121]).unwrap();
        let v_rec = GridRecord::new(header.with_parameter(2, 3), vec![Some(v); 121]).unwrap();
        VectorField::build(&u_rec, &v_rec, policy).unwrap()
    }

    /// 100x100 px view of lon 0..10, lat 0..10.
    fn map() -> EquirectViewport {
        EquirectViewport::new(ViewportGeometry::new(100, 100, DVec2::new(5.0, 5.0), 0.1))
    }

    #[test]
    fn test_lattice_dimensions() {
        let cache = ViewportFieldCache::build(&map(), &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).unwrap();
        assert_eq!(cache.lattice_size(), (51, 51));
    }

    #[test]
    fn test_lattice_covers_last_pixel_when_step_does_not_divide() {
        let map = EquirectViewport::new(ViewportGeometry::new(101, 101, DVec2::new(5.0, 5.0), 0.09));
        let config = EngineConfig {
            step: 3,
            ..EngineConfig::default()
        };
        let cache = ViewportFieldCache::build(&map, &uniform_field(1.0, 0.0, HolePolicy::Strict), &config).unwrap();
        assert_eq!(cache.lattice_size(), (35, 35));
        assert!(cache.contains(100.0, 50.0));
        assert!(cache.is_defined(99.5, 50.0));
        assert!(cache.is_defined(100.0, 100.0));
    }

    #[test]
    fn test_samples_are_scaled_and_flipped() {
        let config = EngineConfig::default();
        let cache = ViewportFieldCache::build(&map(), &uniform_field(10.0, 5.0, HolePolicy::Strict), &config).unwrap();
        let scale = config.velocity_scale(100);
        let sample = cache.sample(33.3, 61.0).unwrap();
        assert!((sample.dx - 10.0 * scale).abs() < 1e-6);
        assert!((sample.dy + 5.0 * scale).abs() < 1e-6);
        assert!((sample.magnitude - sample.displacement().length()).abs() < 1e-6);
    }

    #[test]
    fn test_no_flip_keeps_northward_sign() {
        let config = EngineConfig {
            flip_y: false,
            ..EngineConfig::default()
        };
        let cache = ViewportFieldCache::build(&map(), &uniform_field(0.0, 5.0, HolePolicy::Strict), &config).unwrap();
        assert!(cache.sample(50.0, 50.0).unwrap().dy > 0.0);
    }

    #[test]
    fn test_out_of_bounds_is_undefined() {
        let cache = ViewportFieldCache::build(&map(), &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).unwrap();
        assert!(cache.sample(-0.5, 10.0).is_none());
        assert!(cache.sample(10.0, 99.5).is_none());
        assert!(cache.is_defined(99.0, 99.0));
    }

    #[test]
    fn test_area_outside_grid_is_undefined() {
        // Pan east so the right half of the view has no grid coverage.
        let map = EquirectViewport::new(ViewportGeometry::new(100, 100, DVec2::new(10.0, 5.0), 0.1));
        let cache = ViewportFieldCache::build(&map, &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).unwrap();
        assert!(cache.is_defined(20.0, 50.0));
        assert!(!cache.is_defined(80.0, 50.0));
    }

    #[test]
    fn test_zero_sized_viewport_builds_nothing() {
        let map = EquirectViewport::new(ViewportGeometry::new(0, 100, DVec2::ZERO, 0.1));
        assert!(ViewportFieldCache::build(&map, &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).is_none());
    }

    #[test]
    fn test_randomize_lands_on_data_when_possible() {
        let map = EquirectViewport::new(ViewportGeometry::new(100, 100, DVec2::new(10.0, 5.0), 0.1));
        let cache = ViewportFieldCache::build(&map, &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut particle = Particle::default();
            cache.randomize_into(&mut particle, &mut rng, 30);
            assert!(cache.contains(particle.x, particle.y));
            assert!(cache.is_defined(particle.x, particle.y));
        }
    }

    #[test]
    fn test_randomize_gives_up_after_attempts() {
        // View entirely south of the grid.
        let map = EquirectViewport::new(ViewportGeometry::new(100, 100, DVec2::new(5.0, -40.0), 0.1));
        let cache = ViewportFieldCache::build(&map, &uniform_field(1.0, 0.0, HolePolicy::Strict), &EngineConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let position = cache.random_position(&mut rng, 30);
        assert!(cache.contains(position.x, position.y));
        assert!(!cache.is_defined(position.x, position.y));
    }
}

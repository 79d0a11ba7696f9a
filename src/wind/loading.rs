// Engine settings and wind data for the viewer

use bevy::log::{info, warn};
use bevy::math::DVec2;
use flowfield::grid::{EASTWARD_PARAMETER, NORTHWARD_PARAMETER};
use flowfield::{EngineConfig, FieldResult, GridHeader, GridRecord, HolePolicy, VectorField};
use rand::Rng;
use std::path::Path;

pub const CONFIG_PATH: &str = "windtrail.toml";
pub const DATA_PATH: &str = "assets/data/wind.json";

/// Reads engine settings, keeping defaults when the file is missing or invalid.
pub fn load_engine_config(path: impl AsRef<Path>) -> EngineConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!("No {} found, using default engine settings", path.display());
        return EngineConfig::default();
    }
    match EngineConfig::load_from_file(path) {
        Ok(config) => {
            info!("Loaded engine settings from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring {}: {e}", path.display());
            EngineConfig::default()
        }
    }
}

/// Earth-style grid JSON holding u and v records.
pub fn load_field(path: impl AsRef<Path>, policy: HolePolicy) -> FieldResult<VectorField> {
    let records = GridRecord::list_from_file(path)?;
    VectorField::from_records(&records, policy)
}

/// Global 1° field with easterly trades, mid-latitude westerlies and random gusts.
pub fn synthetic_field<R: Rng>(policy: HolePolicy, rng: &mut R) -> FieldResult<VectorField> {
    let header = GridHeader::new(DVec2::new(-180.0, 90.0), DVec2::new(1.0, -1.0), 360, 181);
    let mut u = Vec::with_capacity(header.len());
    let mut v = Vec::with_capacity(header.len());
    for row in 0..header.height {
        for col in 0..header.width {
            let coordinate = header.coordinate_of(col, row);
            let lon = coordinate.x.to_radians() as f32;
            let lat = coordinate.y.to_radians() as f32;
            let zonal = -8.0 * (3.0 * lat).cos() * lat.cos();
            let meridional = 4.0 * (2.0 * lon).sin() * (2.0 * lat).cos();
            u.push(Some(zonal + rng.random_range(-1.0..=1.0)));
            v.push(Some(meridional + rng.random_range(-1.0..=1.0)));
        }
    }

    let u = GridRecord::new(header.with_parameter(2, EASTWARD_PARAMETER), u)?;
    let v = GridRecord::new(header.with_parameter(2, NORTHWARD_PARAMETER), v)?;
    VectorField::build(&u, &v, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_missing_config_keeps_defaults() {
        let config = load_engine_config("does/not/exist.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_missing_data_is_an_error() {
        assert!(load_field("does/not/exist.json", HolePolicy::Strict).is_err());
    }

    #[test]
    fn test_synthetic_field_covers_the_globe() {
        let mut rng = StdRng::seed_from_u64(7);
        let field = synthetic_field(HolePolicy::Strict, &mut rng).unwrap();
        assert_eq!(field.policy(), HolePolicy::Strict);
        for (lon, lat) in [(-180.0, 90.0), (0.0, 0.0), (178.5, -89.5), (-45.2, 12.7)] {
            assert!(field.interpolate(lon, lat).is_some(), "no wind at {lon}, {lat}");
        }
    }

    #[test]
    fn test_synthetic_trades_blow_west() {
        let mut rng = StdRng::seed_from_u64(7);
        let field = synthetic_field(HolePolicy::Strict, &mut rng).unwrap();
        // -8 m/s at the equator, gusts stay within 1 m/s
        let sample = field.interpolate(30.0, 0.0).unwrap();
        assert!(sample.u < -6.0);
    }
}

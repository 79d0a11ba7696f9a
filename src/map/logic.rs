use bevy::math::{DVec2, Vec2};

/// Degrees per pixel bounds for zooming.
pub const MIN_RESOLUTION: f64 = 0.005;
pub const MAX_RESOLUTION: f64 = 1.0;
/// Resolution change per wheel line.
pub const ZOOM_FACTOR: f64 = 1.25;

pub const INITIAL_CENTER: DVec2 = DVec2::new(10.0, 30.0);
pub const INITIAL_RESOLUTION: f64 = 0.15;

/// New map centre after dragging the content by `drag` screen pixels.
///
/// Content follows the cursor, so the centre moves the opposite way. Latitude is
/// clamped to the poles and longitude wrapped into [-180, 180).
pub fn pan_center(center: DVec2, drag: Vec2, resolution: f64) -> DVec2 {
    let lon = center.x - drag.x as f64 * resolution;
    let lat = center.y + drag.y as f64 * resolution;
    DVec2::new(wrap_longitude(lon), lat.clamp(-90.0, 90.0))
}

pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Positive `lines` zoom in.
pub fn zoom_resolution(resolution: f64, lines: f32) -> f64 {
    (resolution * ZOOM_FACTOR.powf(-lines as f64)).clamp(MIN_RESOLUTION, MAX_RESOLUTION)
}

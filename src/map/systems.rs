use super::resources::MapView;
use bevy::input::ButtonInput;
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::log::info;
use bevy::prelude::{Camera2d, Commands, MessageReader, MouseButton, Res, ResMut};
use bevy::window::WindowResized;

/// Pixels per wheel line for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 100.0;

pub fn spawn_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
    info!("Camera spawned");
}

pub fn map_pan(
    mouse_input: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut map: ResMut<MapView>,
) {
    if mouse_input.pressed(MouseButton::Left) {
        for ev in mouse_motion.read() {
            map.drag_by(ev.delta);
        }
    } else {
        mouse_motion.clear();
    }

    if mouse_input.just_released(MouseButton::Left) && map.is_dragging() {
        map.end_drag();
    }
}

pub fn map_zoom(mut mouse_wheel: MessageReader<MouseWheel>, mut map: ResMut<MapView>) {
    let lines: f32 = mouse_wheel
        .read()
        .map(|ev| match ev.unit {
            MouseScrollUnit::Line => ev.y,
            MouseScrollUnit::Pixel => ev.y / PIXELS_PER_LINE,
        })
        .sum();
    map.zoom(lines);
}

pub fn map_resize(mut resized: MessageReader<WindowResized>, mut map: ResMut<MapView>) {
    if let Some(ev) = resized.read().last() {
        map.resize(ev.width.round().max(0.0) as u32, ev.height.round().max(0.0) as u32);
    }
}

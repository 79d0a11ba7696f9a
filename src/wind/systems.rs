// Wind layer lifecycle and per-frame drawing

use super::loading::{CONFIG_PATH, DATA_PATH, load_engine_config, load_field, synthetic_field};
use super::resources::{WindLayer, WindSprite, frame_image};
use crate::core::state::ViewerState;
use crate::map::resources::MapView;
use bevy::prelude::*;
use flowfield::{MapViewport, WindAnimator};

/// The viewer always animates on the CPU canvas; this only reports whether the
/// shader-based renderer would be usable by other hosts.
pub fn check_gpu_shaders() {
    match flowfield::gpu::shader::validate_all() {
        Ok(()) => info!("GPU wind shaders are valid; the viewer draws with the CPU canvas animator"),
        Err(e) => warn!("GPU wind shaders failed validation: {e}"),
    }
}

/// Loads settings and data, then hands the animator over to the world.
pub fn setup_wind_layer(world: &mut World) {
    let config = load_engine_config(CONFIG_PATH);
    let field = match load_field(DATA_PATH, config.hole_policy) {
        Ok(field) => {
            info!("Loaded wind grid from {DATA_PATH}");
            field
        }
        Err(e) => {
            warn!("Wind grid unavailable ({e}), using a synthetic field");
            match synthetic_field(config.hole_policy, &mut rand::rng()) {
                Ok(field) => field,
                Err(e) => {
                    error!("Could not build synthetic wind field: {e}");
                    return;
                }
            }
        }
    };

    let animator = match WindAnimator::new(field, config) {
        Ok(animator) => animator,
        Err(e) => {
            error!("Wind animator rejected its settings: {e}");
            return;
        }
    };

    let (width, height) = world.resource::<MapView>().geometry().size();
    let mut layer = WindLayer::new(animator, Handle::default(), width, height);
    let image = world
        .resource_mut::<Assets<Image>>()
        .add(frame_image(&layer.frame));
    layer.image = image.clone();
    world.spawn((
        Sprite {
            image,
            custom_size: Some(Vec2::new(width as f32, height as f32)),
            ..default()
        },
        Transform::default(),
        WindSprite,
    ));
    world.insert_non_send_resource(layer);
    world
        .resource_mut::<NextState<ViewerState>>()
        .set(ViewerState::Animating);
}

pub fn start_animation(mut layer: NonSendMut<WindLayer>, mut map: ResMut<MapView>) {
    layer.animator.start(&mut *map);
}

pub fn stop_animation(mut layer: NonSendMut<WindLayer>, mut map: ResMut<MapView>) {
    layer.animator.stop(&mut *map);
    debug!("{} map listeners left after stop", map.listener_count());
}

pub fn toggle_pause(
    keyboard_input: Res<ButtonInput<KeyCode>>,
    state: Res<State<ViewerState>>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    if !keyboard_input.just_pressed(KeyCode::Space) {
        return;
    }
    match state.get() {
        ViewerState::Animating => next_state.set(ViewerState::Paused),
        ViewerState::Paused => next_state.set(ViewerState::Animating),
        ViewerState::Loading => {}
    }
}

pub fn request_wind_frame(mut layer: NonSendMut<WindLayer>, mut map: ResMut<MapView>, time: Res<Time>) {
    layer
        .animator
        .poll_frame(&mut *map, time.elapsed_secs_f64() * 1000.0);
}

pub fn draw_wind_frame(
    mut layer: NonSendMut<WindLayer>,
    mut map: ResMut<MapView>,
    mut images: ResMut<Assets<Image>>,
    mut sprites: Query<&mut Sprite, With<WindSprite>>,
) {
    if !map.take_redraw() {
        return;
    }
    let (width, height) = map.geometry().size();
    let layer = &mut *layer;
    layer.reset_frame(width, height);
    layer.animator.draw_frame(&*map, &mut layer.frame);

    let Some(image) = images.get_mut(&layer.image) else {
        return;
    };
    *image = frame_image(&layer.frame);

    for mut sprite in &mut sprites {
        sprite.custom_size = Some(Vec2::new(width as f32, height as f32));
    }
}

mod loading;
mod resources;
mod systems;

use crate::core::state::ViewerState;
use crate::wind::systems::*;
use bevy::prelude::*;

pub struct WindPlugin;

impl Plugin for WindPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, (check_gpu_shaders, setup_wind_layer))
            .add_systems(OnEnter(ViewerState::Animating), start_animation)
            .add_systems(OnEnter(ViewerState::Paused), stop_animation)
            .add_systems(
                Update,
                (request_wind_frame, draw_wind_frame)
                    .chain()
                    .run_if(in_state(ViewerState::Animating)),
            )
            .add_systems(Update, toggle_pause);
    }
}

pub(crate) mod logic;
pub(crate) mod resources;
mod systems;

use crate::map::resources::MapView;
use crate::map::systems::*;
use bevy::prelude::*;

pub(crate) struct MapPlugin;

impl Plugin for MapPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MapView>()
            .add_systems(Startup, spawn_camera)
            .add_systems(PreUpdate, (map_resize, map_pan, map_zoom));
    }
}

mod core;
mod map;
mod wind;

use crate::core::state::ViewerState;
use crate::map::MapPlugin;
use crate::wind::WindPlugin;
use bevy::app::App;
#[cfg(debug_assertions)]
use bevy::diagnostic::LogDiagnosticsPlugin;
use bevy::prelude::*;

pub struct ViewerPlugin;

impl Plugin for ViewerPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<ViewerState>()
            .add_plugins((MapPlugin, WindPlugin));

        #[cfg(debug_assertions)]
        {
            app.add_plugins(LogDiagnosticsPlugin::default());
        }
    }
}

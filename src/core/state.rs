use bevy::prelude::States;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub(crate) enum ViewerState {
    #[default]
    Loading,
    Animating,
    // Listeners are detached and no frames are requested
    Paused,
}

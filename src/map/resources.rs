use super::logic::{INITIAL_CENTER, INITIAL_RESOLUTION, pan_center, zoom_resolution};
use bevy::math::{DVec2, Vec2};
use bevy::prelude::Resource;
use flowfield::viewport::{EventSink, GeoExtent, ListenerId};
use flowfield::{EquirectViewport, MapViewport, ViewportEventKind, ViewportGeometry};

/// The window's map: an equirectangular view driven by mouse input.
///
/// A drag only moves the map when it ends, so listeners see one move-end per gesture.
#[derive(Resource, Debug)]
pub struct MapView {
    viewport: EquirectViewport,
    drag: Option<Vec2>,
    redraw_requested: bool,
}

impl MapView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: EquirectViewport::new(ViewportGeometry::new(
                width,
                height,
                INITIAL_CENTER,
                INITIAL_RESOLUTION,
            )),
            drag: None,
            redraw_requested: false,
        }
    }

    pub fn drag_by(&mut self, delta: Vec2) {
        *self.drag.get_or_insert(Vec2::ZERO) += delta;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn end_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if drag == Vec2::ZERO {
            return;
        }
        let geometry = self.viewport.geometry();
        self.viewport
            .pan_to(pan_center(geometry.center, drag, geometry.resolution));
    }

    pub fn zoom(&mut self, lines: f32) {
        if lines == 0.0 {
            return;
        }
        let resolution = zoom_resolution(self.viewport.geometry().resolution, lines);
        if resolution != self.viewport.geometry().resolution {
            self.viewport.zoom_to(resolution);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.viewport.geometry().size() != (width, height) {
            self.viewport.resize(width, height);
        }
    }

    /// Clears and returns the pending redraw request.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    pub fn listener_count(&self) -> usize {
        self.viewport.listener_count()
    }
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl MapViewport for MapView {
    fn geometry(&self) -> ViewportGeometry {
        self.viewport.geometry()
    }

    fn pixel_to_lon_lat(&self, pixel: Vec2) -> Option<DVec2> {
        self.viewport.pixel_to_lon_lat(pixel)
    }

    fn extent(&self) -> GeoExtent {
        self.viewport.extent()
    }

    fn listen(&mut self, kind: ViewportEventKind, sink: EventSink) -> ListenerId {
        self.viewport.listen(kind, sink)
    }

    fn unlisten(&mut self, id: ListenerId) {
        self.viewport.unlisten(id);
    }

    fn request_render(&mut self) {
        self.redraw_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_drag_pans_once_on_release() {
        let mut map = MapView::new(200, 100);
        let (sink, events) = channel();
        map.listen(ViewportEventKind::MoveEnd, sink);

        map.drag_by(Vec2::new(5.0, 0.0));
        map.drag_by(Vec2::new(5.0, 0.0));
        assert!(map.is_dragging());
        assert_eq!(map.geometry().center, INITIAL_CENTER);

        map.end_drag();
        assert!(!map.is_dragging());
        assert_eq!(events.try_iter().count(), 1);
        let expected = INITIAL_CENTER.x - 10.0 * INITIAL_RESOLUTION;
        assert!((map.geometry().center.x - expected).abs() < 1e-9);
    }

    #[test]
    fn test_click_without_motion_does_not_pan() {
        let mut map = MapView::new(200, 100);
        let (sink, events) = channel();
        map.listen(ViewportEventKind::MoveEnd, sink);
        map.drag_by(Vec2::ZERO);
        map.end_drag();
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn test_resize_to_same_size_is_silent() {
        let mut map = MapView::new(200, 100);
        let (sink, events) = channel();
        map.listen(ViewportEventKind::SizeChanged, sink);
        map.resize(200, 100);
        assert_eq!(events.try_iter().count(), 0);
        map.resize(300, 100);
        assert_eq!(events.try_iter().count(), 1);
        assert_eq!(map.geometry().size(), (300, 100));
    }

    #[test]
    fn test_redraw_request_is_taken_once() {
        let mut map = MapView::default();
        assert!(!map.take_redraw());
        map.request_render();
        assert!(map.take_redraw());
        assert!(!map.take_redraw());
    }
}

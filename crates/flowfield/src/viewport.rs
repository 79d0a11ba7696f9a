// Seam between the engine and whatever map widget hosts it

use glam::{DVec2, Vec2};
use std::sync::mpsc::Sender;

/// Everything a cache depends on. Any change invalidates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub width: u32,
    pub height: u32,
    /// Map centre in lon/lat degrees.
    pub center: DVec2,
    /// Degrees per screen pixel.
    pub resolution: f64,
}

impl ViewportGeometry {
    pub fn new(width: u32, height: u32, center: DVec2, resolution: f64) -> Self {
        Self {
            width,
            height,
            center,
            resolution,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x <= self.width as f32
            && point.y <= self.height as f32
    }
}

/// Geographic bounding box of the visible area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoExtent {
    pub min: DVec2,
    pub max: DVec2,
}

impl GeoExtent {
    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportEventKind {
    /// Pan or zoom finished.
    MoveEnd,
    SizeChanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportEvent {
    pub kind: ViewportEventKind,
    pub geometry: ViewportGeometry,
}

pub type EventSink = Sender<ViewportEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The map collaborator: geometry queries, coordinate conversion and change notifications.
pub trait MapViewport {
    fn geometry(&self) -> ViewportGeometry;

    /// `None` when the pixel has no geographic meaning (off the projected world).
    fn pixel_to_lon_lat(&self, pixel: Vec2) -> Option<DVec2>;

    fn extent(&self) -> GeoExtent;

    fn listen(&mut self, kind: ViewportEventKind, sink: EventSink) -> ListenerId;

    /// Unknown ids are ignored.
    fn unlisten(&mut self, id: ListenerId);

    /// Asks the host to schedule another draw callback.
    fn request_render(&mut self) {}
}

/// One registered listener. Disposing it detaches it from the map.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: ListenerId,
    kind: ViewportEventKind,
}

impl Subscription {
    pub fn attach(map: &mut dyn MapViewport, kind: ViewportEventKind, sink: EventSink) -> Self {
        let id = map.listen(kind, sink);
        Self { id, kind }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> ViewportEventKind {
        self.kind
    }

    pub fn dispose(self, map: &mut dyn MapViewport) {
        map.unlisten(self.id);
    }
}

/// Listener bookkeeping for map implementations.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, ViewportEventKind, EventSink)>,
}

impl ListenerRegistry {
    pub fn add(&mut self, kind: ViewportEventKind, sink: EventSink) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, kind, sink));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Sends to every listener of `kind`, dropping listeners whose receiver is gone.
    pub fn emit(&mut self, kind: ViewportEventKind, geometry: ViewportGeometry) {
        let event = ViewportEvent { kind, geometry };
        self.listeners
            .retain(|(_, k, sink)| *k != kind || sink.send(event).is_ok());
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Plain equirectangular viewport: a lon/lat window with a fixed degrees-per-pixel scale.
///
/// Used by headless renders and tests; interactive hosts implement [`MapViewport`] themselves.
#[derive(Debug)]
pub struct EquirectViewport {
    geometry: ViewportGeometry,
    listeners: ListenerRegistry,
}

impl EquirectViewport {
    pub fn new(geometry: ViewportGeometry) -> Self {
        Self {
            geometry,
            listeners: ListenerRegistry::default(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn pan_to(&mut self, center: DVec2) {
        self.geometry.center = center;
        self.listeners.emit(ViewportEventKind::MoveEnd, self.geometry);
    }

    pub fn zoom_to(&mut self, resolution: f64) {
        self.geometry.resolution = resolution;
        self.listeners.emit(ViewportEventKind::MoveEnd, self.geometry);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.geometry.width = width;
        self.geometry.height = height;
        self.listeners.emit(ViewportEventKind::SizeChanged, self.geometry);
    }
}

impl MapViewport for EquirectViewport {
    fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    fn pixel_to_lon_lat(&self, pixel: Vec2) -> Option<DVec2> {
        let g = &self.geometry;
        let lon = g.center.x + (pixel.x as f64 - g.width as f64 / 2.0) * g.resolution;
        let lat = g.center.y - (pixel.y as f64 - g.height as f64 / 2.0) * g.resolution;
        (-90.0..=90.0).contains(&lat).then_some(DVec2::new(lon, lat))
    }

    fn extent(&self) -> GeoExtent {
        let g = &self.geometry;
        let half = DVec2::new(g.width as f64, g.height as f64) * g.resolution / 2.0;
        GeoExtent {
            min: g.center - half,
            max: g.center + half,
        }
    }

    fn listen(&mut self, kind: ViewportEventKind, sink: EventSink) -> ListenerId {
        self.listeners.add(kind, sink)
    }

    fn unlisten(&mut self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

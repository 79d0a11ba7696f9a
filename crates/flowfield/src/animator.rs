// Owned animation state and its lifecycle against a map viewport

use crate::cache::ViewportFieldCache;
use crate::config::{EngineConfig, OptionsChange, OptionsPatch};
use crate::error::{FieldError, FieldResult};
use crate::field::VectorField;
use crate::palette::IntensityRamp;
use crate::particles::ParticleSystem;
use crate::trail::{TrailCompositor, TrailSurface};
use crate::viewport::{MapViewport, Subscription, ViewportEvent, ViewportEventKind};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc::{Receiver, channel};

/// Throttles redraw requests to a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGovernor {
    interval_ms: f64,
    last_frame_ms: Option<f64>,
}

impl FrameGovernor {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_frame_ms: None,
        }
    }

    /// True when at least one interval has passed since the last admitted frame.
    pub fn admit(&mut self, now_ms: f64) -> bool {
        match self.last_frame_ms {
            Some(last) if now_ms - last < self.interval_ms => false,
            _ => {
                self.last_frame_ms = Some(now_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_frame_ms = None;
    }
}

/// Canvas-style wind animation for one map layer.
///
/// Owns the field, viewport cache, particles and trail surface. Viewport changes arrive as
/// events through the subscriptions made in [`WindAnimator::start`] and are applied at the
/// start of the next [`WindAnimator::draw_frame`], before any particle samples the cache.
pub struct WindAnimator<R: Rng = StdRng> {
    config: EngineConfig,
    field: VectorField,
    ramp: IntensityRamp,
    cache: Option<ViewportFieldCache>,
    particles: ParticleSystem,
    compositor: TrailCompositor,
    governor: FrameGovernor,
    rng: R,
    running: bool,
    subscriptions: Vec<Subscription>,
    events: Option<Receiver<ViewportEvent>>,
    needs_rebuild: bool,
}

impl WindAnimator<StdRng> {
    pub fn new(field: VectorField, config: EngineConfig) -> FieldResult<Self> {
        Self::with_rng(field, config, StdRng::from_os_rng())
    }

    pub fn with_seed(field: VectorField, config: EngineConfig, seed: u64) -> FieldResult<Self> {
        Self::with_rng(field, config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> WindAnimator<R> {
    pub fn with_rng(field: VectorField, config: EngineConfig, rng: R) -> FieldResult<Self> {
        config.validate()?;
        check_policy(&field, &config)?;
        Ok(Self {
            ramp: IntensityRamp::from_config(&config),
            particles: ParticleSystem::new(&config),
            compositor: TrailCompositor::new(0, 0, config.fade_opacity, config.line_width),
            governor: FrameGovernor::new(config.frame_interval_ms),
            config,
            field,
            cache: None,
            rng,
            running: false,
            subscriptions: Vec::new(),
            events: None,
            needs_rebuild: true,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn field(&self) -> &VectorField {
        &self.field
    }

    pub fn ramp(&self) -> &IntensityRamp {
        &self.ramp
    }

    pub fn cache(&self) -> Option<&ViewportFieldCache> {
        self.cache.as_ref()
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn trail(&self) -> &TrailSurface {
        self.compositor.surface()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Builds the cache and particles and subscribes to viewport changes. Idempotent.
    pub fn start(&mut self, map: &mut dyn MapViewport) {
        if self.running {
            return;
        }
        self.running = true;
        self.rebuild_field(map);

        let (sink, events) = channel();
        for kind in [ViewportEventKind::MoveEnd, ViewportEventKind::SizeChanged] {
            self.subscriptions.push(Subscription::attach(map, kind, sink.clone()));
        }
        self.events = Some(events);
        log::info!("Wind animation started with {} particles", self.particles.len());
    }

    /// Detaches every listener and halts frame requests. Idempotent.
    pub fn stop(&mut self, map: &mut dyn MapViewport) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose(map);
        }
        self.events = None;
        self.governor.reset();
        if self.running {
            self.running = false;
            log::info!("Wind animation stopped");
        }
    }

    /// Stops and releases everything tied to the map.
    pub fn dispose(mut self, map: &mut dyn MapViewport) {
        self.stop(map);
    }

    /// Full cache and particle regeneration for the map's current geometry.
    pub fn rebuild_field(&mut self, map: &dyn MapViewport) {
        let geometry = map.geometry();
        if self.compositor.resize(geometry.width, geometry.height) {
            log::debug!("Trail surface reset to {}x{}", geometry.width, geometry.height);
        }

        self.cache = ViewportFieldCache::build(map, &self.field, &self.config);
        match &self.cache {
            Some(cache) => {
                let count = self.config.particle_count(geometry.width);
                self.particles.populate(cache, count, &mut self.rng);
                let (columns, rows) = cache.lattice_size();
                log::debug!(
                    "Rebuilt field cache {}x{} for {}x{} viewport, {} particles",
                    columns,
                    rows,
                    geometry.width,
                    geometry.height,
                    count
                );
            }
            None => self.particles.clear(),
        }
        self.needs_rebuild = false;
    }

    /// Frame-loop hook: asks the map for a redraw when the governor admits one.
    pub fn poll_frame(&mut self, map: &mut dyn MapViewport, now_ms: f64) -> bool {
        if !self.running || !self.governor.admit(now_ms) {
            return false;
        }
        map.request_render();
        true
    }

    /// Draw callback: applies pending viewport changes, then runs one trail frame onto `target`.
    ///
    /// Returns the number of segments drawn.
    pub fn draw_frame(&mut self, map: &dyn MapViewport, target: &mut RgbaImage) -> usize {
        if !self.running {
            return 0;
        }

        // Events collapse into one rebuild; the newest geometry wins.
        if let Some(events) = &self.events {
            if events.try_iter().count() > 0 {
                self.needs_rebuild = true;
            }
        }
        let stale = self
            .cache
            .as_ref()
            .is_none_or(|cache| !cache.is_valid_for(&map.geometry()));
        if self.needs_rebuild || stale {
            self.rebuild_field(map);
        }

        let Some(cache) = self.cache.as_ref() else {
            return 0;
        };
        self.compositor
            .frame(&mut self.particles, cache, &self.ramp, &mut self.rng, target)
    }

    /// Runtime option update. Invalid patches leave the animator untouched.
    pub fn set_options(&mut self, patch: &OptionsPatch) -> FieldResult<OptionsChange> {
        let change = patch.apply(&mut self.config)?;
        if change.ramp {
            self.ramp = IntensityRamp::from_config(&self.config);
        }
        if change.cache {
            self.needs_rebuild = true;
        }
        self.compositor.set_fade_opacity(self.config.fade_opacity);
        log::info!("Wind options updated (ramp: {}, cache: {})", change.ramp, change.cache);
        Ok(change)
    }

    /// Swaps in freshly fetched data; the cache is rebuilt on the next frame.
    pub fn set_field(&mut self, field: VectorField) -> FieldResult<()> {
        check_policy(&field, &self.config)?;
        self.field = field;
        self.needs_rebuild = true;
        Ok(())
    }
}

fn check_policy(field: &VectorField, config: &EngineConfig) -> FieldResult<()> {
    if field.policy() != config.hole_policy {
        return Err(FieldError::InvalidConfig(format!(
            "field built with {:?} hole policy but animator configured for {:?}",
            field.policy(),
            config.hole_policy
        )));
    }
    Ok(())
}

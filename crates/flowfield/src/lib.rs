pub mod animator;
pub mod cache;
pub mod config;
pub mod error;
pub mod field;
pub mod gpu;
pub mod grid;
pub mod palette;
pub mod particles;
pub mod scalar;
pub mod trail;
pub mod viewport;

pub use animator::{FrameGovernor, WindAnimator};
pub use cache::{CacheSample, ViewportFieldCache};
pub use config::{EngineConfig, GpuConfig, HolePolicy, OptionsChange, OptionsPatch};
pub use error::{FieldError, FieldResult};
pub use field::{FieldSample, ScalarField, VectorField};
pub use grid::{FieldRequest, GridHeader, GridRecord};
pub use palette::{IntensityRamp, Palette, Quantity};
pub use particles::{Particle, ParticleSystem};
pub use scalar::{ScalarOverlay, ScalarStyle};
pub use trail::{TrailCompositor, TrailSurface};
pub use viewport::{EquirectViewport, MapViewport, ViewportEventKind, ViewportGeometry};

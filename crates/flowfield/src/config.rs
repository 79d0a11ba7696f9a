use crate::error::{FieldError, FieldResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How grid and cache lookups treat cells with missing corners.
///
/// One policy is chosen per deployment and shared by the field builder,
/// the viewport cache and the particle system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolePolicy {
    /// Any missing corner makes the whole cell undefined.
    #[default]
    Strict,
    /// Missing corners count as zero while at least two of the four are present.
    /// Particles inside the rendered area keep advecting through local holes.
    Lenient,
}

impl HolePolicy {
    /// Minimum number of present corners for a cell to be defined.
    pub fn min_corners(self) -> usize {
        match self {
            HolePolicy::Strict => 4,
            HolePolicy::Lenient => 2,
        }
    }
}

/// Animator configuration. Every field has a documented default so partial TOML files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Colour-scale ceiling for the intensity ramp, in cached pixel speed.
    pub max_intensity: f32,
    /// Converts physical velocity into viewport-height-relative displacement.
    pub velocity_scale_factor: f32,
    /// Pixel stride between cached samples.
    pub step: u32,
    /// Extra amplification so the flow reads as motion rather than drift.
    pub speed_scale: f32,
    /// Screen y grows downward, geographic north grows upward.
    pub flip_y: bool,
    /// Alpha kept per frame by the trail fade; lower means shorter trails.
    pub fade_opacity: f32,
    /// Particles per horizontal viewport pixel.
    pub particle_density_multiplier: f32,
    /// RGBA stroke tint; bucket colours scale its RGB by brightness.
    pub stroke_color: [f32; 4],
    pub max_particle_age: f32,
    /// Added to every particle's age each tick.
    pub age_increment: f32,
    pub line_width: f32,
    /// Frame governor interval.
    pub frame_interval_ms: f64,
    /// Brightness step between intensity buckets (85..=255).
    pub intensity_scale_step: u32,
    /// Random spawn attempts before accepting an undefined position.
    pub randomize_attempts: u32,
    pub hole_policy: HolePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_intensity: 17.0,
            velocity_scale_factor: 1.0 / 30000.0,
            step: 2,
            speed_scale: 3.0,
            flip_y: true,
            fade_opacity: 0.88,
            particle_density_multiplier: 14.0,
            stroke_color: [1.0, 1.0, 1.0, 1.0],
            max_particle_age: 100.0,
            age_increment: 0.6,
            line_width: 0.65,
            frame_interval_ms: 20.0,
            intensity_scale_step: 10,
            randomize_attempts: 30,
            hole_policy: HolePolicy::Strict,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> FieldResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> FieldResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> FieldResult<()> {
        if self.step == 0 {
            return Err(invalid("step must be at least 1 pixel"));
        }
        if !(self.max_intensity > 0.0) {
            return Err(invalid("max_intensity must be positive"));
        }
        if !(self.fade_opacity > 0.0 && self.fade_opacity <= 1.0) {
            return Err(invalid("fade_opacity must be in (0, 1]"));
        }
        if !self.velocity_scale_factor.is_finite() || !self.speed_scale.is_finite() {
            return Err(invalid("velocity scaling must be finite"));
        }
        if !(self.particle_density_multiplier >= 0.0) {
            return Err(invalid("particle_density_multiplier must be non-negative"));
        }
        if !(self.max_particle_age > 0.0) || !(self.age_increment > 0.0) {
            return Err(invalid("particle age limits must be positive"));
        }
        if self.intensity_scale_step == 0 || self.intensity_scale_step > 170 {
            return Err(invalid("intensity_scale_step must be in 1..=170"));
        }
        if self.randomize_attempts == 0 {
            return Err(invalid("randomize_attempts must be at least 1"));
        }
        if self.stroke_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(invalid("stroke_color channels must be in [0, 1]"));
        }
        Ok(())
    }

    /// Pixel displacement per unit of physical velocity for a viewport of this height.
    pub fn velocity_scale(&self, viewport_height: u32) -> f32 {
        viewport_height as f32 * self.velocity_scale_factor * self.speed_scale
    }

    /// Exact particle count for a viewport of this width.
    pub fn particle_count(&self, viewport_width: u32) -> usize {
        (viewport_width as f32 * self.particle_density_multiplier).floor() as usize
    }
}

fn invalid(message: &str) -> FieldError {
    FieldError::InvalidConfig(message.to_string())
}

/// Runtime subset update (`setOptions`). Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsPatch {
    pub max_intensity: Option<f32>,
    pub velocity_scale_factor: Option<f32>,
    pub step: Option<u32>,
    pub speed_scale: Option<f32>,
    pub flip_y: Option<bool>,
    pub fade_opacity: Option<f32>,
    pub particle_density_multiplier: Option<f32>,
    pub stroke_color: Option<[f32; 4]>,
}

/// What an applied patch invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsChange {
    pub ramp: bool,
    pub cache: bool,
}

impl OptionsPatch {
    /// Applies the patch to a copy and commits only if the result validates.
    pub fn apply(&self, config: &mut EngineConfig) -> FieldResult<OptionsChange> {
        let mut next = config.clone();
        let mut change = OptionsChange::default();

        if let Some(value) = self.max_intensity {
            change.ramp |= next.max_intensity != value;
            next.max_intensity = value;
        }
        if let Some(value) = self.stroke_color {
            change.ramp |= next.stroke_color != value;
            next.stroke_color = value;
        }
        if let Some(value) = self.velocity_scale_factor {
            change.cache |= next.velocity_scale_factor != value;
            next.velocity_scale_factor = value;
        }
        if let Some(value) = self.step {
            change.cache |= next.step != value;
            next.step = value;
        }
        if let Some(value) = self.speed_scale {
            change.cache |= next.speed_scale != value;
            next.speed_scale = value;
        }
        if let Some(value) = self.flip_y {
            change.cache |= next.flip_y != value;
            next.flip_y = value;
        }
        if let Some(value) = self.particle_density_multiplier {
            change.cache |= next.particle_density_multiplier != value;
            next.particle_density_multiplier = value;
        }
        if let Some(value) = self.fade_opacity {
            next.fade_opacity = value;
        }

        next.validate()?;
        *config = next;
        Ok(change)
    }
}

/// Largest particle-state texture side accepted; wider textures exceed common device limits.
pub const MAX_STATE_TEXTURE_SIDE: u32 = 16384;

/// Settings for the shader-based execution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Side of the square particle-state texture; particle count is its square.
    pub state_texture_side: u32,
    /// Base per-frame probability that a particle respawns.
    pub drop_rate: f32,
    /// Additional drop probability at full speed.
    pub drop_rate_bump: f32,
    pub fade_opacity: f32,
    pub velocity_scale_factor: f32,
    pub speed_scale: f32,
    pub seed: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            state_texture_side: 256,
            drop_rate: 0.003,
            drop_rate_bump: 0.01,
            fade_opacity: 0.96,
            velocity_scale_factor: 1.0 / 30000.0,
            speed_scale: 3.0,
            seed: 0x5eed,
        }
    }
}

impl GpuConfig {
    pub fn validate(&self) -> FieldResult<()> {
        if self.state_texture_side == 0 || self.state_texture_side > MAX_STATE_TEXTURE_SIDE {
            return Err(invalid("state_texture_side must be in 1..=16384"));
        }
        if !(0.0..=1.0).contains(&self.drop_rate) || !(0.0..=1.0).contains(&self.drop_rate_bump) {
            return Err(invalid("drop rates must be probabilities"));
        }
        if !(self.fade_opacity > 0.0 && self.fade_opacity <= 1.0) {
            return Err(invalid("fade_opacity must be in (0, 1]"));
        }
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        let side = self.state_texture_side as usize;
        side * side
    }
}

//! Shader-based execution of the same advection, drop and fade semantics as the
//! canvas animator, for particle counts in the tens of thousands.

pub mod encoding;
mod pipeline;
pub mod shader;

pub use encoding::{
    FieldUniforms, ParticleStateTexture, PingPong, ScreenUniforms, WindTexture, decode_position,
    encode_position, pseudo_random,
};
pub use pipeline::GpuWindRenderer;

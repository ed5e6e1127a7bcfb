//! Sky system error types.

use aether_atmosphere::AtmosphereError;
use aether_render::{CompositionError, ShaderError, TextureError};

/// Errors surfaced by the sky drawable and its render backend.
#[derive(Debug, thiserror::Error)]
pub enum SkyError {
    #[error("atmosphere precomputation failed: {0}")]
    Atmosphere(#[from] AtmosphereError),

    #[error("shader composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("unknown uniform '{name}'")]
    UnknownUniform { name: String },

    #[error("uniform '{name}' expects a {expected} value")]
    UniformType { name: String, expected: &'static str },

    /// The last rebuild failed; drawing would show outdated tables.
    #[error("sky program is out of date after a failed rebuild")]
    StaleProgram,

    #[error("render backend error: {0}")]
    Backend(String),
}

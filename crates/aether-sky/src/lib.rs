//! The atmospheric sky: astronomy input, the composed sky program and the drawable that renders it.

pub mod astronomy;
pub mod backend;
mod drawable;
mod error;
pub mod fragments;
mod himmel;
mod program;
pub mod uniforms;
mod wgpu_backend;

pub use astronomy::{Astronomy, FixedAstronomy, MEAN_SUN_ANGULAR_RADIUS};
pub use backend::{BlendFactor, BlendFunc, DepthCompare, RenderState, RenderStateGuard, SkyBackend};
pub use drawable::SkyDrawable;
pub use error::SkyError;
pub use himmel::{Himmel, MappedSky, MappingMode};
pub use program::{BuildOptions, DITHER_LEVELS, SkyProgram, macro_set};
pub use uniforms::{SkyUniforms, UniformValue};
pub use wgpu_backend::{COLOR_FORMAT, DEPTH_FORMAT, WgpuBackend, init_wgpu_backend};

//! Shader composition, WGSL compilation, lookup-texture upload, and headless GPU setup.

pub mod compose;
pub mod gpu;
pub mod shader;
pub mod texture;

pub use compose::{CompositionError, MacroSet, MacroValue, ShaderComposer, ShaderFragment, float_literal};
pub use gpu::{GpuContext, GpuError, init_headless_blocking};
pub use shader::{ShaderError, ShaderLibrary};
pub use texture::{
    LOOKUP_FORMAT, LookupTexture, LookupTextures, TextureError, create_lookup_sampler,
};

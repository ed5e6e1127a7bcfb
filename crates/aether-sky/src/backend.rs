//! The narrow render interface the sky drawable draws through.
//!
//! A [`SkyBackend`] owns whatever GPU objects it needs (program, textures,
//! uniform storage) and exposes them as a small set of calls. The drawable
//! never touches a device directly, which keeps it testable with a recording
//! backend.

use aether_atmosphere::{LookupTables, TableResolution};

use crate::error::SkyError;
use crate::uniforms::UniformValue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthCompare {
    #[default]
    Less,
    LessEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Colour blend `src * SRC + dst * DST`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

/// Depth and blend state in effect for the next draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_compare: DepthCompare,
    pub depth_write: bool,
    pub blend: Option<BlendFunc>,
}

impl RenderState {
    /// Opaque geometry: depth test off, writes on, no blending.
    pub const DEFAULT: Self = Self {
        depth_test: false,
        depth_compare: DepthCompare::Less,
        depth_write: true,
        blend: None,
    };

    /// The sky sits on the far plane behind everything already drawn and adds its light.
    pub const SKY: Self = Self {
        depth_test: true,
        depth_compare: DepthCompare::LessEqual,
        depth_write: false,
        blend: Some(BlendFunc {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::One,
        }),
    };
}

impl Default for RenderState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Device operations the sky drawable needs.
pub trait SkyBackend {
    /// Allocate the three lookup textures for `resolution`.
    fn create_textures(&mut self, resolution: &TableResolution) -> Result<(), SkyError>;

    /// Copy freshly computed tables into the lookup textures.
    fn upload_tables(&mut self, tables: &LookupTables) -> Result<(), SkyError>;

    /// Compile and link the sky program, replacing the current one.
    fn build_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<(), SkyError>;

    /// Assign a uniform of the sky program by name.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), SkyError>;

    fn render_state(&self) -> RenderState;

    fn set_render_state(&mut self, state: RenderState);

    /// Draw one full-screen triangle with the current program, textures and state.
    fn draw_fullscreen_triangle(&mut self) -> Result<(), SkyError>;
}

/// Applies a render state and puts the previous one back when dropped.
pub struct RenderStateGuard<'a, B: SkyBackend + ?Sized> {
    backend: &'a mut B,
    previous: RenderState,
}

impl<'a, B: SkyBackend + ?Sized> RenderStateGuard<'a, B> {
    pub fn apply(backend: &'a mut B, state: RenderState) -> Self {
        let previous = backend.render_state();
        backend.set_render_state(state);
        Self { backend, previous }
    }

    pub fn backend(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: SkyBackend + ?Sized> Drop for RenderStateGuard<'_, B> {
    fn drop(&mut self) {
        self.backend.set_render_state(self.previous);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    /// One call observed by [`RecordingBackend`].
    #[derive(Clone, Debug, PartialEq)]
    pub enum Call {
        CreateTextures(TableResolution),
        UploadTables,
        BuildProgram,
        SetUniform(String, UniformValue),
        SetRenderState(RenderState),
        Draw(RenderState),
    }

    /// Backend that records calls instead of talking to a GPU.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub calls: Vec<Call>,
        pub state: RenderState,
        pub fragment_source: String,
        pub fail_draw: bool,
        pub fail_build: bool,
    }

    impl RecordingBackend {
        pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }

        pub fn last_uniform(&self, name: &str) -> Option<UniformValue> {
            self.calls.iter().rev().find_map(|c| match c {
                Call::SetUniform(n, v) if n == name => Some(*v),
                _ => None,
            })
        }
    }

    impl SkyBackend for RecordingBackend {
        fn create_textures(&mut self, resolution: &TableResolution) -> Result<(), SkyError> {
            self.calls.push(Call::CreateTextures(*resolution));
            Ok(())
        }

        fn upload_tables(&mut self, _tables: &LookupTables) -> Result<(), SkyError> {
            self.calls.push(Call::UploadTables);
            Ok(())
        }

        fn build_program(&mut self, _vertex: &str, fragment: &str) -> Result<(), SkyError> {
            if self.fail_build {
                return Err(SkyError::Backend("program link failed".to_string()));
            }
            self.fragment_source = fragment.to_string();
            self.calls.push(Call::BuildProgram);
            Ok(())
        }

        fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), SkyError> {
            self.calls.push(Call::SetUniform(name.to_string(), value));
            Ok(())
        }

        fn render_state(&self) -> RenderState {
            self.state
        }

        fn set_render_state(&mut self, state: RenderState) {
            self.state = state;
            self.calls.push(Call::SetRenderState(state));
        }

        fn draw_fullscreen_triangle(&mut self) -> Result<(), SkyError> {
            self.calls.push(Call::Draw(self.state));
            if self.fail_draw {
                return Err(SkyError::Backend("draw failed".to_string()));
            }
            Ok(())
        }
    }
}

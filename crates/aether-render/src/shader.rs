//! WGSL module compilation and caching.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader building.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' failed to compile: {message}")]
    CompilationFailed { name: String, message: String },

    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },
}

/// Registry of compiled shader modules, keyed by name.
pub struct ShaderLibrary {
    modules: FxHashMap<String, Arc<wgpu::ShaderModule>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self {
            modules: FxHashMap::default(),
        }
    }

    /// Compile a WGSL source string and cache it under `name`, replacing any previous module.
    ///
    /// Errors reported through the module's compilation info are returned as
    /// [`ShaderError::CompilationFailed`]. Validation errors are also reported
    /// to the device's uncaptured error handler.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        debug!("Compiling shader '{}' ({} bytes)", name, source.len());

        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });

        let compilation = pollster::block_on(module.get_compilation_info());
        let mut errors = Vec::new();
        for message in &compilation.messages {
            if message.message_type == wgpu::CompilationMessageType::Error {
                errors.push(message.message.clone());
            } else {
                warn!("Shader '{}': {}", name, message.message);
            }
        }
        if !errors.is_empty() {
            return Err(ShaderError::CompilationFailed {
                name: name.to_string(),
                message: errors.join("\n"),
            });
        }

        let module = Arc::new(module);
        if self
            .modules
            .insert(name.to_string(), Arc::clone(&module))
            .is_some()
        {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }
        Ok(module)
    }

    pub fn get(&self, name: &str) -> Option<Arc<wgpu::ShaderModule>> {
        self.modules.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an error when the module is missing.
    pub fn require(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.get(name).ok_or_else(|| ShaderError::NotLoaded {
            name: name.to_string(),
        })
    }

    /// Drop a cached module. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.modules.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_test_device_queue;

    const VALID_SHADER: &str = r#"
        @vertex
        fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
            return vec4<f32>(0.0, 0.0, 0.0, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    "#;

    #[test]
    fn test_load_valid_shader_succeeds() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        assert!(library.load_from_source(&device, "test", VALID_SHADER).is_ok());
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_reload_replaces_cached_module() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        library
            .load_from_source(&device, "sky", VALID_SHADER)
            .unwrap();
        let original = library.get("sky").unwrap();
        library
            .load_from_source(&device, "sky", VALID_SHADER)
            .unwrap();
        let reloaded = library.get("sky").unwrap();
        assert!(!Arc::ptr_eq(&original, &reloaded));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_library_starts_empty() {
        let library = ShaderLibrary::new();
        assert!(library.is_empty());
        assert!(library.get("missing").is_none());
    }

    #[test]
    fn test_removed_module_is_no_longer_available() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        library
            .load_from_source(&device, "sky.frag", VALID_SHADER)
            .unwrap();
        assert!(library.remove("sky.frag"));
        assert!(!library.remove("sky.frag"));
        assert!(matches!(
            library.require("sky.frag"),
            Err(ShaderError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_require_missing_module_errors() {
        let library = ShaderLibrary::default();
        assert!(matches!(
            library.require("sky-fragment"),
            Err(ShaderError::NotLoaded { .. })
        ));
    }
}

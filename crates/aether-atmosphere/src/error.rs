//! Atmosphere precomputation error types.

/// Errors raised while validating a model or allocating lookup tables.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AtmosphereError {
    /// A physical parameter is outside the range the integrator can handle.
    #[error("invalid model parameter `{name}` = {value}: {reason}")]
    InvalidModelParameter {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },

    /// A table resolution is too small for the parameterisation.
    #[error("invalid table resolution `{name}` = {value}: must be at least {min}")]
    InvalidResolution {
        name: &'static str,
        value: u32,
        min: u32,
    },
}

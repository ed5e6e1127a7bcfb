//! Errors of the `config.ron` layer.

/// Failures while loading or persisting the bake configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config.ron: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("failed to write config.ron: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("failed to parse config.ron: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// The platform reports no configuration directory.
    #[error("no config directory available on this platform")]
    NoConfigDir,
}

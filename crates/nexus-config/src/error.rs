//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and editing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No saved target with this name.
    #[error("target '{0}' not found")]
    TargetNotFound(String),

    /// A saved target with this name already exists.
    #[error("target '{0}' already exists")]
    DuplicateTarget(String),

    /// A header given as `KEY=VALUE` could not be parsed.
    #[error("invalid header '{0}' (expected KEY=VALUE)")]
    InvalidHeader(String),
}

//! Configuration for the Nexus MCP inspector.
//!
//! Provides TOML-based configuration with:
//! - Connection defaults (`[defaults]`): timeouts and the announced client name
//! - Saved targets (`[[targets]]`): URL, transport, manual endpoint, headers
//! - Config file layering (user config + project-local `nexus.toml`)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;

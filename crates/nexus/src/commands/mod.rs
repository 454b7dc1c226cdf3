//! CLI command handlers.

pub mod call;
pub mod connect;
pub mod inspect;
pub mod login;
pub mod render;
pub mod shell;
pub mod target;

use anyhow::Result;
use nexus_config::LoadedConfig;
use nexus_mcp::McpError;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load layered config, surfacing warnings through the log.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = nexus_config::load_config(None)?;
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        if self.verbose {
            for path in loaded.loaded_from() {
                tracing::debug!(path = %path.display(), "loaded config");
            }
        }
        Ok(loaded)
    }
}

/// Turn a session failure into a CLI error that carries its remediation.
pub fn session_failure(err: McpError) -> anyhow::Error {
    match err.hint() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", err, hint.remediation()),
        None => anyhow::anyhow!("{}", err),
    }
}

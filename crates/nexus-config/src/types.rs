//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default connection-establishment timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-call timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default client name announced to servers.
pub const DEFAULT_CLIENT_NAME: &str = "nexus-inspector";

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration.
///
/// ```toml
/// [defaults]
/// connect_timeout_secs = 10
///
/// [[targets]]
/// name = "local"
/// url = "http://localhost:8000/sse"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NexusConfig {
    /// Settings applied to every connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
    /// Saved targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetEntry>,
}

impl NexusConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Defaults merge field by field; targets merge by name.
    pub fn merge(&mut self, other: NexusConfig) {
        if let Some(theirs) = other.defaults {
            let ours = self.defaults.get_or_insert_with(Defaults::default);
            if theirs.connect_timeout_secs.is_some() {
                ours.connect_timeout_secs = theirs.connect_timeout_secs;
            }
            if theirs.request_timeout_secs.is_some() {
                ours.request_timeout_secs = theirs.request_timeout_secs;
            }
            if theirs.client_name.is_some() {
                ours.client_name = theirs.client_name;
            }
        }

        for target in other.targets {
            self.upsert_target(target);
        }
    }

    /// Effective defaults.
    pub fn defaults(&self) -> Defaults {
        self.defaults.clone().unwrap_or_default()
    }

    /// Look up a saved target.
    pub fn target(&self, name: &str) -> Option<&TargetEntry> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Add a new target. Fails if the name is taken.
    pub fn add_target(&mut self, target: TargetEntry) -> Result<()> {
        if self.target(&target.name).is_some() {
            return Err(ConfigError::DuplicateTarget(target.name));
        }
        self.targets.push(target);
        Ok(())
    }

    /// Add a target or replace the one with the same name.
    pub fn upsert_target(&mut self, target: TargetEntry) {
        match self.targets.iter_mut().find(|t| t.name == target.name) {
            Some(existing) => *existing = target,
            None => self.targets.push(target),
        }
    }

    /// Remove a target by name.
    pub fn remove_target(&mut self, name: &str) -> Result<TargetEntry> {
        let index = self
            .targets
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ConfigError::TargetNotFound(name.to_string()))?;
        Ok(self.targets.remove(index))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// `[defaults]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Seconds allowed to reach the ready state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Seconds allowed for one call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Client name announced in `initialize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl Defaults {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn client_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(DEFAULT_CLIENT_NAME)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────────────────────

/// Transport for a saved target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetTransport {
    /// HTTP+SSE with endpoint discovery.
    #[default]
    Sse,
    /// Plain HTTP POST.
    Http,
}

/// A saved MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetEntry {
    /// Unique name used on the command line.
    pub name: String,
    /// Stream URL (sse) or call endpoint (http).
    pub url: String,
    /// Transport type. Defaults to sse.
    #[serde(default)]
    pub transport: TargetTransport,
    /// Call endpoint that bypasses discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Attach a per-session cookie store.
    #[serde(default)]
    pub include_credentials: bool,
    /// HTTP headers (as [key, value] pairs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<[String; 2]>,
}

impl TargetEntry {
    /// Create a target using the streaming transport.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            transport: TargetTransport::Sse,
            endpoint: None,
            auth_token: None,
            include_credentials: false,
            headers: Vec::new(),
        }
    }

    /// Set the transport.
    pub fn with_transport(mut self, transport: TargetTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Set a manual call endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Attach cookies to every call.
    pub fn with_credentials(mut self, include: bool) -> Self {
        self.include_credentials = include;
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push([key.into(), value.into()]);
        self
    }

    /// Headers as (key, value) tuples.
    pub fn header_tuples(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|[k, v]| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether a token is stored in the file itself.
    pub fn has_plaintext_token(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Parse a `KEY=VALUE` (or `KEY: VALUE`) header argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    // Whichever separator comes first; values may contain the other one.
    let (key, value) = raw
        .split_once(['=', ':'])
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

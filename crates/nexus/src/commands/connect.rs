//! Connection flags shared by `inspect`, `call` and `shell`.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use nexus_config::{NexusConfig, TargetEntry, TargetTransport, parse_header};
use nexus_mcp::{ClientInfo, ConnectionConfig, TransportKind};

/// How to reach the server.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Transport binding: sse (endpoint discovery) or http (direct POST)
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// Call endpoint to use instead of waiting for discovery (sse only)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// HTTP header in KEY=VALUE format (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Bearer token
    #[arg(long, env = "NEXUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Keep cookies and attach them to every call
    #[arg(long)]
    pub credentials: bool,

    /// Seconds allowed to reach the ready state
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Seconds allowed for a single call
    #[arg(long)]
    pub request_timeout: Option<u64>,
}

/// Build a connection config for a saved target name or a raw URL.
///
/// Flags override the saved target's fields; config defaults fill the rest.
pub fn resolve_connection(
    target: &str,
    args: &ConnectionArgs,
    config: &NexusConfig,
) -> Result<ConnectionConfig> {
    let defaults = config.defaults();

    let mut conn = match config.target(target) {
        Some(entry) => {
            tracing::debug!(target_name = %entry.name, url = %entry.url, "using saved target");
            from_entry(entry)
        }
        None => ConnectionConfig::new(target),
    }
    .with_connect_timeout(defaults.connect_timeout())
    .with_request_timeout(defaults.request_timeout())
    .with_client_info(ClientInfo::named(defaults.client_name()));

    if let Some(transport) = args.transport {
        conn = conn.with_transport(transport);
    }
    if let Some(ref endpoint) = args.endpoint {
        conn = conn.with_endpoint(endpoint.clone());
    }
    if let Some(ref token) = args.token {
        conn = conn.with_auth_token(token.clone());
    }
    for raw in &args.headers {
        let (key, value) = parse_header(raw)?;
        conn = conn.with_header(key, value);
    }
    if args.credentials {
        conn = conn.with_credentials(true);
    }
    if let Some(secs) = args.connect_timeout {
        conn = conn.with_connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.request_timeout {
        conn = conn.with_request_timeout(Duration::from_secs(secs));
    }

    Ok(conn)
}

/// Convert a saved target into a connection config.
fn from_entry(entry: &TargetEntry) -> ConnectionConfig {
    let mut conn = ConnectionConfig::new(&entry.url)
        .with_transport(transport_kind(entry.transport))
        .with_credentials(entry.include_credentials);

    if let Some(ref endpoint) = entry.endpoint {
        conn = conn.with_endpoint(endpoint.clone());
    }
    if let Some(ref token) = entry.auth_token {
        conn = conn.with_auth_token(token.clone());
    }
    for (key, value) in entry.header_tuples() {
        conn = conn.with_header(key, value);
    }
    conn
}

pub fn transport_kind(transport: TargetTransport) -> TransportKind {
    match transport {
        TargetTransport::Sse => TransportKind::Streaming,
        TargetTransport::Http => TransportKind::Direct,
    }
}

pub fn target_transport(kind: TransportKind) -> TargetTransport {
    match kind {
        TransportKind::Streaming => TargetTransport::Sse,
        TransportKind::Direct => TargetTransport::Http,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_config::Defaults;

    fn saved() -> NexusConfig {
        let mut config = NexusConfig::new();
        config
            .add_target(
                TargetEntry::new("local", "http://localhost:8000/mcp")
                    .with_transport(TargetTransport::Http)
                    .with_auth_token("saved-token")
                    .with_header("X-Team", "core"),
            )
            .unwrap();
        config.defaults = Some(Defaults {
            connect_timeout_secs: Some(4),
            client_name: Some("ci".to_string()),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_raw_url_uses_defaults() {
        let conn =
            resolve_connection("http://example.com/sse", &ConnectionArgs::default(), &saved())
                .unwrap();
        assert_eq!(conn.target, "http://example.com/sse");
        assert_eq!(conn.transport, TransportKind::Streaming);
        assert_eq!(conn.connect_timeout, Duration::from_secs(4));
        assert_eq!(conn.client_info.name, "ci");
        assert!(conn.auth_token.is_none());
    }

    #[test]
    fn test_saved_target_fields() {
        let conn = resolve_connection("local", &ConnectionArgs::default(), &saved()).unwrap();
        assert_eq!(conn.target, "http://localhost:8000/mcp");
        assert_eq!(conn.transport, TransportKind::Direct);
        assert_eq!(conn.auth_token.as_deref(), Some("saved-token"));
        assert_eq!(
            conn.headers,
            vec![("X-Team".to_string(), "core".to_string())]
        );
    }

    #[test]
    fn test_flags_override_saved_target() {
        let args = ConnectionArgs {
            transport: Some(TransportKind::Streaming),
            endpoint: Some("http://localhost:8000/messages".to_string()),
            headers: vec!["X-Team=edge".to_string()],
            token: Some("flag-token".to_string()),
            credentials: true,
            connect_timeout: Some(2),
            request_timeout: Some(7),
        };
        let conn = resolve_connection("local", &args, &saved()).unwrap();
        assert_eq!(conn.transport, TransportKind::Streaming);
        assert_eq!(
            conn.manual_endpoint.as_deref(),
            Some("http://localhost:8000/messages")
        );
        assert_eq!(conn.auth_token.as_deref(), Some("flag-token"));
        assert_eq!(conn.headers.last().unwrap().1, "edge");
        assert!(conn.include_credentials);
        assert_eq!(conn.connect_timeout, Duration::from_secs(2));
        assert_eq!(conn.request_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_bad_header_flag() {
        let args = ConnectionArgs {
            headers: vec!["nonsense".to_string()],
            ..Default::default()
        };
        assert!(resolve_connection("local", &args, &saved()).is_err());
    }
}

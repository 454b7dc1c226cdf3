//! MCP session handshake: initialize, acknowledge, discover.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::JsonRpcClient;
use crate::diagnostics::DiagnosticLog;
use crate::error::{McpError, Result};
use crate::protocol::{
    ClientInfo, InitializeParams, InitializeResult, PromptInfo, ResourceInfo, ToolInfo,
};

/// One of the list surfaces probed during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Tools,
    Resources,
    Prompts,
}

impl Surface {
    /// The list method for this surface.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Tools => "tools/list",
            Self::Resources => "resources/list",
            Self::Prompts => "prompts/list",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// How probing one surface went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SurfaceStatus {
    /// The server answered with a list.
    Listed { count: usize },
    /// The server answered with a JSON-RPC error.
    Unsupported { code: i64, message: String },
    /// The call failed below the protocol level.
    Failed { message: String },
}

/// Probe outcome for one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceReport {
    pub surface: Surface,
    #[serde(flatten)]
    pub status: SurfaceStatus,
}

/// Everything capability discovery found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub tools: Vec<ToolInfo>,
    pub resources: Vec<ResourceInfo>,
    pub prompts: Vec<PromptInfo>,
    pub status: Vec<SurfaceReport>,
}

impl Catalog {
    /// Probe outcome for a surface, if it was probed.
    pub fn status_of(&self, surface: Surface) -> Option<&SurfaceStatus> {
        self.status
            .iter()
            .find(|report| report.surface == surface)
            .map(|report| &report.status)
    }
}

/// Drives the three handshake steps against a resolved endpoint.
pub struct SessionHandshake {
    rpc: Arc<JsonRpcClient>,
    endpoint: Url,
    diagnostics: DiagnosticLog,
}

impl SessionHandshake {
    pub fn new(rpc: Arc<JsonRpcClient>, endpoint: Url, diagnostics: DiagnosticLog) -> Self {
        Self {
            rpc,
            endpoint,
            diagnostics,
        }
    }

    /// Step 1. Any failure here fails the connection attempt.
    pub async fn initialize(&self, client_info: &ClientInfo) -> Result<InitializeResult> {
        let params = InitializeParams::for_client(client_info.clone());
        let result = self
            .rpc
            .call(
                &self.endpoint,
                "initialize",
                Some(serde_json::to_value(&params)?),
            )
            .await
            .map_err(|e| McpError::HandshakeFailed(Box::new(e)))?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::HandshakeFailed(Box::new(e.into())))?;

        let server = init
            .server_info
            .as_ref()
            .map(|s| format!("{} {}", s.name, s.version))
            .unwrap_or_else(|| "unnamed server".to_string());
        tracing::info!(
            server = %server,
            protocol = init.protocol_version.as_deref().unwrap_or("unspecified"),
            "MCP server initialized"
        );
        self.diagnostics.info(format!("initialized {}", server));

        Ok(init)
    }

    /// Step 2. Best effort; a failure is logged only.
    pub async fn acknowledge(&self) {
        if let Err(e) = self
            .rpc
            .notify(&self.endpoint, "notifications/initialized", None)
            .await
        {
            tracing::warn!(error = %e, "initialized notification failed, continuing");
        }
    }

    /// Step 3. Each surface is probed independently and never fails the session.
    pub async fn discover(&self) -> Catalog {
        let mut catalog = Catalog::default();

        let (tools, report) = self.probe_list::<ToolInfo>(Surface::Tools).await;
        catalog.tools = tools;
        catalog.status.push(report);

        let (resources, report) = self.probe_list::<ResourceInfo>(Surface::Resources).await;
        catalog.resources = resources;
        catalog.status.push(report);

        let (prompts, report) = self.probe_list::<PromptInfo>(Surface::Prompts).await;
        catalog.prompts = prompts;
        catalog.status.push(report);

        tracing::debug!(
            tools = catalog.tools.len(),
            resources = catalog.resources.len(),
            prompts = catalog.prompts.len(),
            "capability discovery finished"
        );
        catalog
    }

    async fn probe_list<T: DeserializeOwned>(&self, surface: Surface) -> (Vec<T>, SurfaceReport) {
        let outcome = self.rpc.call(&self.endpoint, surface.method(), None).await;

        let status_and_items = match outcome {
            Ok(result) => match parse_list::<T>(&result, surface.field()) {
                Ok(items) => Ok(items),
                Err(e) => Err(SurfaceStatus::Failed {
                    message: e.to_string(),
                }),
            },
            Err(e) if e.is_method_not_found() => {
                self.diagnostics
                    .info(format!("{} not supported by server ({})", surface, e));
                Err(unsupported(e))
            }
            Err(e) if e.is_protocol() => {
                self.diagnostics
                    .error(format!("{} rejected by server: {}", surface, e));
                Err(unsupported(e))
            }
            Err(e) => {
                tracing::warn!(surface = %surface, error = %e, "capability probe failed");
                Err(SurfaceStatus::Failed {
                    message: e.to_string(),
                })
            }
        };

        match status_and_items {
            Ok(items) => {
                let report = SurfaceReport {
                    surface,
                    status: SurfaceStatus::Listed { count: items.len() },
                };
                (items, report)
            }
            Err(status) => (Vec::new(), SurfaceReport { surface, status }),
        }
    }
}

/// Map a JSON-RPC error on a list probe to a non-fatal status.
fn unsupported(err: McpError) -> SurfaceStatus {
    match err {
        McpError::Protocol { code, message, .. } => SurfaceStatus::Unsupported { code, message },
        other => SurfaceStatus::Failed {
            message: other.to_string(),
        },
    }
}

/// Pull the named array out of a list result. `null` or a missing field is empty.
fn parse_list<T: DeserializeOwned>(result: &Value, field: &str) -> Result<Vec<T>> {
    match result.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => serde_json::from_value(items.clone())
            .map_err(|e| McpError::decode(format!("malformed {} list: {}", field, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_surface_methods() {
        assert_eq!(Surface::Tools.method(), "tools/list");
        assert_eq!(Surface::Resources.method(), "resources/list");
        assert_eq!(Surface::Prompts.method(), "prompts/list");
        assert_eq!(Surface::Prompts.to_string(), "prompts");
    }

    #[test]
    fn test_parse_list() {
        let tools: Vec<ToolInfo> =
            parse_list(&json!({"tools": [{"name": "echo"}]}), "tools").unwrap();
        assert_eq!(tools[0].name, "echo");

        let empty: Vec<ToolInfo> = parse_list(&Value::Null, "tools").unwrap();
        assert!(empty.is_empty());

        let bad = parse_list::<ToolInfo>(&json!({"tools": [{"nope": 1}]}), "tools");
        assert!(matches!(bad, Err(McpError::Decode(_))));
    }

    #[test]
    fn test_catalog_status_lookup() {
        let catalog = Catalog {
            status: vec![SurfaceReport {
                surface: Surface::Resources,
                status: SurfaceStatus::Unsupported {
                    code: -32601,
                    message: "Method not found".to_string(),
                },
            }],
            ..Default::default()
        };
        assert!(matches!(
            catalog.status_of(Surface::Resources),
            Some(SurfaceStatus::Unsupported { code: -32601, .. })
        ));
        assert!(catalog.status_of(Surface::Tools).is_none());
    }

    #[test]
    fn test_surface_report_serialization() {
        let report = SurfaceReport {
            surface: Surface::Tools,
            status: SurfaceStatus::Listed { count: 2 },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"surface": "tools", "status": "listed", "count": 2})
        );
    }
}

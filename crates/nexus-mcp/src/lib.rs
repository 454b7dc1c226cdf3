//! MCP (Model Context Protocol) session client for the Nexus inspector.
//!
//! This crate connects to an MCP server over HTTP, runs the initialization
//! handshake, lists what the server offers and lets an operator call tools
//! while recording every exchange in a diagnostic log.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ConnectionManager                                          │
//! │  - Session state machine, connect/disconnect/call_tool      │
//! │  - Owns the DiagnosticLog                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionHandshake                                           │
//! │  - initialize, notifications/initialized                    │
//! │  - tools/list, resources/list, prompts/list                 │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  JsonRpcClient                                              │
//! │  - Id allocation, pending-call table, response dispatch     │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TransportBinding                                           │
//! │  - StreamingDiscovery: SSE stream announces the endpoint    │
//! │  - DirectCall: the target URL is the endpoint               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use nexus_mcp::{ConnectionConfig, ConnectionManager};
//!
//! let manager = ConnectionManager::new(ConnectionConfig::new("http://localhost:8000/sse"));
//! let summary = manager.connect().await?;
//! for tool in &summary.catalog.tools {
//!     println!("Tool: {} - {:?}", tool.name, tool.description);
//! }
//!
//! let result = manager.call_tool("echo", json!({"text": "hi"})).await?;
//! println!("{}", result);
//!
//! for event in manager.diagnostic_events() {
//!     println!("{}", event);
//! }
//! ```
//!
//! # MCP over HTTP+SSE
//!
//! The protocol flow is:
//! 1. Client opens `GET <url>` with `Accept: text/event-stream`
//! 2. Server sends `event: endpoint` with the URL to POST calls to
//! 3. Client POSTs `initialize`, then `notifications/initialized`
//! 4. Client can now list surfaces and call tools

pub mod auth;
pub mod client;
pub mod codec;
pub mod diagnostics;
pub mod error;
pub mod handshake;
pub mod manager;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use auth::fetch_token;
pub use client::{JsonRpcClient, PendingCall, PendingCalls};
pub use codec::RpcEnvelope;
pub use diagnostics::{DiagnosticEvent, DiagnosticLog, Direction};
pub use error::{McpError, Result};
pub use handshake::{Catalog, SessionHandshake, Surface, SurfaceReport, SurfaceStatus};
pub use manager::{ConnectionManager, SessionState, SessionSummary};
pub use protocol::{
    CallToolParams, ClientCapabilities, ClientInfo, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, PromptInfo, RequestId, ResourceInfo,
    ServerCapabilities, ServerInfo, ToolInfo,
};
pub use transport::{
    ConnectionConfig, FailureHint, TransportBinding, TransportKind, normalize_url,
};

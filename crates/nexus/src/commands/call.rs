//! `nexus call` - invoke one tool and print its verbatim result.

use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};

use nexus_mcp::protocol::result_is_error;
use nexus_mcp::{ConnectionManager, McpError};

use super::connect::{ConnectionArgs, resolve_connection};
use super::render::print_diagnostics;
use super::{Context, session_failure};

/// Arguments for `nexus call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Saved target name or server URL
    pub target: String,

    /// Tool name
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print the diagnostic log after the call
    #[arg(long)]
    pub log: bool,
}

/// Parse `--args`, which must be a JSON object.
pub fn parse_arguments(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("invalid tool arguments '{}': {}", raw, e))?;
    if !value.is_object() {
        anyhow::bail!("tool arguments must be a JSON object, got: {}", raw);
    }
    Ok(value)
}

/// Run `nexus call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments = parse_arguments(&args.args)?;

    let loaded = ctx.load_config()?;
    let config = resolve_connection(&args.target, &args.connection, &loaded.config)?;
    let manager = ConnectionManager::new(config);

    if let Err(e) = manager.connect().await {
        if args.log {
            print_diagnostics(&manager.diagnostic_events(), None);
        }
        manager.disconnect();
        return Err(session_failure(e));
    }

    let outcome = manager.call_tool(&args.tool, arguments).await;
    let events = manager.diagnostic_events();
    manager.disconnect();

    if args.log && !ctx.json_output {
        print_diagnostics(&events, None);
        println!();
    }

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result_is_error(&result) {
                anyhow::bail!("tool '{}' reported an error", args.tool);
            }
            Ok(())
        }
        Err(McpError::Protocol {
            code,
            message,
            data,
        }) => {
            let error = json!({ "code": code, "message": message, "data": data });
            println!("{}", serde_json::to_string_pretty(&error)?);
            anyhow::bail!("tool '{}' failed: {} ({})", args.tool, message, code)
        }
        Err(e) => Err(session_failure(e)),
    }
}

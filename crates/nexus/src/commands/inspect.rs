//! `nexus inspect` - connect, list everything the server offers, disconnect.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use nexus_mcp::ConnectionManager;

use super::connect::{ConnectionArgs, resolve_connection};
use super::render::{filter_catalog, print_catalog, print_diagnostics, print_summary};
use super::{Context, session_failure};

/// Arguments for `nexus inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Saved target name or server URL
    pub target: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only show items whose name contains this text (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,

    /// Print the diagnostic log after inspecting
    #[arg(long)]
    pub log: bool,
}

/// Run `nexus inspect`.
pub async fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = resolve_connection(&args.target, &args.connection, &loaded.config)?;
    let manager = ConnectionManager::new(config);

    let outcome = manager.connect().await;
    let events = manager.diagnostic_events();
    manager.disconnect();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if args.log && !ctx.json_output {
                print_diagnostics(&events, None);
                println!();
            }
            return Err(session_failure(e));
        }
    };

    let catalog = filter_catalog(&summary.catalog, args.filter.as_deref());

    if ctx.json_output {
        let mut output = json!({
            "endpoint": summary.endpoint,
            "transport": summary.transport,
            "protocolVersion": summary.protocol_version,
            "serverInfo": summary.server_info,
            "capabilities": summary.capabilities,
            "catalog": catalog,
        });
        if args.log {
            output["diagnostics"] = json!(events);
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_summary(&summary);
    print_catalog(&catalog, ctx.verbose);
    if args.log {
        print_diagnostics(&events, None);
    }

    Ok(())
}

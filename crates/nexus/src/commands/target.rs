//! Saved target management.
//!
//! - `nexus target list` - List saved targets
//! - `nexus target add` - Save a new target
//! - `nexus target remove` - Delete a saved target

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use serde_json::json;

use nexus_config::{LoadedConfig, TargetEntry, parse_header, save_config};
use nexus_mcp::TransportKind;

use super::Context;
use super::connect::target_transport;
use super::render::truncate;

/// Saved target commands.
#[derive(Args, Debug)]
pub struct TargetArgs {
    #[command(subcommand)]
    pub command: TargetCommand,
}

#[derive(Subcommand, Debug)]
pub enum TargetCommand {
    /// List saved targets
    List,

    /// Save a new target
    Add(AddArgs),

    /// Delete a saved target
    Remove(RemoveArgs),
}

/// Arguments for `nexus target add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique name for this target
    pub name: String,

    /// Stream URL (sse) or call endpoint (http)
    pub url: String,

    /// Transport binding: sse or http
    #[arg(long, default_value = "sse")]
    pub transport: TransportKind,

    /// Call endpoint that bypasses discovery (sse only)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// HTTP header in KEY=VALUE format (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Bearer token to store with the target
    #[arg(long)]
    pub token: Option<String>,

    /// Keep cookies and attach them to every call
    #[arg(long)]
    pub credentials: bool,
}

/// Arguments for `nexus target remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Name of the target to remove
    pub name: String,
}

/// Run the target command.
pub async fn run(args: TargetArgs, ctx: &Context) -> Result<()> {
    match args.command {
        TargetCommand::List => run_list(ctx),
        TargetCommand::Add(add_args) => run_add(add_args, ctx),
        TargetCommand::Remove(remove_args) => run_remove(remove_args, ctx),
    }
}

fn run_list(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let targets = &loaded.config.targets;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("No saved targets.");
        println!();
        println!("Add one with:");
        println!("  nexus target add <name> <url> [--transport http]");
        return Ok(());
    }

    println!("{:<20} {:<10} {:<50}", "NAME", "TRANSPORT", "URL");
    println!("{}", "-".repeat(80));
    for target in targets {
        let transport = match target.transport {
            nexus_config::TargetTransport::Sse => "sse",
            nexus_config::TargetTransport::Http => "http",
        };
        println!(
            "{:<20} {:<10} {:<50}",
            truncate(&target.name, 20),
            transport,
            truncate(&target.url, 50)
        );

        if ctx.verbose {
            if let Some(ref endpoint) = target.endpoint {
                println!("  Endpoint: {}", endpoint);
            }
            if target.has_plaintext_token() {
                println!("  Token:    (set)");
            }
            if target.include_credentials {
                println!("  Credentials: included");
            }
            for [key, value] in &target.headers {
                println!("  Header:   {}: {}", key, value);
            }
        }
    }

    Ok(())
}

fn run_add(args: AddArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let mut config = loaded.config.clone();

    let mut entry = TargetEntry::new(&args.name, &args.url)
        .with_transport(target_transport(args.transport))
        .with_credentials(args.credentials);
    if let Some(endpoint) = args.endpoint {
        entry = entry.with_endpoint(endpoint);
    }
    if let Some(token) = args.token {
        entry = entry.with_auth_token(token);
    }
    for raw in &args.headers {
        let (key, value) = parse_header(raw)?;
        entry = entry.with_header(key, value);
    }

    config.add_target(entry).map_err(|e| {
        anyhow::anyhow!("{}. Use 'nexus target remove {}' first.", e, args.name)
    })?;

    let path = save_path(&loaded)?;
    save_config(&config, &path)?;
    tracing::info!(target_name = %args.name, path = %path.display(), "saved target");

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "added",
                "name": args.name,
                "config_path": path.display().to_string(),
            }))?
        );
    } else {
        println!(
            "{} target '{}' to {}",
            style("Added").green(),
            args.name,
            path.display()
        );
    }
    Ok(())
}

fn run_remove(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let mut config = loaded.config.clone();
    config.remove_target(&args.name)?;

    let path = save_path(&loaded)?;
    save_config(&config, &path)?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "removed",
                "name": args.name,
                "config_path": path.display().to_string(),
            }))?
        );
    } else {
        println!("{} target '{}'", style("Removed").green(), args.name);
    }
    Ok(())
}

/// Where edits are written.
pub fn save_path(loaded: &LoadedConfig) -> Result<PathBuf> {
    loaded
        .save_path()
        .ok_or_else(|| anyhow::anyhow!("no config directory available; set NEXUS_CONFIG_DIR"))
}

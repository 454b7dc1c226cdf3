//! Nexus - MCP server inspector
//!
//! Main entry point for the Nexus CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{call, inspect, login, shell, target};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Nexus - Inspect and exercise MCP servers
#[derive(Parser)]
#[command(name = "nexus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to a server and list what it offers
    Inspect(inspect::InspectArgs),

    /// Call a single tool and print the raw result
    Call(call::CallArgs),

    /// Open an interactive session with a server
    Shell(shell::ShellArgs),

    /// Manage saved targets
    Target(target::TargetArgs),

    /// Exchange a username and password for a bearer token
    Login(login::LoginArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "nexus=debug,nexus_mcp=debug,nexus_config=debug,info"
    } else {
        "nexus=info,nexus_mcp=info,warn"
    };

    let log_dir = nexus_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nexus.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "nexus=trace,nexus_mcp=trace,nexus_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Inspect(args) => inspect::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Shell(args) => shell::run(args, &ctx).await,
        Commands::Target(args) => target::run(args, &ctx).await,
        Commands::Login(args) => login::run(args, &ctx).await,
    }
}

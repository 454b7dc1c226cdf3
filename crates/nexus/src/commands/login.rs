//! `nexus login` - password-grant token exchange.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use serde_json::json;

use nexus_config::{TargetEntry, save_config};
use nexus_mcp::auth::fetch_token_with_timeout;

use super::target::save_path;
use super::{Context, session_failure};

/// Arguments for `nexus login`.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Server URL; the token is requested from `/token` on its origin
    pub url: String,

    /// Username
    #[arg(long, short = 'u')]
    pub username: String,

    /// Password (prompted for when omitted)
    #[arg(long, env = "NEXUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Store the token on this saved target (created if missing)
    #[arg(long)]
    pub save: Option<String>,

    /// Seconds allowed for the token request
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Run `nexus login`.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password(format!("Password for {}: ", args.username))?,
    };
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| loaded.config.defaults().request_timeout());

    let token = fetch_token_with_timeout(&args.url, &args.username, &password, timeout)
        .await
        .map_err(session_failure)?;

    let Some(name) = args.save else {
        if ctx.json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "access_token": token }))?
            );
        } else {
            println!("{}", token);
        }
        return Ok(());
    };

    let mut config = loaded.config.clone();
    let entry = match config.target(&name) {
        Some(existing) => existing.clone().with_auth_token(token),
        None => TargetEntry::new(&name, &args.url).with_auth_token(token),
    };
    config.upsert_target(entry);

    let path = save_path(&loaded)?;
    save_config(&config, &path)?;
    tracing::info!(target_name = %name, path = %path.display(), "stored access token");

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "saved",
                "name": name,
                "config_path": path.display().to_string(),
            }))?
        );
    } else {
        println!(
            "{} token stored on target '{}' in {}",
            style("Logged in:").green(),
            name,
            path.display()
        );
    }
    Ok(())
}

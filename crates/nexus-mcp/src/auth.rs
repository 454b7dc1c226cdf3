//! Password-grant token login.
//!
//! Some MCP servers sit behind an OAuth2-style `/token` endpoint on the same
//! origin. The returned access token is then sent as the bearer token.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{McpError, Result};
use crate::transport::{DEFAULT_REQUEST_TIMEOUT, normalize_url};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// The `/token` URL on the target's origin.
pub fn token_url(target: &str) -> Result<Url> {
    let target = normalize_url(target)?;
    Ok(target.join("/token")?)
}

/// Exchange a username and password for an access token.
pub async fn fetch_token(target: &str, username: &str, password: &str) -> Result<String> {
    fetch_token_with_timeout(target, username, password, DEFAULT_REQUEST_TIMEOUT).await
}

/// [`fetch_token`] with an explicit timeout.
pub async fn fetch_token_with_timeout(
    target: &str,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<String> {
    let url = token_url(target)?;
    tracing::info!(url = %url, username, "requesting access token");

    let response = reqwest::Client::new()
        .post(url.clone())
        .form(&[("username", username), ("password", password)])
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| McpError::transport(format!("token request to {} failed: {}", url, e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| McpError::transport(format!("failed to read token response: {}", e)))?;

    if !status.is_success() {
        return Err(McpError::Transport {
            message: format!("login failed with HTTP {}: {}", status.as_u16(), body.trim()),
            status: Some(status.as_u16()),
            hint: None,
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&body)?;
    parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| McpError::decode("token response has no access_token"))
}

//! Configuration management for the Spotify client library.
//!
//! This module handles loading and accessing configuration values from
//! environment variables and `.env` files. Endpoint URLs carry production
//! defaults and can be overridden through the environment (which is also how
//! the integration tests point the library at a local mock server).
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Built-in endpoint defaults (where applicable)

use std::{env, path::PathBuf};

const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the necessary directory structure if it doesn't exist and loads
/// environment variables from a `.env` file located in the platform-specific
/// local data directory under `spotikit/.env`. This allows users to store
/// client credentials without hardcoding sensitive values.
///
/// # Directory Structure
///
/// The function looks for the `.env` file in:
/// - Linux: `~/.local/share/spotikit/.env`
/// - macOS: `~/Library/Application Support/spotikit/.env`
/// - Windows: `%LOCALAPPDATA%/spotikit/.env`
///
/// # Errors
///
/// Returns an error string if the parent directory cannot be created or the
/// `.env` file cannot be read or parsed.
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotikit/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    dotenv::from_path(path).map_err(|e| e.to_string())?;
    Ok(())
}

/// Returns the base URL of the Web API, `SPOTIFY_API_BASE_URL` or the
/// production endpoint.
pub fn api_base_url() -> String {
    env::var("SPOTIFY_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

/// Returns the OAuth authorization endpoint, `SPOTIFY_API_AUTH_URL` or the
/// production endpoint.
pub fn authorize_url() -> String {
    env::var("SPOTIFY_API_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTHORIZE_URL.to_string())
}

/// Returns the OAuth token endpoint, `SPOTIFY_API_TOKEN_URL` or the
/// production endpoint.
pub fn token_url() -> String {
    env::var("SPOTIFY_API_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string())
}

/// Returns the application client ID for authentication.
///
/// # Panics
///
/// Panics if the `SPOTIFY_API_AUTH_CLIENT_ID` environment variable is not set.
pub fn client_id() -> String {
    env::var("SPOTIFY_API_AUTH_CLIENT_ID").expect("SPOTIFY_API_AUTH_CLIENT_ID must be set")
}

/// Returns the application client secret for authentication.
///
/// # Panics
///
/// Panics if the `SPOTIFY_API_AUTH_CLIENT_SECRET` environment variable is not
/// set.
///
/// # Security Note
///
/// The client secret should be kept confidential and never exposed in logs
/// or version control.
pub fn client_secret() -> String {
    env::var("SPOTIFY_API_AUTH_CLIENT_SECRET").expect("SPOTIFY_API_AUTH_CLIENT_SECRET must be set")
}

/// Returns the OAuth redirect URI registered for the application.
///
/// # Panics
///
/// Panics if the `SPOTIFY_API_REDIRECT_URI` environment variable is not set.
pub fn redirect_uri() -> String {
    env::var("SPOTIFY_API_REDIRECT_URI").expect("SPOTIFY_API_REDIRECT_URI must be set")
}

/// Returns the scope string requested during user authorization, or an empty
/// scope when `SPOTIFY_API_AUTH_SCOPE` is unset.
pub fn scope() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_SCOPE").ok()
}

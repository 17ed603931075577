//! Asynchronous Spotify Web API Client Library
//!
//! This library provides an async client for the Spotify Web API. It handles
//! the OAuth 2.0 token lifecycle (including scheduled background refresh),
//! issues HTTP requests with automatic rate-limit and transient-error
//! recovery, and exposes paginated list endpoints as lazy item sequences.
//!
//! # Modules
//!
//! - `client` - High-level API facade mapping operations onto HTTP routes
//! - `config` - Configuration management and environment variables
//! - `error` - Error taxonomy for authentication and HTTP failures
//! - `http` - HTTP transport with retry, rate-limit and refresh handling
//! - `listener` - Local HTTP server for capturing OAuth redirects
//! - `oauth` - Grant flows, credentials and the refresh session
//! - `pager` - Lazy pagination over windowed list responses
//! - `types` - Wire-level data structures
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use spotikit::{Client, ClientCredentialsFlow};
//!
//! #[tokio::main]
//! async fn main() -> spotikit::Result<()> {
//!     let client = Client::new(ClientCredentialsFlow::from_env());
//!     client.authorize().await?;
//!     let album = client.get_album("4aawyAB9vmqN3uQ7FjRGTy").await?;
//!     println!("{}", album["name"]);
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod listener;
pub mod oauth;
pub mod pager;
pub mod types;
pub mod utils;

pub use client::Client;
pub use error::{ApiError, Error};
pub use http::{Body, Http, Route};
pub use oauth::flows::{AuthorizationCodeFlow, ClientCredentialsFlow, EasyAuthCodeFlow, GrantFlow};
pub use oauth::response::Credential;
pub use oauth::session::AuthSession;
pub use pager::Pager;

/// A convenient Result type alias for operations that may fail.
///
/// Every fallible operation in this library resolves to either a decoded
/// value or one typed [`Error`]; no sentinel values are used to signal
/// failure.
///
/// # Example
///
/// ```
/// use spotikit::Result;
///
/// async fn fetch_data() -> Result<String> {
///     Ok("data".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

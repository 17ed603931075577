//! OAuth 2.0 grant flows.
//!
//! Three interchangeable strategies produce and refresh a [`Credential`]:
//!
//! - [`ClientCredentialsFlow`] - machine-to-machine access to public
//!   resources; no user context, no refresh token, "refreshing" simply
//!   re-runs the grant.
//! - [`AuthorizationCodeFlow`] - user-delegated access; a one-time consent
//!   step yields an authorization code that is exchanged for a credential
//!   carrying a refresh token. Supports PKCE for clients that cannot keep a
//!   secret.
//! - [`EasyAuthCodeFlow`] - the authorization-code flow with durable storage
//!   of the credential, so a restarted process does not require re-consent
//!   unless the stored refresh token itself is rejected.
//!
//! All token-endpoint calls go through plain `reqwest` rather than the
//! authorized transport, since by definition no usable credential exists yet
//! while they run.

use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use log::warn;
use reqwest::{Url, header::AUTHORIZATION};

use crate::{
    config,
    error::Error,
    types::TokenResponse,
    utils::{generate_code_challenge, generate_code_verifier},
};

use super::response::Credential;

/// POSTs a grant-type form to the token endpoint and decodes the response.
///
/// `basic` carries the client id/secret pair for HTTP Basic authentication;
/// PKCE exchanges pass `None` and identify the client in the form instead.
async fn post_token(
    token_url: &str,
    form: &[(&str, String)],
    basic: Option<(&str, &str)>,
) -> crate::Result<TokenResponse> {
    let client = reqwest::Client::new();
    let mut request = client.post(token_url).form(form);

    if let Some((id, secret)) = basic {
        let raw = format!("{id}:{secret}");
        request = request.header(AUTHORIZATION, format!("Basic {}", STANDARD.encode(raw)));
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("token endpoint returned {status}"));
        return Err(Error::Authentication(message));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Maps a failed token request to the refresh-specific error class.
fn as_refresh_failure(err: Error) -> Error {
    match err {
        Error::Authentication(message) => Error::RefreshTokenFailed(message),
        other => other,
    }
}

/// The client-credentials grant. Only public resources are accessible
/// through credentials obtained this way.
#[derive(Debug, Clone)]
pub struct ClientCredentialsFlow {
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl ClientCredentialsFlow {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        ClientCredentialsFlow {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: config::token_url(),
        }
    }

    /// Builds the flow from the `SPOTIFY_API_AUTH_CLIENT_ID` and
    /// `SPOTIFY_API_AUTH_CLIENT_SECRET` environment variables.
    ///
    /// # Panics
    ///
    /// Panics if either variable is not set.
    pub fn from_env() -> Self {
        Self::new(config::client_id(), config::client_secret())
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub(crate) async fn obtain(&self) -> crate::Result<Credential> {
        let form = [("grant_type", "client_credentials".to_string())];
        let response = post_token(
            &self.token_url,
            &form,
            Some((&self.client_id, &self.client_secret)),
        )
        .await?;

        Ok(Credential::from_response(response))
    }
}

/// The authorization-code grant, with optional PKCE.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeFlow {
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    redirect_uri: String,
    pkce_verifier: Option<String>,
    authorize_endpoint: String,
    token_endpoint: String,
}

impl AuthorizationCodeFlow {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        AuthorizationCodeFlow {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
            redirect_uri: redirect_uri.into(),
            pkce_verifier: None,
            authorize_endpoint: config::authorize_url(),
            token_endpoint: config::token_url(),
        }
    }

    /// Builds the flow from the `SPOTIFY_API_AUTH_*` and
    /// `SPOTIFY_API_REDIRECT_URI` environment variables.
    ///
    /// # Panics
    ///
    /// Panics if a required variable is not set.
    pub fn from_env() -> Self {
        Self::new(
            config::client_id(),
            config::client_secret(),
            config::scope(),
            config::redirect_uri(),
        )
    }

    /// Enables PKCE: a fresh code verifier is generated and its SHA-256
    /// challenge is attached to the authorization URL. The token exchange
    /// then proves possession of the verifier instead of sending the client
    /// secret.
    pub fn with_pkce(mut self) -> Self {
        self.pkce_verifier = Some(generate_code_verifier());
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_endpoint = url.into();
        self
    }

    /// Crafts the URL the user must open to grant the application consent.
    pub fn authorize_url(&self) -> crate::Result<String> {
        let mut url = Url::parse(&self.authorize_endpoint)
            .map_err(|e| Error::Authentication(format!("invalid authorize endpoint: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &self.redirect_uri);

            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }

            if let Some(verifier) = &self.pkce_verifier {
                query.append_pair("code_challenge", &generate_code_challenge(verifier));
                query.append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url.to_string())
    }

    /// Exchanges the one-time authorization code for the initial credential.
    pub(crate) async fn exchange_code(&self, code: &str) -> crate::Result<Credential> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
        ];

        let basic = match &self.pkce_verifier {
            Some(verifier) => {
                form.push(("client_id", self.client_id.clone()));
                form.push(("code_verifier", verifier.clone()));
                None
            }
            None => Some((self.client_id.as_str(), self.client_secret.as_str())),
        };

        let response = post_token(&self.token_endpoint, &form, basic).await?;

        Ok(Credential::from_response(response))
    }

    /// Trades the current refresh token for a fresh credential.
    ///
    /// The server may legitimately omit `refresh_token` from a refresh
    /// response, in which case the prior value is carried over unchanged.
    pub(crate) async fn refresh(&self, current: &Credential) -> crate::Result<Credential> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
            Error::RefreshTokenFailed("credential carries no refresh token".into())
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];

        let basic = if self.pkce_verifier.is_some() {
            form.push(("client_id", self.client_id.clone()));
            None
        } else {
            Some((self.client_id.as_str(), self.client_secret.as_str()))
        };

        let response = post_token(&self.token_endpoint, &form, basic)
            .await
            .map_err(as_refresh_failure)?;

        let mut fresh = Credential::from_response(response);
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = current.refresh_token.clone();
        }

        Ok(fresh)
    }
}

/// [`AuthorizationCodeFlow`] plus durable credential storage.
///
/// The credential (including its issue and expiry timestamps) is written as
/// pretty-printed JSON to the storage path after the initial exchange and
/// after every refresh, and loaded back on the next `authorize()`.
#[derive(Debug, Clone)]
pub struct EasyAuthCodeFlow {
    inner: AuthorizationCodeFlow,
    storage: PathBuf,
}

impl EasyAuthCodeFlow {
    /// Wraps an authorization-code flow; `storage` defaults to
    /// `spotikit/credential.json` under the platform data directory.
    pub fn new(inner: AuthorizationCodeFlow, storage: Option<PathBuf>) -> Self {
        EasyAuthCodeFlow {
            inner,
            storage: storage.unwrap_or_else(Self::default_storage_path),
        }
    }

    fn default_storage_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("spotikit/credential.json");
        path
    }

    /// Reads the stored credential back, returning `None` when the file is
    /// missing or no longer parses.
    pub async fn load(&self) -> Option<Credential> {
        let content = async_fs::read_to_string(&self.storage).await.ok()?;

        match serde_json::from_str(&content) {
            Ok(credential) => Some(credential),
            Err(err) => {
                warn!(
                    "stored credential at {} is unreadable: {err}",
                    self.storage.display()
                );
                None
            }
        }
    }

    /// Writes the credential to the storage path, creating parent
    /// directories as needed.
    pub async fn store(&self, credential: &Credential) -> crate::Result<()> {
        if let Some(parent) = self.storage.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(credential)?;
        async_fs::write(&self.storage, json).await?;
        Ok(())
    }
}

/// Closed set of grant strategies, dispatched over by
/// [`AuthSession`](super::session::AuthSession).
#[derive(Debug, Clone)]
pub enum GrantFlow {
    ClientCredentials(ClientCredentialsFlow),
    AuthorizationCode(AuthorizationCodeFlow),
    Easy(EasyAuthCodeFlow),
}

impl From<ClientCredentialsFlow> for GrantFlow {
    fn from(flow: ClientCredentialsFlow) -> Self {
        GrantFlow::ClientCredentials(flow)
    }
}

impl From<AuthorizationCodeFlow> for GrantFlow {
    fn from(flow: AuthorizationCodeFlow) -> Self {
        GrantFlow::AuthorizationCode(flow)
    }
}

impl From<EasyAuthCodeFlow> for GrantFlow {
    fn from(flow: EasyAuthCodeFlow) -> Self {
        GrantFlow::Easy(flow)
    }
}

impl GrantFlow {
    /// Obtains the initial credential for flows that need no user consent;
    /// `None` means a consent step has to run first.
    pub(crate) async fn obtain_initial(&self) -> crate::Result<Option<Credential>> {
        match self {
            GrantFlow::ClientCredentials(flow) => flow.obtain().await.map(Some),
            GrantFlow::AuthorizationCode(_) | GrantFlow::Easy(_) => Ok(None),
        }
    }

    pub(crate) async fn refresh(&self, current: Option<&Credential>) -> crate::Result<Credential> {
        match self {
            GrantFlow::ClientCredentials(flow) => flow.obtain().await.map_err(as_refresh_failure),
            GrantFlow::AuthorizationCode(flow) => flow.refresh(required(current)?).await,
            GrantFlow::Easy(flow) => flow.inner.refresh(required(current)?).await,
        }
    }

    pub(crate) async fn exchange_code(&self, code: &str) -> crate::Result<Credential> {
        match self {
            GrantFlow::ClientCredentials(_) => Err(Error::Authentication(
                "the client-credentials flow has no consent step".into(),
            )),
            GrantFlow::AuthorizationCode(flow) => flow.exchange_code(code).await,
            GrantFlow::Easy(flow) => flow.inner.exchange_code(code).await,
        }
    }

    /// The consent URL for user-delegated flows.
    pub fn authorize_url(&self) -> crate::Result<String> {
        match self {
            GrantFlow::ClientCredentials(_) => Err(Error::Authentication(
                "the client-credentials flow has no authorization url".into(),
            )),
            GrantFlow::AuthorizationCode(flow) => flow.authorize_url(),
            GrantFlow::Easy(flow) => flow.inner.authorize_url(),
        }
    }

    pub(crate) async fn load_persisted(&self) -> Option<Credential> {
        match self {
            GrantFlow::Easy(flow) => flow.load().await,
            _ => None,
        }
    }

    pub(crate) async fn persist(&self, credential: &Credential) -> crate::Result<()> {
        match self {
            GrantFlow::Easy(flow) => flow.store(credential).await,
            _ => Ok(()),
        }
    }
}

fn required(current: Option<&Credential>) -> crate::Result<&Credential> {
    current.ok_or_else(|| Error::RefreshTokenFailed("no credential to refresh".into()))
}

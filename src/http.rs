//! HTTP transport with retry, rate-limit and token-refresh handling.
//!
//! Every API call in the library funnels through [`Http::request`], which
//! executes one [`Route`] against the remote service and returns the decoded
//! response body, or a classified error. Recovery from transient conditions
//! happens entirely inside the retry loop:
//!
//! - **429** - the `Retry-After` delay (plus one second of margin) is slept
//!   off before the same request is reissued.
//! - **401 with an expired-token message** - one inline refresh through the
//!   session, then a single reissue.
//! - **5xx** - reissued with no backoff.
//!
//! All of this counts against a fixed budget of five attempts per call. A
//! shared exclusive gate is held for the whole retry loop, so a burst of
//! concurrent calls cannot pile onto an active rate-limit penalty window.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
};
use serde_json::Value;
use tokio::{sync::Mutex, time::sleep};

use crate::{
    config,
    error::{ApiError, Error},
    oauth::session::AuthSession,
};

/// Total attempts per logical request, all retry classes included.
pub(crate) const ATTEMPTS: usize = 5;

/// The exact server message that marks a 401 as recoverable by refreshing.
const EXPIRED_TOKEN_MESSAGE: &str = "The access token expired";

/// One logical API call: method, URL (or path relative to the API base) and
/// query parameters. Immutable once built; the transport may reissue it
/// verbatim on retry.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl Route {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Route {
            method,
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Route::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Route::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Route::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Route::new(Method::DELETE, url)
    }

    /// Appends one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Appends a query parameter only when a value is present.
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }
}

/// Request body, form-encoded or JSON. The two are mutually exclusive per
/// call by construction.
#[derive(Debug, Clone)]
pub enum Body {
    Form(Vec<(String, String)>),
    Json(Value),
}

/// The transport. Cheap to share by reference; one instance serializes its
/// rate-limit handling across all callers.
pub struct Http {
    client: reqwest::Client,
    base: String,
    auth: AuthSession,
    gate: Mutex<()>,
}

impl Http {
    pub fn new(auth: AuthSession) -> Self {
        Self::with_base(auth, config::api_base_url())
    }

    /// Builds a transport against a non-default base URL. Mostly useful for
    /// pointing the library at a mock server.
    pub fn with_base(auth: AuthSession, base: impl Into<String>) -> Self {
        Http {
            client: reqwest::Client::new(),
            base: base.into(),
            auth,
            gate: Mutex::new(()),
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Executes a route and returns the decoded response body.
    ///
    /// The body is decoded as JSON when the content type indicates JSON,
    /// wrapped as a JSON string for other non-empty payloads, and `None`
    /// for empty bodies (e.g. the 204 responses of player endpoints).
    ///
    /// When `authorize` is set, the `Authorization` header is read fresh
    /// from the session on every attempt, so a token refreshed mid-loop is
    /// picked up by the next reissue.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] when authorization was requested but the
    ///   session holds no credential yet.
    /// - [`ApiError`] variants for classified 4xx responses and unhandled
    ///   status codes.
    /// - [`Error::RetriesExhausted`] after [`ATTEMPTS`] failed attempts.
    pub async fn request(
        &self,
        route: &Route,
        body: Option<&Body>,
        authorize: bool,
    ) -> crate::Result<Option<Value>> {
        let url = self.resolve(&route.url);

        // Held across the entire retry loop: a request that observes an
        // in-progress backoff waits for it to clear before issuing its own
        // network call.
        let _gate = self.gate.lock().await;

        let mut refreshed = false;

        for attempt in 1..=ATTEMPTS {
            let mut request = self.client.request(route.method.clone(), url.as_str());

            if !route.params.is_empty() {
                request = request.query(&route.params);
            }

            if authorize {
                request = request.header(AUTHORIZATION, self.auth.bearer_header().await?);
            }

            match body {
                Some(Body::Form(fields)) => request = request.form(fields),
                Some(Body::Json(value)) => request = request.json(value),
                None => {}
            }

            let response = request.send().await?;
            let status = response.status();

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("json"));

            let text = response.text().await?;

            debug!("[{}] {} {}", status.as_u16(), route.method, url);

            let data: Option<Value> = if text.is_empty() {
                None
            } else if is_json {
                serde_json::from_str(&text).ok()
            } else {
                Some(Value::String(text))
            };

            if status.is_success() {
                return Ok(data);
            }

            let message = data
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    // no point sleeping off a penalty window when no
                    // attempt is left to use it
                    if attempt < ATTEMPTS {
                        let wait = retry_after.unwrap_or(1) + 1;
                        warn!("rate limited, retrying in {wait} seconds");
                        sleep(Duration::from_secs(wait)).await;
                    }
                }
                StatusCode::UNAUTHORIZED => {
                    if authorize && !refreshed && message.as_deref() == Some(EXPIRED_TOKEN_MESSAGE)
                    {
                        debug!("access token expired, refreshing inline");
                        self.auth.refresh().await?;
                        refreshed = true;
                    } else {
                        return Err(ApiError::Unauthorized(message).into());
                    }
                }
                StatusCode::BAD_REQUEST => return Err(ApiError::BadRequest(message).into()),
                StatusCode::FORBIDDEN => return Err(ApiError::Forbidden(message).into()),
                StatusCode::NOT_FOUND => return Err(ApiError::NotFound(message).into()),
                StatusCode::METHOD_NOT_ALLOWED => {
                    return Err(ApiError::NotAllowed(message).into());
                }
                status if status.is_server_error() => {
                    debug!("server error {status}, retrying");
                }
                status => {
                    return Err(ApiError::Unhandled { status, message }.into());
                }
            }
        }

        Err(Error::RetriesExhausted {
            method: route.method.to_string(),
            url,
            attempts: ATTEMPTS,
        })
    }
}

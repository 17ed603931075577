//! One-shot local HTTP server for capturing the OAuth redirect.
//!
//! User-delegated flows need the authorization code that the accounts
//! service appends to the redirect URL after consent. [`listen_for_code`]
//! binds a short-lived server on the redirect address, waits for the
//! browser to land on `/callback` and hands the code back;
//! [`authorize_interactively`] wires the whole round trip together.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{Extension, Router, extract::Query, response::Html, routing::get};
use log::warn;
use tokio::{
    sync::Mutex,
    time::{Instant, sleep},
};

use crate::{Client, error::Error};

type CapturedCode = Arc<Mutex<Option<String>>>;

/// Serves `GET /callback` on `addr` until an authorization code arrives or
/// `timeout` elapses.
pub async fn listen_for_code(addr: &str, timeout: Duration) -> crate::Result<String> {
    let state: CapturedCode = Arc::new(Mutex::new(None));

    let app = Router::new()
        .route("/callback", get(callback))
        .layer(Extension(Arc::clone(&state)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let start = Instant::now();
    let code = loop {
        if let Some(code) = state.lock().await.clone() {
            break Some(code);
        }
        if start.elapsed() >= timeout {
            break None;
        }
        sleep(Duration::from_secs(1)).await;
    };

    server.abort();

    code.ok_or_else(|| Error::Authentication("timed out waiting for the redirect".into()))
}

async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<CapturedCode>,
) -> Html<&'static str> {
    match params.get("code") {
        Some(code) => {
            *state.lock().await = Some(code.clone());
            Html("<h2>Authentication successful.</h2><p>You can close this window.</p>")
        }
        None => Html("<h4>Missing authorization code.</h4>"),
    }
}

/// Opens the authorization URL in the default browser, falling back to a
/// logged manual instruction when no browser can be launched.
pub fn open_authorize_url(url: &str) {
    if webbrowser::open(url).is_err() {
        warn!("failed to open browser, please navigate to this URL manually:\n{url}");
    }
}

/// Runs the full interactive consent round trip for a client built on a
/// user-delegated flow: opens the consent page, captures the redirect on
/// `addr` (which must match the flow's redirect URI) and completes the
/// authorization with the received code.
pub async fn authorize_interactively(client: &Client, addr: &str) -> crate::Result<()> {
    let url = client.authorize_url()?;
    open_authorize_url(&url);

    let code = listen_for_code(addr, Duration::from_secs(60)).await?;
    client.complete_authorization(&code).await
}

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Form, Router,
    http::{
        HeaderMap, HeaderName, StatusCode,
        header::{CONTENT_TYPE, RETRY_AFTER},
    },
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use spotikit::{
    ApiError, AuthSession, AuthorizationCodeFlow, ClientCredentialsFlow, Credential,
    EasyAuthCodeFlow, Error, Http, Route,
};
use tempfile::TempDir;

fn json_headers() -> [(HeaderName, &'static str); 1] {
    [(CONTENT_TYPE, "application/json")]
}

// Binds a scripted server on an ephemeral port and returns its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn live_credential(access_token: &str) -> Credential {
    serde_json::from_value(json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "user-follow-read",
        "refresh_token": "refresh-1",
        "created_at": Utc::now().to_rfc3339(),
        "expires_at": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
    }))
    .unwrap()
}

// Seeds an authorized session from a persisted credential so no network
// round trip is needed to get going. Refreshes go to `token_url`.
async fn seeded_session(token_url: &str, dir: &TempDir) -> AuthSession {
    let storage = dir.path().join("credential.json");
    std::fs::write(
        &storage,
        serde_json::to_string(&live_credential("initial-token")).unwrap(),
    )
    .unwrap();

    let flow = EasyAuthCodeFlow::new(
        AuthorizationCodeFlow::new("id", "secret", None, "http://localhost/callback")
            .with_token_url(token_url),
        Some(storage),
    );

    let session = AuthSession::new(flow);
    session.authorize().await.unwrap();
    session
}

// A session that never authorized; requests must not reach the network.
fn bare_session() -> AuthSession {
    AuthSession::new(ClientCredentialsFlow::new("id", "secret"))
}

#[tokio::test]
async fn rate_limited_request_waits_and_succeeds() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let app = Router::new().route(
        "/thing",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [(RETRY_AFTER, "1")],
                        json_headers(),
                        r#"{"error":{"status":429,"message":"rate limited"}}"#,
                    )
                        .into_response()
                } else {
                    (StatusCode::OK, json_headers(), r#"{"ok":true}"#).into_response()
                }
            }
        }),
    );

    let base = serve(app).await;
    let http = Http::with_base(bare_session(), base.as_str());

    let start = Instant::now();
    let data = http
        .request(&Route::get("thing"), None, false)
        .await
        .unwrap();

    // retry-after of 1 second plus the 1 second margin
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(data, Some(json!({"ok": true})));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn server_errors_exhaust_the_attempt_budget() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let app = Router::new().route(
        "/flaky",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::BAD_GATEWAY
            }
        }),
    );

    let base = serve(app).await;
    let http = Http::with_base(bare_session(), base.as_str());

    let err = http
        .request(&Route::get("flaky"), None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_inline_refresh() {
    let api_hits = Arc::new(AtomicUsize::new(0));
    let token_hits = Arc::new(AtomicUsize::new(0));

    let api_counter = Arc::clone(&api_hits);
    let token_counter = Arc::clone(&token_hits);

    let app = Router::new()
        .route(
            "/me",
            get(move |headers: HeaderMap| {
                let counter = Arc::clone(&api_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();

                    if auth == "Bearer fresh-token" {
                        (StatusCode::OK, json_headers(), r#"{"id":"someone"}"#).into_response()
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            json_headers(),
                            r#"{"error":{"status":401,"message":"The access token expired"}}"#,
                        )
                            .into_response()
                    }
                }
            }),
        )
        .route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let counter = Arc::clone(&token_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
                    (
                        json_headers(),
                        r#"{"access_token":"fresh-token","token_type":"Bearer","expires_in":3600}"#,
                    )
                }
            }),
        );

    let base = serve(app).await;
    let dir = TempDir::new().unwrap();
    let session = seeded_session(&format!("{base}/token"), &dir).await;
    let http = Http::with_base(session.clone(), base.as_str());

    let data = http.request(&Route::get("me"), None, true).await.unwrap();

    assert_eq!(data, Some(json!({"id": "someone"})));
    assert_eq!(token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(api_hits.load(Ordering::SeqCst), 2);

    session.close().await;
}

#[tokio::test]
async fn persistent_expired_token_gives_up_after_one_refresh() {
    let api_hits = Arc::new(AtomicUsize::new(0));
    let token_hits = Arc::new(AtomicUsize::new(0));

    let api_counter = Arc::clone(&api_hits);
    let token_counter = Arc::clone(&token_hits);

    // the server rejects every token as expired, even the refreshed one
    let app = Router::new()
        .route(
            "/me",
            get(move || {
                let counter = Arc::clone(&api_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::UNAUTHORIZED,
                        json_headers(),
                        r#"{"error":{"status":401,"message":"The access token expired"}}"#,
                    )
                }
            }),
        )
        .route(
            "/token",
            post(move || {
                let counter = Arc::clone(&token_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        json_headers(),
                        r#"{"access_token":"fresh-token","token_type":"Bearer","expires_in":3600}"#,
                    )
                }
            }),
        );

    let base = serve(app).await;
    let dir = TempDir::new().unwrap();
    let session = seeded_session(&format!("{base}/token"), &dir).await;
    let http = Http::with_base(session.clone(), base.as_str());

    let err = http.request(&Route::get("me"), None, true).await.unwrap_err();

    match err {
        Error::Api(ApiError::Unauthorized(message)) => {
            assert_eq!(message.as_deref(), Some("The access token expired"));
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    // exactly one refresh, then the reissued attempt fails for good
    assert_eq!(token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(api_hits.load(Ordering::SeqCst), 2);

    session.close().await;
}

#[tokio::test]
async fn final_attempt_rate_limit_skips_the_backoff() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let app = Router::new().route(
        "/limited",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, "0")],
                    json_headers(),
                    r#"{"error":{"status":429,"message":"rate limited"}}"#,
                )
            }
        }),
    );

    let base = serve(app).await;
    let http = Http::with_base(bare_session(), base.as_str());

    let start = Instant::now();
    let err = http
        .request(&Route::get("limited"), None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    // four one-second waits between the five attempts, none after the last
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn other_401_messages_raise_unauthorized_without_refreshing() {
    let token_hits = Arc::new(AtomicUsize::new(0));
    let token_counter = Arc::clone(&token_hits);

    let app = Router::new()
        .route(
            "/me",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    json_headers(),
                    r#"{"error":{"status":401,"message":"Invalid access token"}}"#,
                )
            }),
        )
        .route(
            "/token",
            post(move || {
                let counter = Arc::clone(&token_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (json_headers(), r#"{"access_token":"x","token_type":"Bearer","expires_in":3600}"#)
                }
            }),
        );

    let base = serve(app).await;
    let dir = TempDir::new().unwrap();
    let session = seeded_session(&format!("{base}/token"), &dir).await;
    let http = Http::with_base(session.clone(), base.as_str());

    let err = http.request(&Route::get("me"), None, true).await.unwrap_err();

    match err {
        Error::Api(ApiError::Unauthorized(message)) => {
            assert_eq!(message.as_deref(), Some("Invalid access token"));
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(token_hits.load(Ordering::SeqCst), 0);

    session.close().await;
}

#[tokio::test]
async fn classified_errors_carry_the_server_message() {
    let app = Router::new().route(
        "/tracks/{id}",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                json_headers(),
                r#"{"error":{"status":404,"message":"non existing id"}}"#,
            )
        }),
    );

    let base = serve(app).await;
    let http = Http::with_base(bare_session(), base.as_str());

    let err = http
        .request(&Route::get("tracks/nope"), None, false)
        .await
        .unwrap_err();

    match err {
        Error::Api(ApiError::NotFound(message)) => {
            assert_eq!(message.as_deref(), Some("non existing id"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn authorized_request_without_credential_fails_fast() {
    // nothing is listening on this base; the request must fail before any
    // network call is attempted
    let http = Http::with_base(bare_session(), "http://127.0.0.1:9");

    let err = http.request(&Route::get("me"), None, true).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn empty_and_plain_text_bodies_decode_sensibly() {
    let app = Router::new()
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route("/plain", get(|| async { "all good" }));

    let base = serve(app).await;
    let http = Http::with_base(bare_session(), base.as_str());

    let empty = http.request(&Route::get("empty"), None, false).await.unwrap();
    assert_eq!(empty, None);

    let plain = http.request(&Route::get("plain"), None, false).await.unwrap();
    assert_eq!(plain, Some(json!("all good")));
}

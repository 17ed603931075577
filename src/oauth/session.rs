//! The authentication session: owns the current credential and the deferred
//! refresh task that keeps it fresh.

use std::{
    future::Future,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use log::{debug, warn};
use tokio::{sync::RwLock, task::JoinHandle, time::sleep};

use crate::error::Error;

use super::{flows::GrantFlow, response::Credential};

/// How long to wait before retrying after a scheduled refresh fails.
///
/// A failed scheduled refresh must not leave the credential to go stale
/// silently: the timer re-arms with this fixed short delay, and the
/// transport's inline 401-driven refresh remains the fallback in the
/// meantime.
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Single-shot deferred action with last-write-wins re-arming.
///
/// Arming always aborts a still-pending previous task, so at most one
/// refresh timer is outstanding at any time.
pub(crate) struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    pub(crate) fn new() -> Self {
        RefreshTimer { handle: None }
    }

    pub(crate) fn arm<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.handle.take() {
            previous.abort();
        }

        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            action.await;
        }));
    }

    /// Aborts the pending task, if any, handing back its handle so the
    /// caller can await the cancellation.
    pub(crate) fn cancel(&mut self) -> Option<JoinHandle<()>> {
        let handle = self.handle.take()?;
        handle.abort();
        Some(handle)
    }
}

struct SessionInner {
    flow: GrantFlow,
    credential: RwLock<Option<Credential>>,
    timer: Mutex<RefreshTimer>,
    retry_delay: Duration,
}

/// Owns zero-or-one current [`Credential`] for a grant flow and schedules
/// its background refresh.
///
/// The session is cheaply cloneable (all clones share state) and is read
/// fresh by the transport on every request, so an in-flight refresh is
/// picked up by the next attempt. Refreshing never mutates the stored
/// credential in place; a new value is swapped in atomically.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    pub fn new(flow: impl Into<GrantFlow>) -> Self {
        Self::with_retry_delay(flow, REFRESH_RETRY_DELAY)
    }

    /// Like [`new`](Self::new), but with a custom delay before retrying a
    /// failed scheduled refresh.
    pub fn with_retry_delay(flow: impl Into<GrantFlow>, retry_delay: Duration) -> Self {
        AuthSession {
            inner: Arc::new(SessionInner {
                flow: flow.into(),
                credential: RwLock::new(None),
                timer: Mutex::new(RefreshTimer::new()),
                retry_delay,
            }),
        }
    }

    /// Authorizes the session.
    ///
    /// A previously persisted credential is preferred when the flow supports
    /// storage; otherwise the grant runs directly for non-interactive flows.
    /// An expired credential is refreshed immediately before the session is
    /// considered authorized; a live one schedules its refresh for the
    /// moment it expires.
    ///
    /// # Errors
    ///
    /// User-delegated flows without a stored credential fail with
    /// [`Error::Authentication`]: the caller must send the user to
    /// [`authorize_url`](Self::authorize_url) and pass the resulting code to
    /// [`complete_authorization`](Self::complete_authorization).
    pub async fn authorize(&self) -> crate::Result<()> {
        if let Some(credential) = self.inner.flow.load_persisted().await {
            debug!("authorizing from persisted credential");
            return self.install(credential).await;
        }

        match self.inner.flow.obtain_initial().await? {
            Some(credential) => self.install(credential).await,
            None => Err(Error::Authentication(
                "user consent required: open authorize_url() and pass the code to \
                 complete_authorization()"
                    .into(),
            )),
        }
    }

    /// Exchanges an authorization code, installs the resulting credential
    /// and starts the refresh schedule.
    pub async fn complete_authorization(&self, code: &str) -> crate::Result<()> {
        let credential = self.inner.flow.exchange_code(code).await?;
        self.inner.flow.persist(&credential).await?;
        self.install(credential).await
    }

    async fn install(&self, credential: Credential) -> crate::Result<()> {
        let credential = if credential.is_expired() {
            debug!("credential already expired, refreshing before use");
            let fresh = self.inner.flow.refresh(Some(&credential)).await?;
            self.inner.flow.persist(&fresh).await?;
            fresh
        } else {
            credential
        };

        let delay = refresh_delay(&credential);
        *self.inner.credential.write().await = Some(credential);
        self.arm(delay);
        Ok(())
    }

    /// A copy of the current credential, if any.
    pub async fn credential(&self) -> Option<Credential> {
        self.inner.credential.read().await.clone()
    }

    /// The consent URL for user-delegated flows.
    pub fn authorize_url(&self) -> crate::Result<String> {
        self.inner.flow.authorize_url()
    }

    /// The `Authorization` header value of the current credential.
    pub(crate) async fn bearer_header(&self) -> crate::Result<String> {
        self.credential()
            .await
            .map(|c| c.header_value())
            .ok_or_else(|| {
                Error::Authentication("authorize before attempting an authorized request".into())
            })
    }

    /// Obtains a fresh credential through the grant flow, persists it when
    /// storage is configured, swaps it in and re-arms the refresh timer.
    pub async fn refresh(&self) -> crate::Result<()> {
        let current = self.credential().await;
        let fresh = self.inner.flow.refresh(current.as_ref()).await?;
        self.inner.flow.persist(&fresh).await?;

        let delay = refresh_delay(&fresh);
        *self.inner.credential.write().await = Some(fresh);
        self.arm(delay);

        debug!("credential refreshed, next refresh in {}s", delay.as_secs());
        Ok(())
    }

    /// Arms the deferred refresh. The spawned task holds only a weak
    /// reference, so a dropped session never keeps itself alive through its
    /// own timer.
    fn arm(&self, delay: Duration) {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);

        let mut timer = self.inner.timer.lock().unwrap();
        timer.arm(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let retry_delay = inner.retry_delay;
            let session = AuthSession { inner };
            if let Err(err) = session.refresh().await {
                warn!("scheduled credential refresh failed: {err}; retrying in {retry_delay:?}");
                session.arm(retry_delay);
            }
        });
    }

    /// Cancels the background refresh task and awaits its cancellation.
    /// The resulting cancellation signal is swallowed and never surfaces to
    /// the caller.
    pub async fn close(&self) {
        let handle = self.inner.timer.lock().unwrap().cancel();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("refresh task ended abnormally: {err}");
                }
            }
        }
    }
}

/// When to refresh a credential: at its expiry moment, clamped to now for
/// one that already ran out.
fn refresh_delay(credential: &Credential) -> Duration {
    Duration::from_secs(credential.seconds_until_expiry().max(0) as u64)
}

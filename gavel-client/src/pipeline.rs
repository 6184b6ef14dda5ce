//! Authenticated request pipeline.
//!
//! Every outbound call goes through [`RequestPipeline::send`], which attaches
//! the bearer credential and the presentation language. A 401 starts at most
//! one credential refresh at a time. Requests that fail while it is pending
//! queue behind it and are replayed exactly once with the new credential.

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use http::{StatusCode, header};
use serde::de::DeserializeOwned;
use shared::config::{Config, join};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{AuthError, PipelineError},
    session::Session,
    transport::{PreparedRequest, RawResponse, Transport},
};

/// Path of the token refresh endpoint, relative to the API base.
pub const REFRESH_PATH: &str = "/auth/refresh-token";

type Waiter = oneshot::Sender<Result<(), AuthError>>;

/// Refresh coordination. `waiters` only exists while a refresh is in flight,
/// and it is taken in the same critical section that returns to `Idle`.
#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

#[derive(Debug)]
struct PipelineInner {
    transport: Arc<dyn Transport>,
    session: Session,
    api_base_url: Url,
    refresh_url: Url,
    language: String,
    refresh: Mutex<RefreshState>,
}

/// Shared, cheaply cloned handle to the request pipeline.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Session,
        api_base_url: Url,
        language: impl Into<String>,
    ) -> Self {
        let refresh_url = join(&api_base_url, REFRESH_PATH);
        Self {
            inner: Arc::new(PipelineInner {
                transport,
                session,
                api_base_url,
                refresh_url,
                language: language.into(),
                refresh: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, session: Session, config: &Config) -> Self {
        Self::new(
            transport,
            session,
            config.api_base_url.clone(),
            config.language.clone(),
        )
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.inner.language
    }

    /// Resolves an API path against the configured base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        join(&self.inner.api_base_url, path)
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state(), RefreshState::Refreshing { .. })
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.inner
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_refresh_endpoint(&self, url: &Url) -> bool {
        url.path() == self.inner.refresh_url.path()
    }

    /// Attaches language and credential headers and hands the request to the
    /// transport. Returns the response together with the token it was sent with.
    async fn dispatch(
        &self,
        mut request: PreparedRequest,
    ) -> Result<(RawResponse, Option<String>), PipelineError> {
        let token = self.inner.session.access_token();
        request = request.header(header::ACCEPT_LANGUAGE, &self.inner.language);
        if let Some(token) = &token {
            request = request.header(header::AUTHORIZATION, &format!("Bearer {token}"));
        }
        let response = self.inner.transport.execute(request).await?;
        Ok((response, token))
    }

    /// Sends `request`, refreshing the credential once on a 401.
    ///
    /// Responses other than 401 are returned unchanged, whatever their status.
    ///
    /// # Errors
    /// Transport failures pass through as [`PipelineError::Transport`].
    /// Authorization that cannot be recovered is [`PipelineError::Auth`]:
    /// a failed refresh, a 401 from the refresh endpoint itself, or a second
    /// 401 after the replay.
    pub async fn send(&self, request: PreparedRequest) -> Result<RawResponse, PipelineError> {
        let (response, sent_with) = self.dispatch(request.clone()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if self.is_refresh_endpoint(&request.url) {
            warn!("refresh endpoint rejected the credential; clearing session");
            self.inner.session.clear();
            return Err(AuthError::RefreshRejected.into());
        }

        debug!(url = %request.url, "request unauthorized; waiting for a fresh credential");
        self.await_fresh_credential(sent_with.as_deref()).await?;

        let (retried, _) = self.dispatch(request).await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            warn!("request still unauthorized after refresh");
            return Err(AuthError::Expired.into());
        }
        Ok(retried)
    }

    /// Sends `request` and decodes a successful JSON body.
    ///
    /// # Errors
    /// Everything [`RequestPipeline::send`] returns, plus
    /// [`PipelineError::Status`] for non-2xx answers and
    /// [`PipelineError::Decode`] for bodies that are not a `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: PreparedRequest,
    ) -> Result<T, PipelineError> {
        let response = self.send(request).await?;
        if !response.status.is_success() {
            return Err(PipelineError::from_status(response.status, &response.body));
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Refreshes ahead of time when the stored credential is already expired,
    /// joining any refresh in flight.
    ///
    /// # Errors
    /// Returns the refresh failure; the credential has been cleared by then.
    pub async fn ensure_fresh(&self) -> Result<(), AuthError> {
        let session = &self.inner.session;
        if session.refresh_token().is_none() || !session.is_expired() {
            return Ok(());
        }
        self.join_refresh().await
    }

    /// Waits for a credential other than `sent_with`.
    ///
    /// If the credential already rotated after the failed request was sent,
    /// the request is simply replayed. Otherwise the caller joins (or starts)
    /// the single refresh.
    async fn await_fresh_credential(&self, sent_with: Option<&str>) -> Result<(), AuthError> {
        let receiver = {
            let mut state = self.state();
            if matches!(*state, RefreshState::Idle) {
                let current = self.inner.session.access_token();
                if current.is_some() && current.as_deref() != sent_with {
                    debug!("credential rotated while request was in flight; replaying");
                    return Ok(());
                }
            }
            self.enqueue(&mut state)
        };
        settle(receiver).await
    }

    async fn join_refresh(&self) -> Result<(), AuthError> {
        let receiver = {
            let mut state = self.state();
            self.enqueue(&mut state)
        };
        settle(receiver).await
    }

    /// Registers a waiter, starting the refresh when none is in flight.
    /// Must be called with the state lock held.
    fn enqueue(&self, state: &mut RefreshState) -> oneshot::Receiver<Result<(), AuthError>> {
        let (sender, receiver) = oneshot::channel();
        match state {
            RefreshState::Refreshing { waiters } => {
                waiters.push(sender);
                debug!(waiters = waiters.len(), "joined refresh in flight");
            }
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: vec![sender],
                };
                self.spawn_refresh();
            }
        }
        receiver
    }

    /// Runs the refresh on its own task so a caller dropping its future
    /// cannot leave the state stuck in `Refreshing`.
    fn spawn_refresh(&self) {
        let inner = Arc::clone(&self.inner);
        info!("refreshing credential");
        tokio::spawn(async move {
            let outcome = inner
                .session
                .refresh(
                    inner.transport.as_ref(),
                    &inner.refresh_url,
                    &inner.language,
                )
                .await;

            let waiters = {
                let mut state = inner.refresh.lock().unwrap_or_else(PoisonError::into_inner);
                match mem::take(&mut *state) {
                    RefreshState::Refreshing { waiters } => waiters,
                    RefreshState::Idle => Vec::new(),
                }
            };

            info!(
                waiters = waiters.len(),
                success = outcome.is_ok(),
                "credential refresh settled"
            );
            for waiter in waiters {
                // A waiter whose request was dropped is fine to skip.
                let _ = waiter.send(outcome.clone());
            }
        });
    }
}

async fn settle(receiver: oneshot::Receiver<Result<(), AuthError>>) -> Result<(), AuthError> {
    receiver.await.unwrap_or_else(|_| {
        Err(AuthError::RefreshFailed(
            "refresh task ended without an outcome".to_string(),
        ))
    })
}

//! The credential store.
//!
//! One [`Session`] is shared (cheaply cloned) by the request pipeline, the
//! stream client and the CLI. Every read goes through an accessor that takes a
//! snapshot, and every mutation is a single write-locked step, so replacement
//! is atomic from the callers' point of view.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use http::{StatusCode, header};
use serde::{Deserialize, Serialize};
use shared::models::{AccessTokenClaims, ApiResponse, AuthResponse, RefreshTokenRequest};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::AuthError,
    storage::SessionStorage,
    transport::{PreparedRequest, Transport},
};

/// The access/refresh pair plus the derived expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_verified: bool,
}

impl Credential {
    /// Expired when `now >= expires_at - skew`; a missing expiry counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.is_none_or(|expires_at| {
            now >= expires_at
                .checked_sub_signed(skew)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

#[derive(Debug)]
struct SessionInner {
    credential: RwLock<Credential>,
    storage: Option<Arc<dyn SessionStorage>>,
    skew: Duration,
}

/// Shared handle to the process-wide credential.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// In-memory session with no persistence.
    #[must_use]
    pub fn new(skew: std::time::Duration) -> Self {
        Self::build(Credential::default(), None, skew)
    }

    /// Session that writes through to `storage`, starting from whatever it
    /// already holds.
    #[must_use]
    pub fn with_storage(storage: Arc<dyn SessionStorage>, skew: std::time::Duration) -> Self {
        let credential = match storage.load() {
            Ok(stored) => stored.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable stored session");
                Credential::default()
            }
        };
        Self::build(credential, Some(storage), skew)
    }

    fn build(
        credential: Credential,
        storage: Option<Arc<dyn SessionStorage>>,
        skew: std::time::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                credential: RwLock::new(credential),
                storage,
                skew: Duration::from_std(skew).unwrap_or(Duration::MAX),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Credential> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credential> {
        self.inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` under the write lock, then persists the result.
    fn update(&self, change: impl FnOnce(&mut Credential)) {
        let snapshot = {
            let mut credential = self.write();
            change(&mut credential);
            credential.clone()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, credential: &Credential) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let result = if credential.is_empty() {
            storage.remove()
        } else {
            storage.save(credential)
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist session");
        }
    }

    /// Snapshot of the current credential.
    #[must_use]
    pub fn credential(&self) -> Credential {
        self.read().clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    /// `Bearer <access token>` when signed in.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.read()
            .access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    #[must_use]
    pub fn skew(&self) -> Duration {
        self.inner.skew
    }

    /// Stores a new pair; the expiry is `now + expires_in_secs`.
    pub fn set_credential(
        &self,
        access: impl Into<String>,
        refresh: impl Into<String>,
        expires_in_secs: u64,
    ) {
        self.set_credential_at(access, refresh, expires_in_secs, Utc::now());
    }

    /// [`Session::set_credential`] with an explicit issue instant.
    pub fn set_credential_at(
        &self,
        access: impl Into<String>,
        refresh: impl Into<String>,
        expires_in_secs: u64,
        issued_at: DateTime<Utc>,
    ) {
        let access = access.into();
        let refresh = refresh.into();
        let expires_at = expiry_from(issued_at, expires_in_secs);
        self.update(|credential| {
            credential.access_token = Some(access);
            credential.refresh_token = Some(refresh);
            credential.expires_at = Some(expires_at);
        });
    }

    /// Rotates the access token only, keeping the refresh token.
    pub fn set_access_token(&self, access: impl Into<String>, expires_in_secs: u64) {
        let access = access.into();
        let expires_at = expiry_from(Utc::now(), expires_in_secs);
        self.update(|credential| {
            credential.access_token = Some(access);
            credential.expires_at = Some(expires_at);
        });
    }

    pub fn set_email_verified(&self, verified: bool) {
        self.update(|credential| credential.email_verified = verified);
    }

    /// Stores the pair from a login, exchange or refresh response. When the
    /// response carries no lifetime it is read from the token's `exp` claim.
    pub fn apply_auth_response(&self, response: &AuthResponse) {
        let now = Utc::now();
        let expires_in = response.expires_in.unwrap_or_else(|| {
            decode_claims(&response.access_token)
                .map(|claims| u64::try_from(claims.exp - now.timestamp()).unwrap_or(0))
                .unwrap_or(0)
        });
        self.set_credential_at(
            response.access_token.clone(),
            response.refresh_token.clone(),
            expires_in,
            now,
        );
        if let Some(verified) = response.user.as_ref().and_then(|user| user.email_verified) {
            self.set_email_verified(verified);
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.read().is_expired_at(now, self.inner.skew)
    }

    /// Resets to the empty credential.
    pub fn clear(&self) {
        self.update(|credential| *credential = Credential::default());
    }

    /// Claims of the current access token, decoded without verification.
    #[must_use]
    pub fn claims(&self) -> Option<AccessTokenClaims> {
        self.read().access_token.as_deref().and_then(decode_claims)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.claims().and_then(|claims| claims.user_id())
    }

    /// Exchanges the refresh token for a new pair.
    ///
    /// Success stores the new pair. Any failure clears the credential before
    /// the error is returned. Concurrent callers are not coalesced here; the
    /// request pipeline does that.
    ///
    /// # Errors
    /// [`AuthError::NotAuthenticated`] without a refresh token,
    /// [`AuthError::RefreshRejected`] when the endpoint answers 401, and
    /// [`AuthError::RefreshFailed`] for anything else that goes wrong.
    pub async fn refresh(
        &self,
        transport: &dyn Transport,
        endpoint: &Url,
        language: &str,
    ) -> Result<(), AuthError> {
        let result = self.exchange_refresh_token(transport, endpoint, language).await;
        match &result {
            Ok(response) => {
                self.apply_auth_response(response);
                info!("credential refreshed");
            }
            Err(err) => {
                warn!(error = %err, "credential refresh failed; clearing session");
                self.clear();
            }
        }
        result.map(|_| ())
    }

    async fn exchange_refresh_token(
        &self,
        transport: &dyn Transport,
        endpoint: &Url,
        language: &str,
    ) -> Result<AuthResponse, AuthError> {
        let refresh_token = self.refresh_token().ok_or(AuthError::NotAuthenticated)?;

        let request = PreparedRequest::post(endpoint.clone())
            .json(&RefreshTokenRequest { refresh_token })
            .map_err(|err| AuthError::RefreshFailed(err.to_string()))?
            .header(header::ACCEPT_LANGUAGE, language);

        debug!(url = %endpoint, "refreshing credential");
        let response = transport
            .execute(request)
            .await
            .map_err(|err| AuthError::RefreshFailed(err.to_string()))?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::RefreshRejected);
        }
        if !response.status.is_success() {
            return Err(AuthError::RefreshFailed(format!(
                "refresh endpoint answered {}",
                response.status
            )));
        }

        serde_json::from_slice::<ApiResponse<AuthResponse>>(&response.body)
            .map(|envelope| envelope.data)
            .map_err(|err| AuthError::RefreshFailed(format!("malformed refresh response: {err}")))
    }
}

fn expiry_from(issued_at: DateTime<Utc>, expires_in_secs: u64) -> DateTime<Utc> {
    let lifetime = i64::try_from(expires_in_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    issued_at
        .checked_add_signed(lifetime)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Reads the payload segment of a JWT. The signature is not checked.
#[must_use]
pub fn decode_claims(token: &str) -> Option<AccessTokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

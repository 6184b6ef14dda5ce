//! Error types for the sync client.

use http::StatusCode;
use shared::models::ErrorResponse;
use thiserror::Error;

/// Failure below HTTP: DNS, TLS, connection resets, unreadable bodies.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to build request: {0}")]
    Build(String),
}

/// Authorization failures that reach callers once the pipeline gives up.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not signed in")]
    NotAuthenticated,

    #[error("refresh token rejected; sign in again")]
    RefreshRejected,

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("request still unauthorized after refreshing the credential")]
    Expired,
}

/// Everything a pipeline request can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server answered {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        body: Option<ErrorResponse>,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the caller should send the user back to sign-in.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Builds a [`PipelineError::Status`] from an error response body,
    /// keeping the server's message when it sent one.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(ErrorResponse::summary)
            .map_or_else(
                || {
                    let text = String::from_utf8_lossy(body);
                    if text.trim().is_empty() {
                        status
                            .canonical_reason()
                            .unwrap_or("unexpected status")
                            .to_string()
                    } else {
                        text.into_owned()
                    }
                },
                str::to_string,
            );
        Self::Status {
            status,
            message,
            body: parsed,
        }
    }
}

/// Failures surfaced through a stream handler's `on_error`.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("stream rejected with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Credential persistence failures. Logged by the session, never raised
/// from its synchronous mutators.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

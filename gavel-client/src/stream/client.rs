use std::sync::Arc;

use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode, header};
use serde_json::Value;
use shared::models::{
    ErrorResponse,
    stream::{CONNECTED_EVENT, FromStreamFrame, KEEP_ALIVE_SENTINEL},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::frame::{Frame, FrameDecoder};
use crate::{
    error::{StreamError, TransportError},
    session::Session,
    transport::{PreparedRequest, Transport},
};

/// Status and headers of an accepted stream.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Receives the life cycle of one stream connection.
///
/// Callbacks run on the task driving the connection, in arrival order. None of
/// them fires once cancellation has been observed.
pub trait StreamHandler: Send {
    type Message: FromStreamFrame;

    fn on_open(&mut self, _meta: &ResponseMeta) {}

    /// The server's handshake frame. Never passed to `on_message`.
    fn on_connected(&mut self, _frame: &Frame) {}

    fn on_message(&mut self, message: Self::Message, frame: &Frame);

    fn on_error(&mut self, _error: &StreamError) {}

    /// The server ended the stream normally.
    fn on_close(&mut self) {}
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Cancelled,
    Closed,
    Failed,
}

/// Opens subject-scoped event streams. Reconnecting is left to the caller.
#[derive(Debug, Clone)]
pub struct EventStreamClient {
    transport: Arc<dyn Transport>,
    session: Session,
    language: String,
}

impl EventStreamClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: Session, language: impl Into<String>) -> Self {
        Self {
            transport,
            session,
            language: language.into(),
        }
    }

    /// Connects to `url` with the credential held right now and drives the
    /// stream until it ends or `cancel` fires.
    pub async fn subscribe<H: StreamHandler>(
        &self,
        url: Url,
        cancel: &CancellationToken,
        handler: &mut H,
    ) -> StreamOutcome {
        let mut request = PreparedRequest::get(url)
            .header(header::ACCEPT_LANGUAGE, &self.language);
        if let Some(bearer) = self.session.bearer() {
            request = request.header(header::AUTHORIZATION, &bearer);
        }
        self.connect(request, cancel, handler).await
    }

    /// Opens `request` as an event stream and drives it.
    pub async fn connect<H: StreamHandler>(
        &self,
        request: PreparedRequest,
        cancel: &CancellationToken,
        handler: &mut H,
    ) -> StreamOutcome {
        let url = request.url.clone();
        debug!(%url, "opening event stream");

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamOutcome::Cancelled,
            opened = self.transport.open_stream(request) => opened,
        };
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }

        let response = match opened {
            Ok(response) => response,
            Err(err) => {
                error!(%url, error = %err, "event stream connection failed");
                handler.on_error(&StreamError::Transport(err));
                return StreamOutcome::Failed;
            }
        };

        if !response.status.is_success() {
            let body = tokio::select! {
                biased;
                () = cancel.cancelled() => return StreamOutcome::Cancelled,
                body = rejection_message(response.body) => body,
            };
            warn!(%url, status = %response.status, %body, "event stream rejected");
            handler.on_error(&StreamError::Status {
                status: response.status,
                body,
            });
            return StreamOutcome::Failed;
        }

        info!(%url, "event stream opened");
        handler.on_open(&ResponseMeta {
            status: response.status,
            headers: response.headers,
        });

        let outcome = pump(response.body, cancel, handler).await;
        info!(%url, ?outcome, "event stream ended");
        outcome
    }
}

/// Most bytes read from the body of a rejected stream.
const REJECTION_BODY_LIMIT: usize = 1024;

/// Reads at most [`REJECTION_BODY_LIMIT`] bytes of a rejected stream's body.
/// The backend's error message is used when the prefix is an error document.
async fn rejection_message<S, B>(mut body: S) -> String
where
    S: Stream<Item = Result<B, TransportError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut prefix = Vec::new();
    while prefix.len() < REJECTION_BODY_LIMIT {
        match body.next().await {
            Some(Ok(chunk)) => prefix.extend_from_slice(chunk.as_ref()),
            Some(Err(_)) | None => break,
        }
    }
    prefix.truncate(REJECTION_BODY_LIMIT);

    serde_json::from_slice::<ErrorResponse>(&prefix)
        .ok()
        .and_then(|parsed| parsed.summary().map(str::to_owned))
        .unwrap_or_else(|| String::from_utf8_lossy(&prefix).trim().to_owned())
}

/// Decodes `body` into frames and hands them to `handler` until the body
/// ends, fails, or `cancel` fires.
pub async fn pump<S, B, H>(mut body: S, cancel: &CancellationToken, handler: &mut H) -> StreamOutcome
where
    S: Stream<Item = Result<B, TransportError>> + Unpin,
    B: AsRef<[u8]>,
    H: StreamHandler,
{
    let mut decoder = FrameDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamOutcome::Cancelled,
            chunk = body.next() => chunk,
        };
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }

        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.push(bytes.as_ref()) {
                    if cancel.is_cancelled() {
                        return StreamOutcome::Cancelled;
                    }
                    dispatch(frame, handler);
                }
            }
            Some(Err(err)) => {
                error!(error = %err, "event stream read failed");
                handler.on_error(&StreamError::Transport(err));
                return StreamOutcome::Failed;
            }
            None => {
                if decoder.has_pending() {
                    debug!("discarding incomplete frame at end of stream");
                }
                handler.on_close();
                return StreamOutcome::Closed;
            }
        }
    }
}

fn dispatch<H: StreamHandler>(frame: Frame, handler: &mut H) {
    if frame.event_name() == Some(CONNECTED_EVENT) {
        debug!(data = %frame.data, "event stream handshake");
        handler.on_connected(&frame);
        return;
    }

    let payload = frame.data.trim();
    if payload == KEEP_ALIVE_SENTINEL {
        return;
    }

    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(_) => {
            if !payload.is_empty() {
                warn!(event = ?frame.event, "dropping non-JSON stream payload");
            }
            return;
        }
    };

    match H::Message::from_frame(frame.event_name(), value) {
        Ok(message) => handler.on_message(message, &frame),
        Err(err) => {
            warn!(event = ?frame.event, error = %err, "dropping stream payload of unexpected shape");
        }
    }
}

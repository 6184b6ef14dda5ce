//! In-process fake backend for unit tests.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use http::StatusCode;
use serde_json::json;

use crate::{
    error::TransportError,
    pipeline::REFRESH_PATH,
    transport::{PreparedRequest, RawResponse, StreamingResponse, Transport},
};

/// What the fake refresh endpoint answers.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// Issue this access token (and a matching refresh token).
    Rotate(String),
    Status(StatusCode),
    Unreachable,
}

/// Accepts exactly one access token; anything else gets a 401. Paths under
/// `/auth/` are open to everyone.
#[derive(Debug)]
pub struct FakeBackend {
    pub valid_token: Mutex<Option<String>>,
    pub refresh_reply: Mutex<RefreshReply>,
    pub refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub requests: Mutex<Vec<PreparedRequest>>,
    /// Authorized responses keyed by `path?query` or by bare path, tried in
    /// that order; unlisted paths answer `{"data":"ok"}`.
    pub routes: Mutex<HashMap<String, (StatusCode, String)>>,
    /// Chunks served to every `open_stream` call.
    pub stream_chunks: Mutex<Vec<String>>,
    pub stream_status: Mutex<StatusCode>,
    /// Keep streams open after the scripted chunks instead of ending them.
    pub hold_streams_open: bool,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(Some(valid_token.to_string())),
            refresh_reply: Mutex::new(RefreshReply::Rotate(valid_token.to_string())),
            refresh_delay: Duration::from_millis(50),
            refresh_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            routes: Mutex::new(HashMap::new()),
            stream_chunks: Mutex::new(Vec::new()),
            stream_status: Mutex::new(StatusCode::OK),
            hold_streams_open: false,
        }
    }

    pub fn with_refresh(self, reply: RefreshReply) -> Self {
        *self.refresh_reply.lock().unwrap() = reply;
        self
    }

    pub fn route(&self, path: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests_to(&self, path: &str) -> Vec<PreparedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.path() == path)
            .cloned()
            .collect()
    }

    fn authorized(&self, request: &PreparedRequest) -> bool {
        let valid = self.valid_token.lock().unwrap().clone();
        match (request.authorization(), valid) {
            (Some(header), Some(token)) => header == format!("Bearer {token}"),
            _ => false,
        }
    }

    async fn refresh(&self) -> Result<RawResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;
        let reply = self.refresh_reply.lock().unwrap().clone();
        match reply {
            RefreshReply::Rotate(token) => {
                let body = json!({
                    "success": true,
                    "data": {
                        "accessToken": token,
                        "refreshToken": format!("refresh-for-{token}"),
                        "expiresIn": 3600
                    }
                });
                Ok(RawResponse::new(StatusCode::OK, body.to_string()))
            }
            RefreshReply::Status(status) => Ok(RawResponse::new(status, "")),
            RefreshReply::Unreachable => Err(TransportError::Request {
                url: REFRESH_PATH.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.url.path().ends_with(REFRESH_PATH) {
            return self.refresh().await;
        }
        let public = request.url.path().contains("/auth/");
        if !public && !self.authorized(&request) {
            return Ok(RawResponse::new(StatusCode::UNAUTHORIZED, ""));
        }
        let route = {
            let routes = self.routes.lock().unwrap();
            let path = request.url.path();
            request
                .url
                .query()
                .and_then(|query| routes.get(&format!("{path}?{query}")))
                .or_else(|| routes.get(path))
                .cloned()
        };
        Ok(match route {
            Some((status, body)) => RawResponse::new(status, body),
            None => RawResponse::new(StatusCode::OK, r#"{"data":"ok"}"#),
        })
    }

    async fn open_stream(
        &self,
        request: PreparedRequest,
    ) -> Result<StreamingResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let status = *self.stream_status.lock().unwrap();
        let chunks: Vec<Result<Vec<u8>, TransportError>> = self
            .stream_chunks
            .lock()
            .unwrap()
            .iter()
            .map(|chunk| Ok(chunk.as_bytes().to_vec()))
            .collect();
        let body = if self.hold_streams_open {
            stream::iter(chunks).chain(stream::pending()).boxed()
        } else {
            stream::iter(chunks).boxed()
        };
        Ok(StreamingResponse {
            status,
            headers: http::HeaderMap::new(),
            body,
        })
    }
}

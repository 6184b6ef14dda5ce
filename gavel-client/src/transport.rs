//! The HTTP seam. The pipeline and the stream client talk to a [`Transport`]
//! so tests can substitute an in-process fake.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::Serialize;
use url::Url;

use crate::error::TransportError;

/// A fully described outbound request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl PreparedRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Serializes `body` as the JSON request body.
    ///
    /// # Errors
    /// Returns [`TransportError::Build`] when the body cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        let bytes = serde_json::to_vec(body).map_err(|err| TransportError::Build(err.to_string()))?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(bytes);
        Ok(self)
    }

    /// Sets a header, silently skipping values that are not valid header text.
    #[must_use]
    pub fn header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// The `Authorization` header value this request carries, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// A response whose body is consumed incrementally.
pub struct StreamingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and buffers the whole response.
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError>;

    /// Sends `request` and hands back the body as a chunk stream.
    async fn open_stream(&self, request: PreparedRequest)
    -> Result<StreamingResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: PreparedRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

fn request_error(url: &Url, err: &reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|err| request_error(&url, &err))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn open_stream(
        &self,
        request: PreparedRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let url = request.url.clone();
        let response = self
            .build(request)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|err| request_error(&url, &err))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|err| TransportError::Body(err.to_string()))
            })
            .boxed();

        Ok(StreamingResponse {
            status,
            headers,
            body,
        })
    }
}

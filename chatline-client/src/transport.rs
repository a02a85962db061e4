//! HTTP transport.
//!
//! The [`Transport`] trait performs exactly one HTTP exchange. Retries,
//! cancellation and rate-limit bookkeeping live in the client on top of it,
//! so tests can swap in a scripted transport.

use crate::error::{ApiError, ApiResult};
use crate::request::RequestBody;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = ApiResult<Bytes>> + Send>>;

/// A concrete request, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Complete header set.
    pub headers: HeaderMap,
    /// Body.
    pub body: RequestBody,
    /// Timeout for the whole exchange, body included. `None` for streamed
    /// bodies, which may stay open for as long as the server keeps sending.
    pub timeout: Option<Duration>,
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ByteStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Create a response from a streaming body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a response with a fully buffered body.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, Box::pin(stream::once(async move { Ok::<_, ApiError>(body) })))
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase of the status.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown Status")
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Take the body stream.
    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Read the whole body.
    pub async fn bytes(self) -> ApiResult<Bytes> {
        let buf = self
            .body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Read the body as text, replacing invalid UTF-8.
    pub async fn text(self) -> ApiResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read and parse the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> ApiResult<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::invalid_response(e.to_string()))
    }

    /// Read the body into memory and return a replayable copy of the response.
    ///
    /// A body that fails mid-read keeps whatever arrived before the failure.
    pub async fn buffer(self) -> (HttpResponse, Bytes) {
        let HttpResponse {
            status,
            headers,
            mut body,
        } = self;

        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(error) => {
                    debug!(error = %error, "Error body read failed; using partial body");
                    break;
                }
            }
        }
        let bytes = buf.freeze();
        (
            HttpResponse::from_bytes(status, headers, bytes.clone()),
            bytes,
        )
    }
}

/// One HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response head with an unread body.
    async fn execute(&self, request: HttpRequest) -> ApiResult<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default `reqwest` client.
    pub fn new() -> ApiResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Use a custom `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(
                serde_json::to_vec(value).map_err(|e| ApiError::invalid_response(e.to_string()))?,
            ),
            RequestBody::Multipart(form) => builder.multipart(form.to_reqwest()?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(ApiError::from);

        Ok(HttpResponse::new(status, headers, Box::pin(body)))
    }
}

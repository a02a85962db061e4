//! Request descriptors.
//!
//! A [`RequestDescriptor`] says what to send; the client turns it into a
//! concrete HTTP request (URL, auth and identity headers) on every attempt.
//! Descriptors are immutable once built, so a retried attempt sends exactly
//! what the first one did.

use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use chatline_core::ConfigError;
use indexmap::IndexMap;
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Body of a request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// JSON document.
    Json(serde_json::Value),
    /// Multipart form.
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Whether the body is sent as JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, RequestBody::Json(_))
    }

    /// Whether the body is a multipart form.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// Clonable description of a multipart form.
///
/// A `reqwest` form can only be sent once, so the form is rebuilt from
/// this description for every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<MultipartPart>,
}

/// One field of a [`MultipartForm`].
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: PartValue,
}

/// Value of a multipart field.
#[derive(Debug, Clone)]
pub enum PartValue {
    /// Plain text field.
    Text(String),
    /// File field.
    File {
        /// File contents.
        data: Bytes,
        /// File name sent in the content disposition.
        file_name: String,
        /// Content type of the file.
        mime: Option<mime::Mime>,
    },
}

impl MultipartForm {
    /// Create an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        mime: Option<mime::Mime>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            value: PartValue::File {
                data: data.into(),
                file_name: file_name.into(),
                mime,
            },
        });
        self
    }

    /// Fields in insertion order.
    #[must_use]
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Build a fresh `reqwest` form.
    pub fn to_reqwest(&self) -> ApiResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match &part.value {
                PartValue::Text(value) => form.text(part.name.clone(), value.clone()),
                PartValue::File {
                    data,
                    file_name,
                    mime,
                } => {
                    let mut file = reqwest::multipart::Part::bytes(data.to_vec())
                        .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime.as_ref())?;
                    }
                    form.part(part.name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Everything needed to issue one logical call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    headers: IndexMap<String, String>,
    body: RequestBody,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    streaming: bool,
}

impl RequestDescriptor {
    /// Create a descriptor with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: IndexMap::new(),
            body: RequestBody::Empty,
            cancel: CancellationToken::new(),
            timeout: None,
            streaming: false,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path` with a JSON body.
    pub fn post_json<T: Serialize + ?Sized>(path: impl Into<String>, body: &T) -> ApiResult<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiError::Configuration(ConfigError::invalid_setting("body", e.to_string()))
        })?;
        Ok(Self::new(Method::POST, path).with_body(RequestBody::Json(value)))
    }

    /// `POST path` with a multipart form.
    pub fn post_multipart(path: impl Into<String>, form: MultipartForm) -> Self {
        Self::new(Method::POST, path).with_body(RequestBody::Multipart(form))
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Add a header. Caller headers override the client's defaults.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Tie the call to a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the response body as an open-ended event stream.
    ///
    /// The per-attempt timeout then bounds only the wait for response
    /// headers, never the body.
    #[must_use]
    pub fn with_streaming_body(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Endpoint path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Caller headers.
    #[must_use]
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Body.
    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Cancellation token shared with the caller.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Per-attempt timeout override.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the response body is read as an event stream.
    #[must_use]
    pub fn streams_body(&self) -> bool {
        self.streaming
    }
}

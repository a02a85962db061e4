//! The chat API client.

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::RateLimitSnapshot;
use crate::request::RequestDescriptor;
use crate::transport::{ByteStream, HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, CompletionOptions, EmbeddingInput,
    EmbeddingRequest, EmbeddingResponse, HealthReport, HealthStatus, ImageSource, ModelInfo,
    ModelList, ModerationRequest, ModerationResponse, SpeechOptions, SpeechRequest, VisionOptions,
    DEFAULT_EMBEDDING_MODEL,
};
use bytes::Bytes;
use chatline_core::{ClientConfig, ConfigError, ContentPart, Message, SamplingSettings};
use chatline_retries::{Cancelled, Retry, RetryConfig, Retryable, Sleeper, TokioSleeper};
use chatline_streaming::CompletionChunkStream;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Deadline of [`ChatClient::health_check`].
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream of completion chunks returned by streaming calls.
pub type ChunkStream = CompletionChunkStream<ByteStream>;

/// Client for an OpenAI-style chat API.
///
/// This is the explicit client context: configuration, transport, retry
/// policy and the rate-limit snapshot travel together and are shared by
/// clones.
#[derive(Clone)]
pub struct ChatClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    rate_limit: Arc<RwLock<RateLimitSnapshot>>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("max_retries", &self.retry.max_retries)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client over `reqwest` with the default retry policy.
    ///
    /// The API key is checked when a call is made, not here.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client from `OPENAI_*` environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a client over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            retry: RetryConfig::for_api(),
            sleeper: Arc::new(TokioSleeper),
            rate_limit: Arc::new(RwLock::new(RateLimitSnapshot::default())),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Wait between attempts through `sleeper`.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Retry policy.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Rate-limit counters from the last successful response.
    #[must_use]
    pub fn rate_limit_snapshot(&self) -> RateLimitSnapshot {
        self.rate_limit.read().clone()
    }

    // ------------------------------------------------------------------
    // Transport path
    // ------------------------------------------------------------------

    /// Perform exactly one attempt.
    ///
    /// Any HTTP status is returned as a response; only transport failures,
    /// configuration problems and cancellation are errors.
    pub async fn call(&self, descriptor: &RequestDescriptor) -> ApiResult<HttpResponse> {
        let token = descriptor.cancel_token();
        if token.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let request = self.prepare(descriptor)?;
        let head_timeout = self.attempt_timeout(descriptor);
        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(path = descriptor.path(), "Request cancelled in flight");
                return Err(ApiError::Cancelled);
            }
            result = tokio::time::timeout(head_timeout, self.transport.execute(request)) => {
                match result {
                    Ok(response) => response?,
                    Err(_) => {
                        warn!(
                            path = descriptor.path(),
                            timeout_ms = head_timeout.as_millis() as u64,
                            "No response headers before timeout"
                        );
                        return Err(ApiError::transport(format!(
                            "request timed out after {}ms waiting for a response",
                            head_timeout.as_millis()
                        )));
                    }
                }
            }
        };

        debug!(status = response.status().as_u16(), "Received response");
        if response.is_success() {
            self.record_rate_limit(response.headers());
        }
        Ok(response)
    }

    /// Perform a call under the retry policy.
    ///
    /// Transport failures, 429 and 5xx are retried. A 429 that is still
    /// failing after the last attempt is returned as-is; an exhausted 5xx
    /// or transport failure is returned as the typed error. Any other
    /// status is returned immediately for the caller to interpret.
    pub async fn call_with_retry(&self, descriptor: &RequestDescriptor) -> ApiResult<HttpResponse> {
        let client = self;
        let result = Retry::new(&self.retry)
            .sleeper(self.sleeper.clone())
            .cancel_on(descriptor.cancel_token().clone())
            .run(move || async move {
                let response = client.call(descriptor).await?;
                AttemptError::check(response).await
            })
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(AttemptError {
                error: ApiError::RateLimited { .. },
                response: Some(response),
            }) => {
                warn!(path = descriptor.path(), "Rate limited after final attempt");
                Ok(response)
            }
            Err(attempt) => Err(attempt.error),
        }
    }

    /// Perform a call under the retry policy and decode the body as an
    /// event stream.
    ///
    /// The stream observes the descriptor's cancellation token. The
    /// per-attempt timeout covers connecting and the response headers only;
    /// once frames flow, the stream ends at `[DONE]`, end of body or
    /// cancellation.
    pub async fn stream_call(&self, descriptor: &RequestDescriptor) -> ApiResult<ChunkStream> {
        let descriptor = &descriptor.clone().with_streaming_body();
        let response = self.call_with_retry(descriptor).await?;
        let response = Self::ensure_success(response).await?;
        Ok(CompletionChunkStream::new(
            response.into_body(),
            descriptor.cancel_token().clone(),
        ))
    }

    /// Turn a non-2xx response into its typed error.
    pub async fn ensure_success(response: HttpResponse) -> ApiResult<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status();
        let headers = response.headers().clone();
        let (_, body) = response.buffer().await;
        Err(ApiError::from_response(status, &headers, &body))
    }

    fn prepare(&self, descriptor: &RequestDescriptor) -> ApiResult<HttpRequest> {
        if self.config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let mut headers = HeaderMap::new();
        let mut auth = header_value("api_key", &format!("Bearer {}", self.config.api_key))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, header_value("user_agent", &self.config.user_agent)?);
        if descriptor.body().is_json() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in descriptor.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::invalid_setting("headers", e.to_string()))?;
            // reqwest writes the multipart boundary itself.
            if name == CONTENT_TYPE && descriptor.body().is_multipart() {
                continue;
            }
            headers.insert(name, header_value("headers", value)?);
        }

        Ok(HttpRequest {
            method: descriptor.method().clone(),
            url: self.config.endpoint(descriptor.path()),
            headers,
            body: descriptor.body().clone(),
            timeout: (!descriptor.streams_body()).then(|| self.attempt_timeout(descriptor)),
        })
    }

    fn attempt_timeout(&self, descriptor: &RequestDescriptor) -> Duration {
        descriptor.timeout().unwrap_or(self.config.timeout)
    }

    fn record_rate_limit(&self, headers: &HeaderMap) {
        let snapshot = RateLimitSnapshot::from_headers(headers);
        debug!(
            remaining_requests = snapshot.remaining_requests,
            remaining_tokens = snapshot.remaining_tokens,
            reset_at = snapshot.reset_at.as_deref().unwrap_or(""),
            "Updated rate-limit snapshot"
        );
        *self.rate_limit.write() = snapshot;
    }

    async fn post_json<T, R>(&self, path: &str, body: &T) -> ApiResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let descriptor = RequestDescriptor::post_json(path, body)?;
        let response = self.call_with_retry(&descriptor).await?;
        Self::ensure_success(response).await?.json().await
    }

    fn completion_request(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> ChatCompletionRequest {
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let sampling = self.config.sampling.merge(&options.sampling);
        ChatCompletionRequest::new(model, messages, &sampling)
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// `POST /chat/completions` without streaming.
    pub async fn create_chat_completion(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> ApiResult<ChatCompletionResponse> {
        let request = self.completion_request(messages, options);
        self.post_json("/chat/completions", &request).await
    }

    /// `POST /chat/completions` with `stream: true`.
    pub async fn create_chat_completion_stream(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> ApiResult<ChunkStream> {
        let request = self.completion_request(messages, options).stream(true);
        let descriptor = RequestDescriptor::post_json("/chat/completions", &request)?
            .with_header("Accept", "text/event-stream")
            .with_cancel(cancel);
        self.stream_call(&descriptor).await
    }

    /// `GET /models`.
    pub async fn list_models(&self) -> ApiResult<Vec<ModelInfo>> {
        let response = self.call_with_retry(&RequestDescriptor::get("/models")).await?;
        let list: ModelList = Self::ensure_success(response).await?.json().await?;
        Ok(list.data)
    }

    /// Check a key by listing models with it.
    ///
    /// `None` checks the configured key. Returns `Ok(false)` when the server
    /// rejects the key or cannot be reached; an empty key is a configuration
    /// error.
    pub async fn validate_api_key(&self, api_key: Option<&str>) -> ApiResult<bool> {
        let key = api_key.unwrap_or(&self.config.api_key);
        if key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let mut checker = self.clone();
        checker.config.api_key = key.to_string();

        match checker.call(&RequestDescriptor::get("/models")).await {
            Ok(response) => Ok(response.is_success()),
            Err(error @ ApiError::Configuration(_)) => Err(error),
            Err(error) => {
                debug!(error = %error, "API key validation request failed");
                Ok(false)
            }
        }
    }

    /// `POST /embeddings`. `None` uses `text-embedding-ada-002`.
    pub async fn create_embedding(
        &self,
        input: impl Into<EmbeddingInput>,
        model: Option<&str>,
    ) -> ApiResult<EmbeddingResponse> {
        let request = EmbeddingRequest {
            model: model.unwrap_or(DEFAULT_EMBEDDING_MODEL).to_string(),
            input: input.into(),
        };
        self.post_json("/embeddings", &request).await
    }

    /// `POST /moderations`.
    pub async fn moderate(&self, input: impl Into<String>) -> ApiResult<ModerationResponse> {
        let request = ModerationRequest {
            input: input.into(),
        };
        self.post_json("/moderations", &request).await
    }

    /// `POST /audio/speech`. Returns the encoded audio.
    pub async fn generate_speech(&self, text: &str, options: &SpeechOptions) -> ApiResult<Bytes> {
        let request = SpeechRequest {
            model: &options.model,
            input: text,
            voice: &options.voice,
            response_format: &options.response_format,
            speed: options.speed,
        };
        let descriptor = RequestDescriptor::post_json("/audio/speech", &request)?;
        let response = self.call_with_retry(&descriptor).await?;
        Self::ensure_success(response).await?.bytes().await
    }

    /// Ask a vision model about an image.
    pub async fn analyze_image(
        &self,
        image: &ImageSource,
        prompt: &str,
        options: &VisionOptions,
    ) -> ApiResult<ChatCompletionResponse> {
        let message = Message::user_parts(vec![
            ContentPart::text(prompt),
            ContentPart::image_url(image.to_url(), options.detail),
        ]);
        let sampling = SamplingSettings::new().max_tokens(options.max_tokens);
        let request = ChatCompletionRequest::new(&options.model, vec![message], &sampling);
        self.post_json("/chat/completions", &request).await
    }

    /// Call `GET /models` once with a 5 second deadline.
    ///
    /// Never fails; problems are reported in the returned [`HealthReport`].
    pub async fn health_check(&self) -> HealthReport {
        let descriptor = RequestDescriptor::get("/models").with_timeout(HEALTH_CHECK_TIMEOUT);
        let outcome = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.call(&descriptor))
            .await
            .unwrap_or(Err(ApiError::Timeout(HEALTH_CHECK_TIMEOUT)));

        let (status, status_code, error) = match outcome {
            Ok(response) if response.is_success() => {
                (HealthStatus::Healthy, Some(response.status().as_u16()), None)
            }
            Ok(response) => (HealthStatus::Unhealthy, Some(response.status().as_u16()), None),
            Err(error) => {
                warn!(error = %error, "Health check failed");
                (HealthStatus::Error, None, Some(error.to_string()))
            }
        };

        HealthReport {
            status,
            status_code,
            error,
            rate_limit: self.rate_limit_snapshot(),
        }
    }
}

fn header_value(field: &'static str, value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::from(ConfigError::invalid_setting(field, e.to_string())))
}

/// Failure of one attempt inside [`ChatClient::call_with_retry`].
///
/// Keeps the buffered response of a 429 so it can be handed back when the
/// attempts run out.
#[derive(Debug)]
struct AttemptError {
    error: ApiError,
    response: Option<HttpResponse>,
}

impl AttemptError {
    async fn check(response: HttpResponse) -> Result<HttpResponse, AttemptError> {
        let status = response.status();
        if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
            return Ok(response);
        }

        let (replay, body) = response.buffer().await;
        let error = ApiError::from_response(status, replay.headers(), &body);
        Err(AttemptError {
            error,
            response: Some(replay),
        })
    }
}

impl From<ApiError> for AttemptError {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

impl From<Cancelled> for AttemptError {
    fn from(cancelled: Cancelled) -> Self {
        ApiError::from(cancelled).into()
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.error.retry_after()
    }

    fn is_cancellation(&self) -> bool {
        self.error.is_cancelled()
    }

    fn status(&self) -> Option<u16> {
        self.error.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::MultipartForm;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use chatline_retries::RecordingSleeper;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<ApiResult<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<ApiResult<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
            self.requests.lock().push(request);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::transport("script exhausted")))
        }
    }

    fn respond(status: u16, body: &str) -> ApiResult<HttpResponse> {
        Ok(HttpResponse::from_bytes(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.to_string(),
        ))
    }

    fn client(transport: Arc<ScriptedTransport>) -> (ChatClient, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = ChatClient::with_transport(
            ClientConfig::new("sk-test").with_base_url("https://api.test/v1"),
            transport,
        )
        .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    #[tokio::test]
    async fn test_prepare_sets_default_headers() {
        let transport = ScriptedTransport::new(vec![respond(200, "{}")]);
        let (client, _) = client(transport.clone());

        let descriptor = RequestDescriptor::post_json("/moderations", &serde_json::json!({}))
            .unwrap()
            .with_header("X-Trace", "abc");
        client.call(&descriptor).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.test/v1/moderations");
        assert_eq!(request.headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert!(request.headers[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("chatline/"));
        assert_eq!(request.headers["x-trace"], "abc");
        assert_eq!(request.timeout, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_multipart_omits_content_type() {
        let transport = ScriptedTransport::new(vec![respond(200, "{}")]);
        let (client, _) = client(transport.clone());

        let form = MultipartForm::new().text("purpose", "test");
        let descriptor = RequestDescriptor::post_multipart("/files", form)
            .with_header("Content-Type", "application/json");
        client.call(&descriptor).await.unwrap();

        let request = &transport.requests()[0];
        assert!(request.headers.get(CONTENT_TYPE).is_none());
        assert!(request.body.is_multipart());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let transport = ScriptedTransport::new(vec![]);
        let client = ChatClient::with_transport(ClientConfig::default(), transport.clone());

        let err = client
            .call_with_retry(&RequestDescriptor::get("/models"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_descriptor_is_not_sent() {
        let transport = ScriptedTransport::new(vec![respond(200, "{}")]);
        let (client, sleeper) = client(transport.clone());

        let token = CancellationToken::new();
        token.cancel();
        let err = client
            .call_with_retry(&RequestDescriptor::get("/models").with_cancel(token))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(transport.requests().is_empty());
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_then_success() {
        let transport =
            ScriptedTransport::new(vec![Err(ApiError::transport("reset")), respond(200, "{}")]);
        let (client, sleeper) = client(transport.clone());

        let response = client
            .call_with_retry(&RequestDescriptor::get("/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_exhausted_server_error_is_typed() {
        let transport = ScriptedTransport::new((0..4).map(|_| respond(500, "")).collect());
        let (client, sleeper) = client(transport.clone());

        let err = client
            .call_with_retry(&RequestDescriptor::get("/models"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.message(), "HTTP 500: Internal Server Error");
        assert_eq!(transport.requests().len(), 4);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_returns_response() {
        let body = r#"{"error":{"message":"slow down","code":"rate_limit_exceeded"}}"#;
        let transport = ScriptedTransport::new((0..4).map(|_| respond(429, body)).collect());
        let (client, _) = client(transport.clone());

        let response = client
            .call_with_retry(&RequestDescriptor::get("/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(transport.requests().len(), 4);

        let err = ChatClient::ensure_success(response).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.message(), "slow down");
        assert_eq!(err.code(), Some("rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn test_client_error_returned_without_retry() {
        let transport = ScriptedTransport::new(vec![respond(404, "")]);
        let (client, sleeper) = client(transport.clone());

        let response = client
            .call_with_retry(&RequestDescriptor::get("/missing"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(transport.requests().len(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_updates_only_on_success() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-remaining-requests",
            HeaderValue::from_static("10"),
        );
        let limited = HttpResponse::from_bytes(StatusCode::NOT_FOUND, headers.clone(), "");
        let ok = HttpResponse::from_bytes(StatusCode::OK, headers, "{}");
        let transport = ScriptedTransport::new(vec![Ok(limited), Ok(ok)]);
        let (client, _) = client(transport);

        client.call(&RequestDescriptor::get("/a")).await.unwrap();
        assert_eq!(client.rate_limit_snapshot().remaining_requests, 0);

        client.call(&RequestDescriptor::get("/b")).await.unwrap();
        assert_eq!(client.rate_limit_snapshot().remaining_requests, 10);
        assert_eq!(client.clone().rate_limit_snapshot().remaining_requests, 10);
    }

    #[tokio::test]
    async fn test_completion_options_override_config() {
        let transport = ScriptedTransport::new(vec![respond(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#,
        )]);
        let (client, _) = client(transport.clone());

        let response = client
            .create_chat_completion(
                vec![Message::user("hello")],
                &CompletionOptions::new().model("gpt-4o-mini").temperature(0.2),
            )
            .await
            .unwrap();
        assert_eq!(response.text(), Some("hi"));

        let crate::request::RequestBody::Json(body) = &transport.requests()[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_stream_call_decodes_body() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n\
                   data: [DONE]\n\n";
        let transport = ScriptedTransport::new(vec![respond(200, sse)]);
        let (client, _) = client(transport.clone());

        let stream = client
            .create_chat_completion_stream(
                vec![Message::user("hi")],
                &CompletionOptions::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let text: Vec<String> = stream.text_deltas().map(|d| d.unwrap()).collect().await;

        assert_eq!(text.concat(), "AB");
        // The body of a stream is never bounded by the per-attempt timeout.
        assert_eq!(transport.requests()[0].timeout, None);
    }

    struct StalledTransport {
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for StalledTransport {
        async fn execute(&self, _request: HttpRequest) -> ApiResult<HttpResponse> {
            *self.attempts.lock() += 1;
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_response_headers_time_out_and_retry() {
        let transport = Arc::new(StalledTransport {
            attempts: Mutex::new(0),
        });
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = ChatClient::with_transport(
            ClientConfig::new("sk-test")
                .with_base_url("https://api.test/v1")
                .with_timeout(Duration::from_secs(1)),
            transport.clone(),
        )
        .with_sleeper(sleeper.clone());

        let err = client
            .stream_call(&RequestDescriptor::get("/events"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_retryable());
        assert_eq!(*transport.attempts.lock(), 4);
        assert_eq!(sleeper.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_validate_api_key() {
        let transport = ScriptedTransport::new(vec![
            respond(200, r#"{"data":[]}"#),
            respond(401, ""),
            Err(ApiError::transport("dns")),
        ]);
        let (client, _) = client(transport.clone());

        assert!(client.validate_api_key(None).await.unwrap());
        assert!(!client.validate_api_key(Some("sk-other")).await.unwrap());
        assert!(!client.validate_api_key(None).await.unwrap());
        assert_eq!(
            transport.requests()[1].headers[AUTHORIZATION],
            "Bearer sk-other"
        );
        assert_eq!(
            client.validate_api_key(Some("  ")).await.unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[tokio::test]
    async fn test_health_check_reports() {
        let transport = ScriptedTransport::new(vec![
            respond(200, r#"{"data":[]}"#),
            respond(503, ""),
            Err(ApiError::transport("refused")),
        ]);
        let (client, sleeper) = client(transport.clone());

        let healthy = client.health_check().await;
        assert!(healthy.is_healthy());
        assert_eq!(healthy.status_code, Some(200));

        let unhealthy = client.health_check().await;
        assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
        assert_eq!(unhealthy.status_code, Some(503));

        let failed = client.health_check().await;
        assert_eq!(failed.status, HealthStatus::Error);
        assert!(failed.error.unwrap().contains("refused"));

        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.requests()[0].timeout, Some(HEALTH_CHECK_TIMEOUT));
        assert!(sleeper.recorded().is_empty());
    }
}

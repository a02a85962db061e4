//! Cancellable stream of decoded completion chunks.

use crate::decoder::{DecoderState, SseLineDecoder};
use crate::error::{StreamError, StreamResult};
use crate::text::TextDeltas;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

/// Lazy sequence of parsed completion chunks read from a response body.
///
/// The body is read only when the stream is polled. Each poll first checks
/// the cancellation token and the optional deadline; a cancelled or expired
/// stream yields one error and then ends. The underlying body is dropped as
/// soon as the stream reaches a terminal state, and never more than once.
pub struct CompletionChunkStream<S> {
    inner: Option<Pin<Box<S>>>,
    decoder: SseLineDecoder,
    pending: VecDeque<Value>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
    emitted: usize,
    finished: bool,
}

impl<S> std::fmt::Debug for CompletionChunkStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionChunkStream")
            .field("state", &self.decoder.state())
            .field("pending", &self.pending.len())
            .field("emitted", &self.emitted)
            .field("released", &self.inner.is_none())
            .finish()
    }
}

impl<S, E> CompletionChunkStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    /// Decode `body`, stopping when `cancel` fires.
    pub fn new(body: S, cancel: CancellationToken) -> Self {
        Self {
            inner: Some(Box::pin(body)),
            decoder: SseLineDecoder::new(),
            pending: VecDeque::new(),
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
            cancel,
            timeout: None,
            deadline: None,
            emitted: 0,
            finished: false,
        }
    }

    /// Fail with [`StreamError::Timeout`] if the stream is still open after
    /// `timeout`. The clock starts at the first poll.
    #[must_use]
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a decoder with a custom buffer limit.
    #[must_use]
    pub fn with_decoder(mut self, decoder: SseLineDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Pull the next chunk. `None` means the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<StreamResult<Value>> {
        self.next().await
    }

    /// Only the text fragments of each chunk.
    pub fn text_deltas(self) -> TextDeltas<Self> {
        TextDeltas::new(self)
    }
}

impl<S> CompletionChunkStream<S> {
    /// Cancel the shared token and release the body now.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.release();
    }

    /// Decoder state.
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Number of chunks handed to the caller so far.
    #[must_use]
    pub fn chunks_emitted(&self) -> usize {
        self.emitted
    }

    /// The token this stream observes.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the underlying body has been dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            debug!(chunks = self.emitted, "Released response body");
        }
    }

    fn terminate(&mut self, error: StreamError) -> Poll<Option<StreamResult<Value>>> {
        self.decoder.abort();
        self.pending.clear();
        self.release();
        self.finished = true;
        Poll::Ready(Some(Err(error)))
    }
}

impl<S, E> Stream for CompletionChunkStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = StreamResult<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if !this.finished {
                if this.cancel.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
                    debug!(chunks = this.emitted, "Completion stream cancelled");
                    return this.terminate(StreamError::Cancelled);
                }

                if let Some(timeout) = this.timeout {
                    let deadline = this
                        .deadline
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                    if deadline.as_mut().poll(cx).is_ready() {
                        debug!(
                            chunks = this.emitted,
                            timeout_ms = timeout.as_millis() as u64,
                            "Completion stream deadline exceeded"
                        );
                        return this.terminate(StreamError::Timeout(timeout));
                    }
                }
            }

            if let Some(chunk) = this.pending.pop_front() {
                this.emitted += 1;
                return Poll::Ready(Some(Ok(chunk)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            let Some(inner) = this.inner.as_mut() else {
                this.finished = true;
                return Poll::Ready(None);
            };

            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match this.decoder.feed(&bytes) {
                    Ok(chunks) => {
                        this.pending.extend(chunks);
                        if this.decoder.is_terminal() {
                            this.release();
                            this.finished = true;
                        }
                    }
                    Err(error) => return this.terminate(error),
                },
                Poll::Ready(Some(Err(error))) => {
                    return this.terminate(StreamError::transport(error));
                }
                Poll::Ready(None) => {
                    this.decoder.finish();
                    this.release();
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::ChunkExt;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type BodyItem = Result<Bytes, std::io::Error>;

    /// Body that counts reads and drops.
    struct CountingBody {
        reads: VecDeque<BodyItem>,
        polls: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
        hang_when_empty: bool,
    }

    impl Stream for CountingBody {
        type Item = BodyItem;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<BodyItem>> {
            let this = self.get_mut();
            this.polls.fetch_add(1, Ordering::SeqCst);
            match this.reads.pop_front() {
                Some(item) => Poll::Ready(Some(item)),
                None if this.hang_when_empty => Poll::Pending,
                None => Poll::Ready(None),
            }
        }
    }

    impl Drop for CountingBody {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Counters {
        polls: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
    }

    fn counting_body(reads: Vec<&'static str>, hang_when_empty: bool) -> (CountingBody, Counters) {
        let polls = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let body = CountingBody {
            reads: reads
                .into_iter()
                .map(|s| Ok(Bytes::from_static(s.as_bytes())))
                .collect(),
            polls: polls.clone(),
            drops: drops.clone(),
            hang_when_empty,
        };
        (body, Counters { polls, drops })
    }

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n")
    }

    #[tokio::test]
    async fn test_scripted_two_chunks() {
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(delta("A"))),
            Ok(Bytes::from(delta("B"))),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ]);
        let chunks: Vec<_> = CompletionChunkStream::new(body, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);
        let text: String = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().delta_content().unwrap_or_default())
            .collect();
        assert_eq!(text, "AB");
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let whole = format!("{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"));
        let reads: Vec<BodyItem> = whole
            .as_bytes()
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut stream = CompletionChunkStream::new(stream::iter(reads), CancellationToken::new());

        let mut text = String::new();
        while let Some(chunk) = stream.next_chunk().await {
            text.push_str(chunk.unwrap().delta_content().unwrap_or_default());
        }
        assert_eq!(text, "Hello");
        assert_eq!(stream.state(), DecoderState::Done);
        assert_eq!(stream.chunks_emitted(), 2);
    }

    #[tokio::test]
    async fn test_sentinel_releases_body_without_reading_further() {
        let (body, counters) = counting_body(
            vec!["data: {\"n\":1}\ndata: [DONE]\n", "data: {\"n\":2}\n"],
            false,
        );
        let mut stream = CompletionChunkStream::new(body, CancellationToken::new());

        assert!(stream.next_chunk().await.unwrap().is_ok());
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(counters.polls.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);

        drop(stream);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_reads_and_releases_once() {
        let (body, counters) = counting_body(
            vec!["data: {\"n\":1}\n", "data: {\"n\":2}\n", "data: {\"n\":3}\n"],
            false,
        );
        let token = CancellationToken::new();
        let mut stream = CompletionChunkStream::new(body, token.clone());

        assert!(stream.next_chunk().await.unwrap().is_ok());
        let polls_before = counters.polls.load(Ordering::SeqCst);

        token.cancel();
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert!(stream.next_chunk().await.is_none());
        assert!(stream.next_chunk().await.is_none());

        assert_eq!(counters.polls.load(Ordering::SeqCst), polls_before);
        assert_eq!(stream.state(), DecoderState::Aborted);
        assert!(stream.is_released());

        drop(stream);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_method_releases_immediately() {
        let (body, counters) = counting_body(vec!["data: {\"n\":1}\n"], true);
        let token = CancellationToken::new();
        let mut stream = CompletionChunkStream::new(body, token.clone());

        stream.cancel();
        assert!(token.is_cancelled());
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);

        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
        assert_eq!(counters.polls.load(Ordering::SeqCst), 0);

        drop(stream);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_read() {
        let (body, counters) = counting_body(vec!["data: {\"n\":1}\n"], true);
        let token = CancellationToken::new();
        let mut stream = CompletionChunkStream::new(body, token.clone());

        assert!(stream.next_chunk().await.unwrap().is_ok());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_read_is_woken_by_cancel() {
        let (body, counters) = counting_body(vec![], true);
        let token = CancellationToken::new();
        let mut stream = tokio_test::task::spawn(CompletionChunkStream::new(body, token.clone()));

        tokio_test::assert_pending!(stream.poll_next());
        assert_eq!(counters.polls.load(Ordering::SeqCst), 1);

        token.cancel();
        assert!(stream.is_woken());
        let item = tokio_test::assert_ready!(stream.poll_next());
        assert!(matches!(item, Some(Err(StreamError::Cancelled))));
        assert_eq!(counters.polls.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_self_cancels() {
        let (body, counters) = counting_body(vec!["data: {\"n\":1}\n"], true);
        let mut stream = CompletionChunkStream::new(body, CancellationToken::new())
            .with_deadline(Duration::from_secs(5));

        assert!(stream.next_chunk().await.unwrap().is_ok());
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
            Ok(Bytes::from_static(b"data: {\"n\":2}\n")),
        ]);
        let mut stream = CompletionChunkStream::new(body, CancellationToken::new());

        assert!(stream.next_chunk().await.unwrap().is_ok());
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_end_without_sentinel() {
        let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"data: {\"n\":1}\ndata: {\"n\":",
        ))]);
        let chunks: Vec<_> = CompletionChunkStream::new(body, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
    }
}

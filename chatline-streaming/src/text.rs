//! Text extraction from completion chunks.

use crate::error::StreamResult;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Accessors for the fields of a chat completion chunk.
///
/// Chunks are opaque JSON; these look at `choices[0]` and return `None`
/// when the shape does not match.
pub trait ChunkExt {
    /// Text fragment at `choices[0].delta.content`.
    fn delta_content(&self) -> Option<&str>;

    /// Finish reason at `choices[0].finish_reason`.
    fn finish_reason(&self) -> Option<&str>;

    /// Usage block, when the server echoes one.
    fn usage(&self) -> Option<&Value>;
}

impl ChunkExt for Value {
    fn delta_content(&self) -> Option<&str> {
        self.pointer("/choices/0/delta/content")?.as_str()
    }

    fn finish_reason(&self) -> Option<&str> {
        self.pointer("/choices/0/finish_reason")?.as_str()
    }

    fn usage(&self) -> Option<&Value> {
        self.get("usage").filter(|u| !u.is_null())
    }
}

pin_project! {
    /// Stream adapter that yields only the text fragments of a chunk stream.
    ///
    /// Chunks without text are skipped. Errors pass through.
    pub struct TextDeltas<S> {
        #[pin]
        inner: S,
    }
}

impl<S> TextDeltas<S> {
    /// Wrap a chunk stream.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap the adapter.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Stream for TextDeltas<S>
where
    S: Stream<Item = StreamResult<Value>>,
{
    type Item = StreamResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Some(text) = chunk.delta_content().filter(|t| !t.is_empty()) {
                        return Poll::Ready(Some(Ok(text.to_string())));
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Growing text buffer built from completion chunks.
#[derive(Debug, Clone, Default)]
pub struct TextAccumulator {
    text: String,
    finish_reason: Option<String>,
    chunks: usize,
    text_chunks: usize,
    usage: Option<Value>,
}

impl TextAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a chunk and return the text it added, if any.
    pub fn push(&mut self, chunk: &Value) -> Option<&str> {
        self.chunks += 1;

        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }
        if let Some(usage) = chunk.usage() {
            self.usage = Some(usage.clone());
        }

        let delta = chunk.delta_content().filter(|t| !t.is_empty())?;
        let start = self.text.len();
        self.text.push_str(delta);
        self.text_chunks += 1;
        Some(&self.text[start..])
    }

    /// Append a bare text fragment.
    pub fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.text_chunks += 1;
    }

    /// Text so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume and return the text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    /// Last finish reason seen.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Number of chunks absorbed.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Number of chunks that carried text.
    #[must_use]
    pub fn text_chunk_count(&self) -> usize {
        self.text_chunks
    }

    /// Usage block echoed by the server, if any.
    #[must_use]
    pub fn usage(&self) -> Option<&Value> {
        self.usage.as_ref()
    }

    /// `usage.completion_tokens`, if echoed.
    #[must_use]
    pub fn completion_tokens(&self) -> Option<u64> {
        self.usage.as_ref()?.get("completion_tokens")?.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use futures::{stream, StreamExt};
    use serde_json::json;

    fn chunk(text: &str) -> Value {
        json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]})
    }

    #[test]
    fn test_chunk_accessors() {
        let c = chunk("hi");
        assert_eq!(c.delta_content(), Some("hi"));
        assert_eq!(c.finish_reason(), None);
        assert!(c.usage().is_none());

        let end = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
        assert_eq!(end.delta_content(), None);
        assert_eq!(end.finish_reason(), Some("stop"));

        assert_eq!(json!({"unexpected": true}).delta_content(), None);
    }

    #[test]
    fn test_accumulator() {
        let mut acc = TextAccumulator::new();
        assert_eq!(acc.push(&chunk("Hel")), Some("Hel"));
        assert_eq!(acc.push(&chunk("lo")), Some("lo"));
        assert_eq!(
            acc.push(&json!({
                "choices": [{"delta": {}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2}
            })),
            None
        );

        assert_eq!(acc.text(), "Hello");
        assert_eq!(acc.finish_reason(), Some("stop"));
        assert_eq!(acc.chunk_count(), 3);
        assert_eq!(acc.text_chunk_count(), 2);
        assert_eq!(acc.completion_tokens(), Some(2));
        assert_eq!(acc.into_text(), "Hello");
    }

    #[tokio::test]
    async fn test_text_deltas_skips_empty_chunks() {
        let chunks = stream::iter(vec![
            Ok::<_, StreamError>(chunk("A")),
            Ok(json!({"choices": [{"delta": {"role": "assistant"}}]})),
            Ok(chunk("")),
            Ok(chunk("B")),
        ]);
        let deltas: Vec<String> = TextDeltas::new(chunks)
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_text_deltas_passes_errors() {
        let chunks = stream::iter(vec![Ok(chunk("A")), Err(StreamError::Cancelled)]);
        let items: Vec<_> = TextDeltas::new(chunks).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap_err().is_cancellation());
    }
}

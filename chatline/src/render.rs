//! Rendering collaborator.

use chatline_core::ChatMessage;

/// Receives assistant text as it arrives.
pub trait DeltaRenderer: Send + Sync {
    /// Called for every text fragment with the text accumulated so far.
    fn on_delta(&self, message_id: &str, delta: &str, full_text: &str);

    /// Called once the assistant message is final.
    fn on_complete(&self, _message: &ChatMessage) {}
}

/// Renderer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl DeltaRenderer for NoopRenderer {
    fn on_delta(&self, _message_id: &str, _delta: &str, _full_text: &str) {}
}

impl<F> DeltaRenderer for F
where
    F: Fn(&str, &str, &str) + Send + Sync,
{
    fn on_delta(&self, message_id: &str, delta: &str, full_text: &str) {
        self(message_id, delta, full_text);
    }
}

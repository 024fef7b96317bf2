use std::time::Duration;

/// Outcome of handling one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed; do not redeliver.
    Ack,
    /// Failed; redeliver after `delay` (or the consumer's retry policy delay
    /// when `None`).
    Nack { delay: Option<Duration> },
}

impl HandlerOutcome {
    pub fn nack() -> Self {
        Self::Nack { delay: None }
    }

    pub fn nack_after(delay: Duration) -> Self {
        Self::Nack { delay: Some(delay) }
    }
}

/// At-least-once message handler.
///
/// Handlers see the same message more than once (redelivery after a nack,
/// duplicate publication). The body must therefore be naturally idempotent.
#[async_trait::async_trait]
pub trait MessageHandler<M>: Send + Sync {
    async fn handle(&self, message: &M) -> HandlerOutcome;
}

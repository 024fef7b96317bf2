//! `warden-events`: message bus plumbing and at-least-once consumers.

pub mod bus;
pub mod consumer;
pub mod envelope;
pub mod handler;
pub mod in_memory_bus;
pub mod retry;

pub use bus::{EventBus, Subscription};
pub use consumer::{Consumer, ConsumerHandle, DEAD_LETTER_CAPACITY};
pub use envelope::{Envelope, NamespaceEvent};
pub use handler::{HandlerOutcome, MessageHandler};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use retry::{BackoffStrategy, RetryPolicy};

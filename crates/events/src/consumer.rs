//! Background consumer with ack/nack and delayed redelivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::{EventBus, HandlerOutcome, MessageHandler, RetryPolicy, Subscription};

/// Handle to control and join a background consumer.
#[derive(Debug)]
pub struct ConsumerHandle<M> {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    dead_letters: Arc<Mutex<VecDeque<M>>>,
}

/// Dead letters kept per consumer before the oldest are discarded.
pub const DEAD_LETTER_CAPACITY: usize = 1024;

impl<M> ConsumerHandle<M> {
    /// Drain the messages that exhausted their retry budget.
    ///
    /// At most [`DEAD_LETTER_CAPACITY`] are retained between drains.
    pub fn take_dead_letters(&self) -> Vec<M> {
        match self.dead_letters.lock() {
            Ok(mut dl) => dl.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    /// Request graceful shutdown and wait for the consumer to stop.
    ///
    /// Redeliveries still waiting on their delay are dropped; the bus is
    /// expected to deliver them again.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

struct Pending<M> {
    due: Instant,
    attempt: u32,
    message: M,
}

/// Generic at-least-once consumer loop.
///
/// - Subscribes to a bus
/// - Drives an async [`MessageHandler`] on the given runtime
/// - Redelivers nacked messages after a delay, dead-letters after `retry.max_attempts`
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct Consumer;

impl Consumer {
    pub fn spawn<M, B, H>(
        name: &'static str,
        bus: &B,
        runtime: Handle,
        handler: Arc<H>,
        retry: RetryPolicy,
    ) -> std::io::Result<ConsumerHandle<M>>
    where
        M: Clone + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: MessageHandler<M> + ?Sized + 'static,
    {
        Self::spawn_bounded(name, bus, runtime, handler, retry, DEAD_LETTER_CAPACITY)
    }

    fn spawn_bounded<M, B, H>(
        name: &'static str,
        bus: &B,
        runtime: Handle,
        handler: Arc<H>,
        retry: RetryPolicy,
        dead_letter_capacity: usize,
    ) -> std::io::Result<ConsumerHandle<M>>
    where
        M: Clone + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: MessageHandler<M> + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();
        let dead_letters = Arc::new(Mutex::new(VecDeque::new()));

        let ctx = LoopContext {
            name,
            runtime,
            handler,
            retry,
            dead_letters: Arc::clone(&dead_letters),
            dead_letter_capacity,
        };
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || ctx.run(sub, shutdown_rx))?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            dead_letters,
        })
    }
}

struct LoopContext<M, H: ?Sized> {
    name: &'static str,
    runtime: Handle,
    handler: Arc<H>,
    retry: RetryPolicy,
    dead_letters: Arc<Mutex<VecDeque<M>>>,
    dead_letter_capacity: usize,
}

impl<M, H> LoopContext<M, H>
where
    H: MessageHandler<M> + ?Sized,
{
    fn run(self, sub: Subscription<M>, shutdown_rx: mpsc::Receiver<()>) {
        let tick = Duration::from_millis(250);
        let mut pending: Vec<Pending<M>> = Vec::new();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let now = Instant::now();
            let (due, later): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.due <= now);
            pending = later;
            for p in due {
                self.deliver(p.message, p.attempt, &mut pending);
            }

            let now = Instant::now();
            let wait = pending
                .iter()
                .map(|p| p.due.saturating_duration_since(now))
                .min()
                .map_or(tick, |d| d.min(tick));

            match sub.recv_timeout(wait) {
                Ok(message) => self.deliver(message, 1, &mut pending),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if pending.is_empty() {
                        break;
                    }
                    thread::sleep(wait.max(Duration::from_millis(1)));
                }
            }
        }

        if !pending.is_empty() {
            warn!(
                consumer = self.name,
                dropped = pending.len(),
                "consumer stopped with redeliveries outstanding"
            );
        }
    }

    fn deliver(&self, message: M, attempt: u32, pending: &mut Vec<Pending<M>>) {
        match self.runtime.block_on(self.handler.handle(&message)) {
            HandlerOutcome::Ack => {
                debug!(consumer = self.name, attempt, "message acknowledged");
            }
            HandlerOutcome::Nack { delay } if self.retry.should_retry(attempt) => {
                let delay = delay.unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                warn!(
                    consumer = self.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "message nacked; scheduling redelivery"
                );
                pending.push(Pending {
                    due: Instant::now() + delay,
                    attempt: attempt + 1,
                    message,
                });
            }
            HandlerOutcome::Nack { .. } => {
                error!(
                    consumer = self.name,
                    attempt, "message dead-lettered after exhausting retries"
                );
                self.dead_letter(message);
            }
        }
    }

    fn dead_letter(&self, message: M) {
        let mut dl = match self.dead_letters.lock() {
            Ok(dl) => dl,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.dead_letter_capacity == 0 {
            return;
        }
        if dl.len() >= self.dead_letter_capacity {
            dl.pop_front();
            warn!(
                consumer = self.name,
                capacity = self.dead_letter_capacity,
                "dead-letter queue full; discarding oldest"
            );
        }
        dl.push_back(message);
    }
}

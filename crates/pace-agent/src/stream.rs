use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::event::AgentEvent;
use crate::{AgentError, Result};

pub const DEFAULT_CAPACITY: usize = 1024;

// ─── EventBus ─────────────────────────────────────────────────────────────

/// Fan-out of [`AgentEvent`]s to every current subscriber.
///
/// Subscribers only see events published after they subscribed, so callers
/// must subscribe before starting the work that produces events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many subscribers received the event. Publishing with no
    /// subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: AgentEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ─── EventStream ──────────────────────────────────────────────────────────

/// One subscription to an [`EventBus`].
///
/// Ends when every sender is dropped. A slow consumer that falls behind the
/// channel capacity gets [`AgentError::Lagged`] and then continues with the
/// oldest retained event.
pub struct EventStream {
    inner: BroadcastStream<AgentEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: broadcast::Receiver<AgentEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(rx),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<AgentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|item| {
            item.map(|r| r.map_err(|BroadcastStreamRecvError::Lagged(n)| AgentError::Lagged(n)))
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

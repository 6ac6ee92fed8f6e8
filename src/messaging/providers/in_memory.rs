//! # In-Memory Queue
//!
//! In-process implementation of [`MessageQueue`] over an unbounded tokio
//! channel. Single subscriber; `close` stops new publishes and ends the
//! subscription once buffered deliveries have drained.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::messaging::traits::{Delivery, DeliveryStream, MessageQueue};
use crate::messaging::MessagingError;

#[derive(Debug)]
pub struct InMemoryQueue {
    queue_name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    next_tag: AtomicU64,
}

impl InMemoryQueue {
    pub fn new(queue_name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            queue_name: queue_name.into(),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            next_tag: AtomicU64::new(1),
        }
    }

    /// Number of payloads accepted so far
    pub fn published_count(&self) -> u64 {
        self.next_tag.load(Ordering::Relaxed) - 1
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new("in_memory")
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), MessagingError> {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| MessagingError::closed(&self.queue_name))?;

        let delivery_tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        sender
            .send(Delivery {
                delivery_tag,
                payload: payload.to_vec(),
            })
            .map_err(|_| MessagingError::closed(&self.queue_name))
    }

    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| MessagingError::already_subscribed(&self.queue_name))?;

        debug!(queue = %self.queue_name, "In-memory subscription started");

        let stream = futures::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        if self.sender.lock().take().is_some() {
            debug!(queue = %self.queue_name, "In-memory queue closed");
        }
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

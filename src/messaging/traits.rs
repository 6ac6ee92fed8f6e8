//! Queue port shared by the producer and the consumer.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::MessagingError;

/// A message handed to the consumer.
///
/// Adapters acknowledge a delivery as it is pulled from the stream, so
/// holding a `Delivery` carries no obligation back to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Adapter-assigned, monotonically increasing per subscription
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
}

/// Stream of deliveries; it ends when the queue is closed or the connection
/// is lost.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// A durable FIFO queue carrying serialized user records.
#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    /// Publish one payload. Succeeds once the broker has accepted it.
    async fn publish(&self, payload: &[u8]) -> Result<(), MessagingError>;

    /// Start consuming. The returned stream is finite: it terminates when the
    /// queue is closed.
    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError>;

    /// Release the connection and end any active subscription.
    async fn close(&self) -> Result<(), MessagingError>;

    fn queue_name(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}

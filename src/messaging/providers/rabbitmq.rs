//! # RabbitMQ Queue
//!
//! [`MessageQueue`] over AMQP 0.9.1 using `lapin`.
//!
//! - **Durable queue**: declared on connect, survives broker restarts
//! - **Persistent messages**: published to the default exchange with
//!   delivery mode 2, routed by queue name
//! - **Ack on pull**: each delivery is acknowledged as the batching engine
//!   pulls it from the stream, before it is batched, so a consumer crash
//!   loses in-flight records (at-most-once)
//! - **Prefetch**: `basic_qos` caps unacknowledged deliveries, so a stalled
//!   engine leaves at most `prefetch_count` messages buffered client-side

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RabbitMqConfig;
use crate::messaging::traits::{Delivery, DeliveryStream, MessageQueue};
use crate::messaging::MessagingError;

const REPLY_SUCCESS: u16 = 200;

pub struct RabbitMqQueue {
    connection: Connection,
    channel: Channel,
    config: RabbitMqConfig,
    consumer_tag: Mutex<Option<String>>,
    total_published: AtomicU64,
}

impl std::fmt::Debug for RabbitMqQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqQueue")
            .field("queue_name", &self.config.queue_name)
            .field("connection_url", &self.connection_url_redacted())
            .finish_non_exhaustive()
    }
}

impl RabbitMqQueue {
    /// Connect, open a confirming channel, apply prefetch and declare the
    /// durable queue.
    pub async fn connect(config: &RabbitMqConfig) -> Result<Self, MessagingError> {
        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default()
                .with_connection_name(config.connection_name.clone().into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&config.queue_name, "confirm_select", e.to_string())
            })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&config.queue_name, "basic_qos", e.to_string())
            })?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&config.queue_name, "queue_declare", e.to_string())
            })?;

        let queue = Self {
            connection,
            channel,
            config: config.clone(),
            consumer_tag: Mutex::new(None),
            total_published: AtomicU64::new(0),
        };

        info!(
            queue = %queue.config.queue_name,
            url = %queue.connection_url_redacted(),
            prefetch = queue.config.prefetch_count,
            "🐇 RABBITMQ: Connected and queue declared"
        );

        Ok(queue)
    }

    /// Connection URL with credentials stripped, for logging
    pub fn connection_url_redacted(&self) -> &str {
        if self.config.url.contains('@') {
            if let Some(scheme_end) = self.config.url.find("://") {
                return &self.config.url[..scheme_end + 3];
            }
        }
        "amqp://..."
    }

    pub fn total_published(&self) -> u64 {
        self.total_published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageQueue for RabbitMqQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), MessagingError> {
        let queue_name = &self.config.queue_name;

        let confirm = self
            .channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "publish", e.to_string()))?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::queue_operation(queue_name, "publish_confirm", e.to_string())
        })?;
        if confirmation.is_nack() {
            return Err(MessagingError::queue_operation(
                queue_name,
                "publish_confirm",
                "broker rejected the message",
            ));
        }

        self.total_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError> {
        let queue_name = self.config.queue_name.clone();
        let consumer_tag = format!("{}-{}", self.config.connection_name, uuid::Uuid::new_v4());

        let consumer = self
            .channel
            .basic_consume(
                &queue_name,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&queue_name, "basic_consume", e.to_string())
            })?;

        *self.consumer_tag.lock() = Some(consumer_tag.clone());
        info!(
            queue = %queue_name,
            consumer_tag = %consumer_tag,
            prefetch = self.config.prefetch_count,
            "🐇 RABBITMQ: Subscription started"
        );

        let deliveries = consumer.map(|item| {
            item.map(|delivery| Delivery {
                delivery_tag: delivery.delivery_tag,
                payload: delivery.data,
            })
        });
        let channel = self.channel.clone();
        let ack = move |delivery_tag: u64| {
            let channel = channel.clone();
            async move {
                channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
            }
        };

        Ok(ack_on_pull(queue_name, deliveries, ack))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        let queue_name = &self.config.queue_name;
        let consumer_tag = self.consumer_tag.lock().take();

        if let Some(tag) = consumer_tag {
            if let Err(e) = self
                .channel
                .basic_cancel(&tag, BasicCancelOptions::default())
                .await
            {
                warn!(
                    queue = %queue_name,
                    consumer_tag = %tag,
                    error = %e,
                    "Failed to cancel consumer"
                );
            }
        }

        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "closing")
                .await
                .map_err(|e| {
                    MessagingError::queue_operation(queue_name, "channel_close", e.to_string())
                })?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "closing")
                .await
                .map_err(|e| MessagingError::connection(format!("RabbitMQ close failed: {e}")))?;
        }

        debug!(
            queue = %queue_name,
            total_published = self.total_published(),
            "🐇 RABBITMQ: Connection closed"
        );
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

/// Acknowledge each delivery at the moment it is pulled, then yield it.
///
/// Nothing is acked ahead of the reader, so unacked deliveries stay within
/// the channel's prefetch window while the batching engine is blocked.
/// Stream errors are logged and skipped. A failed ack is logged and the
/// delivery is still yielded.
fn ack_on_pull<S, E, A, F, AE>(queue_name: String, deliveries: S, ack: A) -> DeliveryStream
where
    S: Stream<Item = Result<Delivery, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    A: Fn(u64) -> F + Send + Sync + 'static,
    F: Future<Output = Result<(), AE>> + Send + 'static,
    AE: std::fmt::Display + Send + 'static,
{
    let ack = Arc::new(ack);
    let stream = deliveries.filter_map(move |item| {
        let queue_name = queue_name.clone();
        let ack = Arc::clone(&ack);
        async move {
            match item {
                Ok(delivery) => {
                    if let Err(e) = (*ack)(delivery.delivery_tag).await {
                        warn!(
                            queue = %queue_name,
                            delivery_tag = delivery.delivery_tag,
                            error = %e,
                            "Failed to acknowledge delivery"
                        );
                    }
                    Some(delivery)
                }
                Err(e) => {
                    error!(queue = %queue_name, error = %e, "❌ RABBITMQ: Delivery error");
                    None
                }
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn delivery(tag: u64) -> Result<Delivery, Infallible> {
        Ok(Delivery {
            delivery_tag: tag,
            payload: format!("payload-{tag}").into_bytes(),
        })
    }

    fn recording_ack(
        acked: Arc<Mutex<Vec<u64>>>,
    ) -> impl Fn(u64) -> futures::future::Ready<Result<(), String>> + Send + Sync + 'static {
        move |tag| {
            acked.lock().push(tag);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_deliveries_are_acked_only_as_they_are_pulled() {
        let acked = Arc::new(Mutex::new(Vec::new()));
        let source = futures::stream::iter((1..=5).map(delivery));
        let mut stream = ack_on_pull("users".to_string(), source, recording_ack(acked.clone()));

        assert!(acked.lock().is_empty());

        let first = stream.next().await.unwrap();
        assert_eq!(first.delivery_tag, 1);
        assert_eq!(*acked.lock(), vec![1]);

        stream.next().await.unwrap();
        assert_eq!(*acked.lock(), vec![1, 2]);

        let rest: Vec<u64> = stream.map(|d| d.delivery_tag).collect().await;
        assert_eq!(rest, vec![3, 4, 5]);
        assert_eq!(*acked.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_failed_ack_still_yields_the_delivery() {
        let source = futures::stream::iter((1..=2).map(delivery));
        let stream = ack_on_pull("users".to_string(), source, |_tag| {
            futures::future::ready(Err::<(), _>("channel closed".to_string()))
        });

        let tags: Vec<u64> = stream.map(|d| d.delivery_tag).collect().await;
        assert_eq!(tags, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stream_errors_are_skipped_without_ack() {
        let acked = Arc::new(Mutex::new(Vec::new()));
        let source = futures::stream::iter(vec![
            Ok(Delivery {
                delivery_tag: 1,
                payload: Vec::new(),
            }),
            Err("frame error".to_string()),
            Ok(Delivery {
                delivery_tag: 3,
                payload: Vec::new(),
            }),
        ]);
        let stream = ack_on_pull("users".to_string(), source, recording_ack(acked.clone()));

        let tags: Vec<u64> = stream.map(|d| d.delivery_tag).collect().await;
        assert_eq!(tags, vec![1, 3]);
        assert_eq!(*acked.lock(), vec![1, 3]);
    }
}

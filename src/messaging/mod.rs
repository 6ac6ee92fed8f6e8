//! # Messaging
//!
//! The durable queue between the producer and the consumer, expressed as the
//! [`MessageQueue`] port with a RabbitMQ adapter for deployments and an
//! in-process adapter for local runs and tests.

pub mod errors;
pub mod providers;
pub mod traits;

pub use errors::MessagingError;
pub use providers::{InMemoryQueue, RabbitMqQueue};
pub use traits::{Delivery, DeliveryStream, MessageQueue};

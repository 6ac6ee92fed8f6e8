mod in_memory;
mod rabbitmq;

pub use in_memory::InMemoryQueue;
pub use rabbitmq::RabbitMqQueue;

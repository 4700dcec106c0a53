pub mod rabbitmq;

use thiserror::Error;

pub use rabbitmq::RabbitMqService;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("RabbitMQ error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker refused message for queue '{0}'")]
    Nacked(String),

    #[error("Failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

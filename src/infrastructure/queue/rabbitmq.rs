use async_trait::async_trait;
use lapin::{
    options::*, publisher_confirm::Confirmation, types::FieldTable, BasicProperties, Channel,
    Connection, ConnectionProperties, Consumer,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::QueueError;
use crate::modules::video::events::{JobPublisher, TranscodeJob};

const CONSUMER_TAG: &str = "transcoder_worker";

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    queue: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str, queue: &str) -> Result<(Connection, Channel), QueueError> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!("✅ Connected to RabbitMQ, queue '{}' declared", queue);
        Ok((conn, channel))
    }

    pub async fn new(url: &str, queue: &str) -> Result<Self, QueueError> {
        let (conn, channel) = Self::connect(url, queue).await?;

        Ok(Self {
            url: url.to_string(),
            queue: queue.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn reconnect(&self) -> Result<(), QueueError> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url, &self.queue).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn publish_internal(&self, payload: &[u8]) -> Result<(), QueueError> {
        let channel = self.channel.lock().await;

        let confirmation = channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;

        check_confirmation(&self.queue, confirmation)
    }

    pub async fn publish_bytes(&self, payload: &[u8]) -> Result<(), QueueError> {
        if let Err(e) = self.publish_internal(payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(payload).await?;
        }

        Ok(())
    }

    /// Consumer on a dedicated channel. `prefetch` caps unacked deliveries,
    /// so the broker never hands this process more than the pool can run.
    pub async fn consumer(&self, prefetch: u16) -> Result<Consumer, QueueError> {
        let channel = self.conn.lock().await.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer)
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.status().connected()
    }

    pub async fn ensure_connected(&self) -> Result<(), QueueError> {
        if !self.is_connected().await {
            self.reconnect().await?;
        }
        Ok(())
    }
}

/// The channel runs in confirm mode, so a nack means the broker did not
/// take responsibility for the message.
fn check_confirmation(queue: &str, confirmation: Confirmation) -> Result<(), QueueError> {
    if confirmation.is_nack() {
        return Err(QueueError::Nacked(queue.to_string()));
    }
    Ok(())
}

#[async_trait]
impl JobPublisher for RabbitMqService {
    async fn publish(&self, job: TranscodeJob) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&job)?;
        self.publish_bytes(&payload).await?;
        info!("📨 Queued transcode job for video {}", job.video_id);
        Ok(())
    }
}

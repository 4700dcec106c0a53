use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::dispatcher::{Disposition, JobHandler, JobOutcome};
use super::single_flight::JobLock;
use crate::infrastructure::queue::{QueueError, RabbitMqService};
use crate::media::MediaCodec;
use crate::modules::video::events::TranscodeJob;
use crate::modules::video::repository::VideoRepository;

pub type TranscodeHandler = JobHandler<dyn VideoRepository, dyn MediaCodec, dyn JobLock>;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Consume the transcode queue forever with `concurrency` workers.
///
/// Prefetch matches the pool size so the broker keeps at most one unacked
/// delivery per worker; everything else stays queued.
pub async fn start_transcoder_worker(
    queue: RabbitMqService,
    handler: Arc<TranscodeHandler>,
    concurrency: usize,
) {
    let concurrency = concurrency.max(1);
    info!("🎥 Starting Transcoder Worker pool ({} workers)...", concurrency);

    let (tx, rx) = async_channel::bounded::<Delivery>(concurrency);
    for worker_id in 0..concurrency {
        tokio::spawn(worker_loop(worker_id, rx.clone(), handler.clone()));
    }

    loop {
        match consume(&queue, &tx, concurrency).await {
            Ok(()) => warn!("RabbitMQ consumer stream ended"),
            Err(e) => error!("❌ RabbitMQ consumer failed: {}", e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
        if let Err(e) = queue.ensure_connected().await {
            error!("❌ RabbitMQ reconnect failed: {}", e);
        }
    }
}

async fn consume(
    queue: &RabbitMqService,
    tx: &async_channel::Sender<Delivery>,
    concurrency: usize,
) -> Result<(), QueueError> {
    let prefetch = u16::try_from(concurrency).unwrap_or(u16::MAX);
    let mut consumer = queue.consumer(prefetch).await?;

    info!("🎥 Transcoder Worker listening on '{}'", queue.queue());

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        if tx.send(delivery).await.is_err() {
            error!("All transcoder workers have stopped");
            break;
        }
    }
    Ok(())
}

async fn worker_loop(
    worker_id: usize,
    rx: async_channel::Receiver<Delivery>,
    handler: Arc<TranscodeHandler>,
) {
    while let Ok(delivery) = rx.recv().await {
        let disposition = match serde_json::from_slice::<TranscodeJob>(&delivery.data) {
            Ok(job) => {
                info!(worker_id, video_id = %job.video_id, "📦 Received transcoding job");
                let result = handler.handle(job.video_id).await;
                match &result {
                    Ok(JobOutcome::Completed(_)) => {
                        info!(worker_id, video_id = %job.video_id, "✅ Job completed")
                    }
                    Ok(outcome) => {
                        info!(worker_id, video_id = %job.video_id, ?outcome, "Job skipped")
                    }
                    Err(e) => {
                        error!(worker_id, video_id = %job.video_id, retryable = e.is_retryable(), "❌ Job failed: {}", e)
                    }
                }
                Disposition::for_result(&result)
            }
            Err(e) => {
                error!(worker_id, "❌ Failed to parse job: {}", e);
                Disposition::Discard
            }
        };

        settle(&delivery, disposition).await;
    }
}

async fn settle(delivery: &Delivery, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
        Disposition::Requeue => {
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                })
                .await
        }
        Disposition::Discard => delivery.reject(BasicRejectOptions { requeue: false }).await,
    };

    if let Err(e) = result {
        error!("Failed to settle message ({:?}): {}", disposition, e);
    }
}

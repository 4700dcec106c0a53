//! Per-delivery handling: lease, run, release, and what to tell the broker.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pipeline::{PipelineError, RunOutcome, RunSummary, TranscodePipeline};
use super::single_flight::{JobLock, Lease, LockError};
use crate::media::MediaCodec;
use crate::modules::video::model::ProcessingStatus;
use crate::modules::video::repository::VideoRepository;

const MAX_LOCK_RETRIES: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(RunSummary),
    /// Nothing to do: the record is already terminal.
    AlreadyTerminal(ProcessingStatus),
    /// Another worker kept the lease through every retry.
    InFlight,
}

/// Broker acknowledgement for a finished delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Nack and put the message back for another attempt.
    Requeue,
    /// Nack without requeue; the message is discarded.
    Discard,
}

impl Disposition {
    pub fn for_result(result: &Result<JobOutcome, PipelineError>) -> Self {
        match result {
            // Redelivered once the holder releases or its lease lapses
            Ok(JobOutcome::InFlight) => Self::Requeue,
            Ok(_) => Self::Ack,
            // Deleted between enqueue and delivery; retrying cannot help
            Err(PipelineError::NotFound(_)) => Self::Ack,
            Err(e) if e.is_retryable() => Self::Requeue,
            Err(_) => Self::Discard,
        }
    }
}

/// How hard a delivery waits for a busy lease, and how often a running job
/// renews its own.
#[derive(Debug, Clone, Copy)]
pub struct LeasePolicy {
    pub retries: u32,
    pub retry_delay: Duration,
    pub refresh_every: Duration,
}

impl LeasePolicy {
    /// Renew three times per TTL so one slow round trip cannot lose the lease.
    pub fn for_ttl(ttl_secs: u64) -> Self {
        Self {
            retries: MAX_LOCK_RETRIES,
            retry_delay: LOCK_RETRY_DELAY,
            refresh_every: Duration::from_secs((ttl_secs / 3).max(1)),
        }
    }
}

pub struct JobHandler<R: ?Sized, C: ?Sized, L: ?Sized> {
    pipeline: TranscodePipeline<R, C>,
    lock: Arc<L>,
    policy: LeasePolicy,
}

impl<R, C, L> JobHandler<R, C, L>
where
    R: VideoRepository + ?Sized,
    C: MediaCodec + ?Sized,
    L: JobLock + ?Sized,
{
    pub fn new(pipeline: TranscodePipeline<R, C>, lock: Arc<L>, policy: LeasePolicy) -> Self {
        Self {
            pipeline,
            lock,
            policy,
        }
    }

    pub async fn handle(&self, video_id: Uuid) -> Result<JobOutcome, PipelineError> {
        let Some(lease) = self.acquire(video_id).await? else {
            info!("🔒 Video {} is still locked by another run, requeueing", video_id);
            return Ok(JobOutcome::InFlight);
        };

        let result = self.run_holding(&lease).await;

        if let Err(e) = self.lock.release(lease).await {
            // The TTL reclaims it eventually
            warn!("Failed to release lock for video {}: {}", video_id, e);
        }

        match result? {
            RunOutcome::Completed(summary) => Ok(JobOutcome::Completed(summary)),
            RunOutcome::AlreadyTerminal(status) => Ok(JobOutcome::AlreadyTerminal(status)),
        }
    }

    async fn acquire(&self, video_id: Uuid) -> Result<Option<Lease>, LockError> {
        if let Some(lease) = self.lock.try_acquire(video_id).await? {
            return Ok(Some(lease));
        }

        for retry in 1..=self.policy.retries {
            debug!(%video_id, retry, "Lease held elsewhere, waiting");
            sleep(self.policy.retry_delay).await;
            if let Some(lease) = self.lock.try_acquire(video_id).await? {
                return Ok(Some(lease));
            }
        }
        Ok(None)
    }

    /// Run the pipeline while renewing `lease` in the background of the same task.
    async fn run_holding(&self, lease: &Lease) -> Result<RunOutcome, PipelineError> {
        let run = self.pipeline.run(lease.video_id);
        tokio::pin!(run);

        let period = self.policy.refresh_every;
        let mut refresh = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = refresh.tick() => match self.lock.extend(lease).await {
                    Ok(true) => {}
                    Ok(false) => warn!("Lease for video {} lapsed mid-run", lease.video_id),
                    Err(e) => warn!("Failed to extend lock for video {}: {}", lease.video_id, e),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::StorageLayout;
    use crate::media::{EncodedFile, Ladder, MockMediaCodec, ProbeError, VideoMetadata};
    use crate::modules::video::events::{MockJobPublisher, TranscodeJob};
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::service::VideoService;
    use crate::workers::single_flight::local::LocalJobLock;
    use crate::workers::single_flight::MockJobLock;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const FAST_RETRY: LeasePolicy = LeasePolicy {
        retries: 2,
        retry_delay: Duration::from_millis(1),
        refresh_every: Duration::from_secs(60),
    };

    fn small_codec(probe_calls: usize) -> MockMediaCodec {
        let mut codec = MockMediaCodec::new();
        codec.expect_probe().times(probe_calls).returning(|_| {
            Ok(VideoMetadata {
                width: 640,
                height: 360,
                fps: 25.0,
                codec: "h264".to_string(),
                bitrate: None,
                duration: Some(10.0),
            })
        });
        codec
            .expect_extract_frame()
            .returning(|_, _, _| Err(crate::media::EncodeError::MissingOutput("thumb".into())));
        codec.expect_encode().returning(|_, params| {
            Ok(EncodedFile {
                path: params.output.clone(),
                size: 10,
            })
        });
        codec
    }

    fn handler<L: JobLock + ?Sized>(
        dir: &TempDir,
        repo: Arc<InMemoryVideoRepository>,
        codec: MockMediaCodec,
        lock: Arc<L>,
    ) -> JobHandler<InMemoryVideoRepository, MockMediaCodec, L> {
        let pipeline = TranscodePipeline::new(
            repo,
            Arc::new(codec),
            Ladder::default(),
            StorageLayout::new(dir.path()),
        );
        JobHandler::new(pipeline, lock, FAST_RETRY)
    }

    #[tokio::test]
    async fn test_runs_and_releases_lease() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = repo.insert(InMemoryVideoRepository::pending_video("/in.mp4"));
        let lock = Arc::new(LocalJobLock::default());

        let outcome = handler(&dir, repo.clone(), small_codec(1), lock.clone())
            .handle(id)
            .await
            .unwrap();

        let JobOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.produced, ["360p"]);
        assert!(!lock.is_held(id).await.unwrap());
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_runs_once() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = repo.insert(InMemoryVideoRepository::pending_video("/in.mp4"));
        let lock = Arc::new(LocalJobLock::default());
        let worker = handler(&dir, repo.clone(), small_codec(1), lock.clone());

        // Another worker is mid-run
        let held = lock.try_acquire(id).await.unwrap().unwrap();
        let busy = worker.handle(id).await;
        assert_eq!(busy.as_ref().unwrap(), &JobOutcome::InFlight);
        assert_eq!(Disposition::for_result(&busy), Disposition::Requeue);
        assert!(repo.history(id).is_empty());
        lock.release(held).await.unwrap();

        assert!(matches!(worker.handle(id).await.unwrap(), JobOutcome::Completed(_)));
        let writes = repo.history(id).len();

        // Late redelivery after completion
        assert_eq!(
            worker.handle(id).await.unwrap(),
            JobOutcome::AlreadyTerminal(ProcessingStatus::Completed)
        );
        assert_eq!(repo.history(id).len(), writes);
    }

    #[tokio::test]
    async fn test_lease_released_after_failure() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = repo.insert(InMemoryVideoRepository::pending_video("/missing.mp4"));
        let lock = Arc::new(LocalJobLock::default());

        let mut codec = MockMediaCodec::new();
        codec
            .expect_probe()
            .returning(|p| Err(ProbeError::FileNotFound(p.to_path_buf())));

        let result = handler(&dir, repo.clone(), codec, lock.clone()).handle(id).await;
        assert!(matches!(result, Err(PipelineError::Probe(_))));
        assert_eq!(Disposition::for_result(&result), Disposition::Discard);
        assert!(!lock.is_held(id).await.unwrap());
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_lock_outage_requeues_without_touching_record() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = repo.insert(InMemoryVideoRepository::pending_video("/in.mp4"));

        let mut lock = MockJobLock::new();
        lock.expect_try_acquire().returning(|_| {
            Err(LockError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        });
        lock.expect_release().times(0);

        let result = handler(&dir, repo.clone(), small_codec(0), Arc::new(lock))
            .handle(id)
            .await;
        assert!(matches!(result, Err(PipelineError::Lock(_))));
        assert_eq!(Disposition::for_result(&result), Disposition::Requeue);
        assert!(repo.history(id).is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_lease_before_giving_up() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = repo.insert(InMemoryVideoRepository::pending_video("/in.mp4"));

        // Busy on the first attempt, free on the first retry
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let mut lock = MockJobLock::new();
        lock.expect_try_acquire().returning(move |video_id| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(Lease::new(video_id)))
            }
        });
        lock.expect_extend().returning(|_| Ok(true));
        lock.expect_release().times(1).returning(|_| Ok(()));

        let outcome = handler(&dir, repo.clone(), small_codec(1), Arc::new(lock))
            .handle(id)
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_crashed_holder_is_requeued_until_lease_lapses() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let mut video = InMemoryVideoRepository::pending_video("/in.mp4");
        video.processing_status = ProcessingStatus::Processing;
        video.processing_progress = 42;
        let id = repo.insert(video);

        // Left behind by a worker that died mid-encode
        let lock = Arc::new(LocalJobLock::default());
        let dead = lock.try_acquire(id).await.unwrap().unwrap();
        let worker = handler(&dir, repo.clone(), small_codec(1), lock.clone());

        let result = worker.handle(id).await;
        assert_eq!(result.as_ref().unwrap(), &JobOutcome::InFlight);
        assert_eq!(Disposition::for_result(&result), Disposition::Requeue);
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Processing);
        assert!(repo.history(id).is_empty());

        // TTL expiry
        lock.release(dead).await.unwrap();

        let result = worker.handle(id).await;
        assert!(matches!(result, Ok(JobOutcome::Completed(_))));
        assert_eq!(Disposition::for_result(&result), Disposition::Ack);
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Completed);
        assert_eq!(repo.get(id).processing_progress, 100);
    }

    #[tokio::test]
    async fn test_reprocess_before_release_is_not_lost() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let mut video = InMemoryVideoRepository::pending_video("/in.mp4");
        video.processing_status = ProcessingStatus::Completed;
        video.processing_progress = 100;
        let id = repo.insert(video);

        // Previous run wrote `completed` but has not released yet
        let lock = Arc::new(LocalJobLock::default());
        let previous = lock.try_acquire(id).await.unwrap().unwrap();

        let mut publisher = MockJobPublisher::new();
        publisher
            .expect_publish()
            .with(eq(TranscodeJob::new(id)))
            .times(1)
            .returning(|_| Ok(()));
        let service = VideoService::new(repo.clone(), Arc::new(publisher), lock.clone());
        service.reprocess(id).await.unwrap();

        let worker = handler(&dir, repo.clone(), small_codec(1), lock.clone());
        let result = worker.handle(id).await;
        assert_eq!(Disposition::for_result(&result), Disposition::Requeue);
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Pending);

        lock.release(previous).await.unwrap();

        // Redelivery of the requeued message
        let result = worker.handle(id).await;
        assert!(matches!(result, Ok(JobOutcome::Completed(_))));
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Completed);
    }

    #[test]
    fn test_disposition_for_missing_video_is_ack() {
        let result = Err(PipelineError::NotFound(Uuid::new_v4()));
        assert_eq!(Disposition::for_result(&result), Disposition::Ack);
    }

    #[test]
    fn test_lease_refresh_tracks_ttl() {
        assert_eq!(LeasePolicy::for_ttl(60).refresh_every, Duration::from_secs(20));
        assert_eq!(LeasePolicy::for_ttl(2).refresh_every, Duration::from_secs(1));
        assert_eq!(LeasePolicy::for_ttl(60).retries, MAX_LOCK_RETRIES);
    }
}

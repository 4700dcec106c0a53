use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{EnqueueResponse, ReprocessFailedResponse, VideoStatusResponse};
use super::events::{JobPublisher, TranscodeJob};
use super::model::ProcessingStatus;
use super::repository::{PersistenceError, VideoRepository};
use crate::infrastructure::queue::QueueError;
use crate::workers::single_flight::{JobLock, LockError};

#[derive(Debug, Error)]
pub enum VideoServiceError {
    #[error("Video {0} not found")]
    NotFound(Uuid),

    #[error("Video {id} is {status}")]
    InvalidState { id: Uuid, status: ProcessingStatus },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Failed to queue job: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to check job lock: {0}")]
    Lock(#[from] LockError),
}

const TERMINAL: [ProcessingStatus; 2] = [ProcessingStatus::Completed, ProcessingStatus::Failed];

pub struct VideoService<R: ?Sized, P: ?Sized, L: ?Sized> {
    repo: Arc<R>,
    publisher: Arc<P>,
    lock: Arc<L>,
}

impl<R, P, L> VideoService<R, P, L>
where
    R: VideoRepository + ?Sized,
    P: JobPublisher + ?Sized,
    L: JobLock + ?Sized,
{
    pub fn new(repo: Arc<R>, publisher: Arc<P>, lock: Arc<L>) -> Self {
        Self {
            repo,
            publisher,
            lock,
        }
    }

    pub async fn status(&self, id: Uuid) -> Result<VideoStatusResponse, VideoServiceError> {
        let video = self
            .repo
            .find_video(id)
            .await?
            .ok_or(VideoServiceError::NotFound(id))?;
        let variants = self.repo.list_variants(id).await?;

        Ok(VideoStatusResponse::new(video, variants))
    }

    /// Queue the first run for a freshly uploaded video.
    pub async fn enqueue(&self, id: Uuid) -> Result<EnqueueResponse, VideoServiceError> {
        let video = self
            .repo
            .find_video(id)
            .await?
            .ok_or(VideoServiceError::NotFound(id))?;

        if video.processing_status != ProcessingStatus::Pending {
            return Err(VideoServiceError::InvalidState {
                id,
                status: video.processing_status,
            });
        }

        self.publisher.publish(TranscodeJob::new(id)).await?;

        Ok(EnqueueResponse {
            video_id: id,
            processing_status: ProcessingStatus::Pending,
        })
    }

    /// Send a finished video back through the pipeline.
    ///
    /// A `processing` record whose lease is gone was orphaned by a dead
    /// worker and is reset as well.
    pub async fn reprocess(&self, id: Uuid) -> Result<EnqueueResponse, VideoServiceError> {
        let video = self
            .repo
            .find_video(id)
            .await?
            .ok_or(VideoServiceError::NotFound(id))?;

        let mut from = TERMINAL.to_vec();
        if video.processing_status == ProcessingStatus::Processing
            && !self.lock.is_held(id).await?
        {
            warn!("Video {} is processing with no live lease, resetting", id);
            from.push(ProcessingStatus::Processing);
        }

        if !self.repo.reset_for_reprocess(id, &from).await? {
            return Err(VideoServiceError::InvalidState {
                id,
                status: video.processing_status,
            });
        }

        self.publisher.publish(TranscodeJob::new(id)).await?;
        info!("🔁 Video {} reset for reprocessing", id);

        Ok(EnqueueResponse {
            video_id: id,
            processing_status: ProcessingStatus::Pending,
        })
    }

    /// Retry every failed video whose source file is still on disk.
    pub async fn reprocess_failed(&self) -> Result<ReprocessFailedResponse, VideoServiceError> {
        let failed = self.repo.list_failed().await?;
        let mut video_ids = Vec::new();

        for video in failed {
            if !tokio::fs::try_exists(&video.file_path).await.unwrap_or(false) {
                warn!(
                    "Not reprocessing video {}: source {} is gone",
                    video.id, video.file_path
                );
                continue;
            }

            if !self
                .repo
                .reset_for_reprocess(video.id, &[ProcessingStatus::Failed])
                .await?
            {
                continue;
            }

            // Left pending on publish failure; `process` can queue it again
            if let Err(e) = self.publisher.publish(TranscodeJob::new(video.id)).await {
                warn!("Failed to queue reprocess for video {}: {}", video.id, e);
                continue;
            }
            video_ids.push(video.id);
        }

        info!("🔁 Reprocessing {} failed video(s)", video_ids.len());
        Ok(ReprocessFailedResponse {
            count: video_ids.len(),
            video_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::events::MockJobPublisher;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::ResolutionVariant;
    use crate::modules::video::repository::MockVideoRepository;
    use crate::workers::single_flight::local::LocalJobLock;
    use mockall::predicate::eq;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn no_leases() -> Arc<LocalJobLock> {
        Arc::new(LocalJobLock::default())
    }

    fn with_status(repo: &InMemoryVideoRepository, path: &str, status: ProcessingStatus) -> Uuid {
        let mut video = InMemoryVideoRepository::pending_video(path);
        video.processing_status = status;
        if status.is_terminal() {
            video.processing_progress = 100;
            video.error_message = Some("boom".to_string());
            video.processed_at = Some(OffsetDateTime::now_utc());
        }
        repo.insert(video)
    }

    fn expect_jobs(ids: &[Uuid]) -> MockJobPublisher {
        let mut publisher = MockJobPublisher::new();
        for id in ids {
            publisher
                .expect_publish()
                .with(eq(TranscodeJob::new(*id)))
                .times(1)
                .returning(|_| Ok(()));
        }
        publisher
    }

    #[tokio::test]
    async fn test_status_includes_variant_locators() {
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = with_status(&repo, "/in.mp4", ProcessingStatus::Completed);
        let mut video = repo.get(id);
        video.thumbnail_path = Some("/up/thumbnails/a.jpg".to_string());
        video.error_message = None;
        repo.insert(video);
        repo.insert_variant(
            id,
            &ResolutionVariant {
                resolution: "720p".to_string(),
                file_path: "/up/processed/a_720p.mp4".to_string(),
                file_size: 1024,
                bitrate: 2_500_000,
                width: 1280,
                height: 720,
            },
        )
        .await
        .unwrap();

        let service = VideoService::new(repo, Arc::new(MockJobPublisher::new()), no_leases());
        let status = service.status(id).await.unwrap();

        assert_eq!(status.processing_status, ProcessingStatus::Completed);
        assert_eq!(status.thumbnail_url, Some(format!("/api/videos/{}/thumbnail", id)));
        assert_eq!(status.resolutions.len(), 1);
        assert_eq!(
            status.resolutions[0].stream_url,
            format!("/api/videos/{}/stream/720p", id)
        );
        assert_eq!(
            status.resolutions[0].download_url,
            format!("/api/videos/{}/download/720p", id)
        );
    }

    #[tokio::test]
    async fn test_status_of_unknown_video() {
        let mut repo = MockVideoRepository::new();
        repo.expect_find_video().returning(|_| Ok(None));

        let service = VideoService::new(
            Arc::new(repo),
            Arc::new(MockJobPublisher::new()),
            no_leases(),
        );
        let err = service.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, VideoServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_enqueue_only_pending() {
        let repo = Arc::new(InMemoryVideoRepository::new());
        let pending = with_status(&repo, "/a.mp4", ProcessingStatus::Pending);
        let running = with_status(&repo, "/b.mp4", ProcessingStatus::Processing);

        let service = VideoService::new(repo, Arc::new(expect_jobs(&[pending])), no_leases());
        service.enqueue(pending).await.unwrap();

        let err = service.enqueue(running).await.unwrap_err();
        assert!(matches!(
            err,
            VideoServiceError::InvalidState {
                status: ProcessingStatus::Processing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reprocess_resets_terminal_video() {
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = with_status(&repo, "/a.mp4", ProcessingStatus::Failed);

        let service = VideoService::new(repo.clone(), Arc::new(expect_jobs(&[id])), no_leases());
        let resp = service.reprocess(id).await.unwrap();
        assert_eq!(resp.processing_status, ProcessingStatus::Pending);

        let video = repo.get(id);
        assert_eq!(video.processing_status, ProcessingStatus::Pending);
        assert_eq!(video.processing_progress, 0);
        assert!(video.error_message.is_none());
        assert!(video.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_reprocess_refuses_in_flight_video() {
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = with_status(&repo, "/a.mp4", ProcessingStatus::Processing);
        let pending = with_status(&repo, "/b.mp4", ProcessingStatus::Pending);
        let lock = no_leases();
        let _running = lock.try_acquire(id).await.unwrap().unwrap();

        let mut publisher = MockJobPublisher::new();
        publisher.expect_publish().times(0);

        let service = VideoService::new(repo.clone(), Arc::new(publisher), lock);
        let err = service.reprocess(id).await.unwrap_err();
        assert!(matches!(err, VideoServiceError::InvalidState { .. }));
        assert_eq!(repo.get(id).processing_status, ProcessingStatus::Processing);

        let err = service.reprocess(pending).await.unwrap_err();
        assert!(matches!(
            err,
            VideoServiceError::InvalidState {
                status: ProcessingStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reprocess_recovers_processing_video_without_lease() {
        let repo = Arc::new(InMemoryVideoRepository::new());
        let id = with_status(&repo, "/a.mp4", ProcessingStatus::Processing);
        let mut video = repo.get(id);
        video.processing_progress = 54;
        repo.insert(video);

        let service = VideoService::new(repo.clone(), Arc::new(expect_jobs(&[id])), no_leases());
        let resp = service.reprocess(id).await.unwrap();
        assert_eq!(resp.processing_status, ProcessingStatus::Pending);

        let video = repo.get(id);
        assert_eq!(video.processing_status, ProcessingStatus::Pending);
        assert_eq!(video.processing_progress, 0);
    }

    #[tokio::test]
    async fn test_reprocess_failed_skips_missing_sources() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.mp4");
        std::fs::write(&present, b"data").unwrap();
        let missing = dir.path().join("missing.mp4");

        let repo = Arc::new(InMemoryVideoRepository::new());
        let retry = with_status(&repo, present.to_str().unwrap(), ProcessingStatus::Failed);
        let gone = with_status(&repo, missing.to_str().unwrap(), ProcessingStatus::Failed);
        let done = with_status(&repo, present.to_str().unwrap(), ProcessingStatus::Completed);

        let service = VideoService::new(repo.clone(), Arc::new(expect_jobs(&[retry])), no_leases());
        let resp = service.reprocess_failed().await.unwrap();

        assert_eq!(resp.count, 1);
        assert_eq!(resp.video_ids, [retry]);
        assert_eq!(repo.get(retry).processing_status, ProcessingStatus::Pending);
        assert_eq!(repo.get(gone).processing_status, ProcessingStatus::Failed);
        assert_eq!(repo.get(done).processing_status, ProcessingStatus::Completed);
    }
}

//! In-memory [`VideoRepository`] for tests. Keeps every status write so runs
//! can be checked step by step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{ProcessingStatus, ResolutionVariant, StatusUpdate, VideoJob};
use super::repository::{PersistenceError, VideoRepository};
use crate::media::VideoMetadata;

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: Mutex<HashMap<Uuid, VideoJob>>,
    variants: Mutex<HashMap<Uuid, Vec<ResolutionVariant>>>,
    history: Mutex<Vec<(Uuid, StatusUpdate)>>,
    fail_status_writes: Mutex<bool>,
    fail_variant_writes: Mutex<bool>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_video(file_path: &str) -> VideoJob {
        VideoJob {
            id: Uuid::new_v4(),
            filename: "0123abcd.mov".to_string(),
            original_filename: "holiday.mov".to_string(),
            file_path: file_path.to_string(),
            processing_status: ProcessingStatus::Pending,
            processing_progress: 0,
            error_message: None,
            width: None,
            height: None,
            fps: None,
            bitrate: None,
            codec: None,
            duration: None,
            thumbnail_path: None,
            uploaded_at: OffsetDateTime::now_utc(),
            processed_at: None,
        }
    }

    pub fn insert(&self, video: VideoJob) -> Uuid {
        let id = video.id;
        self.videos.lock().unwrap().insert(id, video);
        id
    }

    pub fn get(&self, id: Uuid) -> VideoJob {
        self.videos.lock().unwrap()[&id].clone()
    }

    pub fn variants(&self, id: Uuid) -> Vec<ResolutionVariant> {
        self.variants.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn history(&self, id: Uuid) -> Vec<StatusUpdate> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(vid, _)| *vid == id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub fn fail_status_writes(&self) {
        *self.fail_status_writes.lock().unwrap() = true;
    }

    pub fn fail_variant_writes(&self) {
        *self.fail_variant_writes.lock().unwrap() = true;
    }

    fn with_video<T>(&self, id: Uuid, f: impl FnOnce(&mut VideoJob) -> T) -> Option<T> {
        self.videos.lock().unwrap().get_mut(&id).map(f)
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoJob>, PersistenceError> {
        Ok(self.videos.lock().unwrap().get(&id).cloned())
    }

    async fn record_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), PersistenceError> {
        if *self.fail_status_writes.lock().unwrap() {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        self.history.lock().unwrap().push((id, update.clone()));
        self.with_video(id, |v| {
            v.processing_status = update.status;
            v.processing_progress = update.progress;
            v.error_message = update.error_message.clone();
            if update.status == ProcessingStatus::Completed {
                v.processed_at = Some(OffsetDateTime::now_utc());
            }
        });
        Ok(())
    }

    async fn save_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), PersistenceError> {
        self.with_video(id, |v| {
            v.width = Some(metadata.width);
            v.height = Some(metadata.height);
            v.fps = Some(metadata.fps);
            v.bitrate = metadata.bitrate;
            v.codec = Some(metadata.codec.clone());
            v.duration = metadata.duration;
        });
        Ok(())
    }

    async fn set_thumbnail(&self, id: Uuid, path: &str) -> Result<(), PersistenceError> {
        self.with_video(id, |v| v.thumbnail_path = Some(path.to_string()));
        Ok(())
    }

    async fn reset_outputs(&self, id: Uuid) -> Result<(), PersistenceError> {
        self.variants.lock().unwrap().remove(&id);
        self.with_video(id, |v| v.thumbnail_path = None);
        Ok(())
    }

    async fn insert_variant(
        &self,
        id: Uuid,
        variant: &ResolutionVariant,
    ) -> Result<(), PersistenceError> {
        if *self.fail_variant_writes.lock().unwrap() {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        self.variants
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push(variant.clone());
        Ok(())
    }

    async fn list_variants(&self, id: Uuid) -> Result<Vec<ResolutionVariant>, PersistenceError> {
        Ok(self.variants(id))
    }

    async fn reset_for_reprocess(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
    ) -> Result<bool, PersistenceError> {
        Ok(self
            .with_video(id, |v| {
                if !from.contains(&v.processing_status) {
                    return false;
                }
                v.processing_status = ProcessingStatus::Pending;
                v.processing_progress = 0;
                v.error_message = None;
                v.processed_at = None;
                true
            })
            .unwrap_or(false))
    }

    async fn list_failed(&self) -> Result<Vec<VideoJob>, PersistenceError> {
        let mut failed: Vec<_> = self
            .videos
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.processing_status == ProcessingStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by_key(|v| v.uploaded_at);
        Ok(failed)
    }
}

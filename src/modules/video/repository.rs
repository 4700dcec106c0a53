use async_trait::async_trait;
use sqlx::PgPool;
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

use super::model::{
    ProcessingStatus, ResolutionVariant, StatusUpdate, VariantRow, VideoJob, VideoRow,
};
use crate::media::VideoMetadata;

/// Status writes are not retried; any of these is fatal for the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

impl PersistenceError {
    pub fn corrupt(column: &'static str, value: impl Display) -> Self {
        Self::Corrupt {
            column,
            value: value.to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoJob>, PersistenceError>;

    /// Persist status, progress and error in one write. Stamps `processed_at`
    /// when the status is `completed`.
    async fn record_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), PersistenceError>;

    async fn save_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), PersistenceError>;

    async fn set_thumbnail(&self, id: Uuid, path: &str) -> Result<(), PersistenceError>;

    /// Drop the variants and thumbnail left by an earlier run.
    async fn reset_outputs(&self, id: Uuid) -> Result<(), PersistenceError>;

    async fn insert_variant(
        &self,
        id: Uuid,
        variant: &ResolutionVariant,
    ) -> Result<(), PersistenceError>;

    async fn list_variants(&self, id: Uuid) -> Result<Vec<ResolutionVariant>, PersistenceError>;

    /// Back to `pending` with progress, error and `processed_at` cleared, but
    /// only from one of the `from` states. Returns `false` when the video is
    /// missing or in any other state.
    async fn reset_for_reprocess(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
    ) -> Result<bool, PersistenceError>;

    async fn list_failed(&self) -> Result<Vec<VideoJob>, PersistenceError>;
}

const VIDEO_COLUMNS: &str = r#"
    id, filename, original_filename, file_path,
    processing_status, processing_progress, error_message,
    width, height, fps, bitrate, codec, duration,
    thumbnail_path, uploaded_at, processed_at
"#;

#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoJob>, PersistenceError> {
        let row = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {} FROM videos WHERE id = $1",
            VIDEO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VideoJob::try_from).transpose()
    }

    async fn record_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            UPDATE videos
            SET processing_status = $1,
                processing_progress = $2,
                error_message = $3,
                processed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE processed_at END
            WHERE id = $4
            "#,
        )
        .bind(update.status.as_str())
        .bind(i32::from(update.progress))
        .bind(update.error_message.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            UPDATE videos
            SET width = $1, height = $2, fps = $3, bitrate = $4, codec = $5, duration = $6
            WHERE id = $7
            "#,
        )
        .bind(i32::try_from(metadata.width).unwrap_or(i32::MAX))
        .bind(i32::try_from(metadata.height).unwrap_or(i32::MAX))
        .bind(metadata.fps)
        .bind(metadata.bitrate.and_then(|b| i64::try_from(b).ok()))
        .bind(&metadata.codec)
        .bind(metadata.duration)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_thumbnail(&self, id: Uuid, path: &str) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE videos SET thumbnail_path = $1 WHERE id = $2")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_outputs(&self, id: Uuid) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM video_resolutions WHERE video_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE videos SET thumbnail_path = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_variant(
        &self,
        id: Uuid,
        variant: &ResolutionVariant,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO video_resolutions (video_id, resolution, file_path, file_size, bitrate, width, height)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&variant.resolution)
        .bind(&variant.file_path)
        .bind(i64::try_from(variant.file_size).unwrap_or(i64::MAX))
        .bind(i64::try_from(variant.bitrate).unwrap_or(i64::MAX))
        .bind(i32::try_from(variant.width).unwrap_or(i32::MAX))
        .bind(i32::try_from(variant.height).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_variants(&self, id: Uuid) -> Result<Vec<ResolutionVariant>, PersistenceError> {
        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT resolution, file_path, file_size, bitrate, width, height
            FROM video_resolutions
            WHERE video_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResolutionVariant::from).collect())
    }

    async fn reset_for_reprocess(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
    ) -> Result<bool, PersistenceError> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET processing_status = $1, processing_progress = 0,
                error_message = NULL, processed_at = NULL
            WHERE id = $2 AND processing_status = ANY($3)
            "#,
        )
        .bind(ProcessingStatus::Pending.as_str())
        .bind(id)
        .bind(&from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_failed(&self) -> Result<Vec<VideoJob>, PersistenceError> {
        let rows = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {} FROM videos WHERE processing_status = $1 ORDER BY uploaded_at ASC",
            VIDEO_COLUMNS
        ))
        .bind(ProcessingStatus::Failed.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VideoJob::try_from).collect()
    }
}

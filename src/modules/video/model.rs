use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use super::repository::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Terminal states are only left through an explicit reprocess.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(PersistenceError::corrupt("processing_status", other)),
        }
    }
}

/// The record a transcode run drives.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    pub id: Uuid,
    /// Stored name under `videos/`
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub processing_status: ProcessingStatus,
    pub processing_progress: u8,
    pub error_message: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub bitrate: Option<u64>,
    pub codec: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub uploaded_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

#[derive(Debug, FromRow)]
pub struct VideoRow {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub processing_status: String,
    pub processing_progress: i32,
    pub error_message: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub bitrate: Option<i64>,
    pub codec: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub uploaded_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

impl TryFrom<VideoRow> for VideoJob {
    type Error = PersistenceError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let progress = u8::try_from(row.processing_progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                PersistenceError::corrupt("processing_progress", row.processing_progress)
            })?;

        Ok(Self {
            id: row.id,
            filename: row.filename,
            original_filename: row.original_filename,
            file_path: row.file_path,
            processing_status: row.processing_status.parse()?,
            processing_progress: progress,
            error_message: row.error_message,
            width: row.width.and_then(|v| u32::try_from(v).ok()),
            height: row.height.and_then(|v| u32::try_from(v).ok()),
            fps: row.fps,
            bitrate: row.bitrate.and_then(|v| u64::try_from(v).ok()),
            codec: row.codec,
            duration: row.duration,
            thumbnail_path: row.thumbnail_path,
            uploaded_at: row.uploaded_at,
            processed_at: row.processed_at,
        })
    }
}

/// One produced ladder rung. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionVariant {
    /// Rung name, e.g. `720p`
    pub resolution: String,
    pub file_path: String,
    pub file_size: u64,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, FromRow)]
pub struct VariantRow {
    pub resolution: String,
    pub file_path: String,
    pub file_size: i64,
    pub bitrate: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl From<VariantRow> for ResolutionVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            resolution: row.resolution,
            file_path: row.file_path,
            file_size: u64::try_from(row.file_size).unwrap_or_default(),
            bitrate: row.bitrate.and_then(|v| u64::try_from(v).ok()).unwrap_or_default(),
            width: row.width.and_then(|v| u32::try_from(v).ok()).unwrap_or_default(),
            height: row.height.and_then(|v| u32::try_from(v).ok()).unwrap_or_default(),
        }
    }
}

/// A single Progress Reporter write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ProcessingStatus,
    pub progress: u8,
    /// Written verbatim; `None` clears any previous message
    pub error_message: Option<String>,
}

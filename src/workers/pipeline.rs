//! Transcoding orchestrator: probe, thumbnail, resolution ladder.
//!
//! Metadata extraction is critical and ends the run on failure. The
//! thumbnail and each ladder rung are not: their failures are logged and
//! the run carries on. Every stage reports through [`ProgressReporter`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::progress::{ladder_progress, ProgressReporter, COMPLETE, METADATA_DONE, THUMBNAIL_DONE};
use super::single_flight::LockError;
use crate::infrastructure::storage::StorageLayout;
use crate::media::ladder::scale_for_rung;
use crate::media::thumbnail::{fit_thumbnail_blocking, seek_time};
use crate::media::{
    Dimensions, EncodeError, EncodeParams, Ladder, LadderRung, MediaCodec, ProbeError, VideoMetadata,
};
use crate::modules::video::model::{ProcessingStatus, ResolutionVariant, VideoJob};
use crate::modules::video::repository::{PersistenceError, VideoRepository};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Video {0} not found")]
    NotFound(Uuid),

    #[error("Failed to extract metadata: {0}")]
    Probe(#[from] ProbeError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

impl PipelineError {
    /// Infrastructure hiccups are worth another delivery. A bad source file
    /// will fail the same way next time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Lock(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Record already finished; a late redelivery or a reprocess that lost the race.
    AlreadyTerminal(ProcessingStatus),
}

/// Rung names by how each one ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub thumbnail: Option<PathBuf>,
    pub produced: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

enum RungOutcome {
    Produced(ResolutionVariant),
    /// Rung is taller than the source.
    Skipped,
    Failed(EncodeError),
}

pub struct TranscodePipeline<R: ?Sized, C: ?Sized> {
    repo: Arc<R>,
    codec: Arc<C>,
    ladder: Ladder,
    layout: StorageLayout,
}

impl<R, C> TranscodePipeline<R, C>
where
    R: VideoRepository + ?Sized,
    C: MediaCodec + ?Sized,
{
    pub fn new(repo: Arc<R>, codec: Arc<C>, ladder: Ladder, layout: StorageLayout) -> Self {
        Self {
            repo,
            codec,
            ladder,
            layout,
        }
    }

    /// Process one video to a terminal state. The caller must hold the
    /// video's lease.
    ///
    /// A missing record returns [`PipelineError::NotFound`] without writing
    /// anything. Any other error has already been recorded on the video as
    /// `failed` (best effort) by the time it is returned.
    pub async fn run(&self, video_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let video = self
            .repo
            .find_video(video_id)
            .await?
            .ok_or(PipelineError::NotFound(video_id))?;

        if video.processing_status.is_terminal() {
            info!(
                "⏭️ Video {} is already {}, nothing to do",
                video_id, video.processing_status
            );
            return Ok(RunOutcome::AlreadyTerminal(video.processing_status));
        }

        info!("🎬 Processing video {} ({})", video_id, video.original_filename);

        let mut reporter = ProgressReporter::new(self.repo.as_ref(), video_id);
        let mut metadata_saved = false;

        match self.execute(&video, &mut reporter, &mut metadata_saved).await {
            Ok(summary) => {
                info!(
                    "✅ Video {} completed: {} variant(s), {} skipped, {} failed",
                    video_id,
                    summary.produced.len(),
                    summary.skipped.len(),
                    summary.failed.len()
                );
                Ok(RunOutcome::Completed(summary))
            }
            Err(err) => {
                error!("❌ Processing failed for video {}: {}", video_id, err);
                let progress = if metadata_saved { COMPLETE } else { reporter.current() };
                if let Err(write_err) = reporter.fail(&err.to_string(), progress).await {
                    error!("Could not mark video {} as failed: {}", video_id, write_err);
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        video: &VideoJob,
        reporter: &mut ProgressReporter<'_, R>,
        metadata_saved: &mut bool,
    ) -> Result<RunSummary, PipelineError> {
        reporter.start().await?;
        self.clear_previous_outputs(video).await?;

        let source = Path::new(&video.file_path);

        let metadata = self.codec.probe(source).await?;
        debug!(
            "Video {} is {}x{} {} @ {:.3} fps",
            video.id, metadata.width, metadata.height, metadata.codec, metadata.fps
        );
        self.repo.save_metadata(video.id, &metadata).await?;
        *metadata_saved = true;
        reporter.advance(METADATA_DONE).await?;

        let mut summary = RunSummary::default();

        match self.generate_thumbnail(source, &metadata).await {
            Ok(path) => {
                self.repo
                    .set_thumbnail(video.id, &path.to_string_lossy())
                    .await?;
                summary.thumbnail = Some(path);
            }
            Err(e) => warn!("⚠️ Thumbnail generation failed for video {}: {}", video.id, e),
        }
        reporter.advance(THUMBNAIL_DONE).await?;

        tokio::fs::create_dir_all(self.layout.processed_dir())
            .await
            .map_err(EncodeError::from)?;

        let rung_count = self.ladder.len();
        for (index, rung) in self.ladder.rungs().iter().enumerate() {
            match self.encode_rung(video, source, &metadata, rung).await {
                RungOutcome::Produced(variant) => {
                    self.repo.insert_variant(video.id, &variant).await?;
                    info!(
                        "📼 Video {} {} ready ({}x{}, {} bytes)",
                        video.id, rung.name, variant.width, variant.height, variant.file_size
                    );
                    summary.produced.push(rung.name.clone());
                }
                RungOutcome::Skipped => {
                    debug!(
                        "Skipping {} for video {}: source is only {}p",
                        rung.name, video.id, metadata.height
                    );
                    summary.skipped.push(rung.name.clone());
                }
                RungOutcome::Failed(e) => {
                    warn!("⚠️ Failed to encode {} for video {}: {}", rung.name, video.id, e);
                    summary.failed.push(rung.name.clone());
                }
            }
            reporter.advance(ladder_progress(index, rung_count)).await?;
        }

        reporter.complete().await?;
        Ok(summary)
    }

    /// A rerun starts from a clean slate: earlier variants and the old
    /// thumbnail go before anything new is written.
    async fn clear_previous_outputs(&self, video: &VideoJob) -> Result<(), PipelineError> {
        if let Some(old) = &video.thumbnail_path {
            if let Err(e) = tokio::fs::remove_file(old).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove old thumbnail {}: {}", old, e);
                }
            }
        }
        self.repo.reset_outputs(video.id).await?;
        Ok(())
    }

    async fn generate_thumbnail(
        &self,
        source: &Path,
        metadata: &VideoMetadata,
    ) -> Result<PathBuf, EncodeError> {
        let path = self.layout.new_thumbnail_path();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        if let Err(e) = self
            .codec
            .extract_frame(source, seek_time(metadata.duration), &path)
            .await
        {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        // The raw frame is still a usable preview if resizing fails.
        if let Err(e) = fit_thumbnail_blocking(path.clone()).await {
            warn!("Keeping unresized thumbnail {}: {}", path.display(), e);
        }

        Ok(path)
    }

    async fn encode_rung(
        &self,
        video: &VideoJob,
        source: &Path,
        metadata: &VideoMetadata,
        rung: &LadderRung,
    ) -> RungOutcome {
        let source_dims = Dimensions {
            width: metadata.width,
            height: metadata.height,
        };
        let Some(dimensions) = scale_for_rung(source_dims, rung.height) else {
            return RungOutcome::Skipped;
        };

        let output = self.layout.variant_path(&video.filename, &rung.name);
        let params = EncodeParams::for_rung(rung, dimensions, output);
        match self.codec.encode(source, &params).await {
            Ok(encoded) => RungOutcome::Produced(ResolutionVariant {
                resolution: rung.name.clone(),
                file_path: encoded.path.to_string_lossy().into_owned(),
                file_size: encoded.size,
                bitrate: rung.bitrate.bits_per_second(),
                width: dimensions.width,
                height: dimensions.height,
            }),
            Err(e) => RungOutcome::Failed(e),
        }
    }
}

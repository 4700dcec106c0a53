//! Codec capability: probing, frame extraction and ladder encodes.
//!
//! The pipeline only sees [`MediaCodec`]; [`ffmpeg::FfmpegCodec`] is the
//! production implementation that shells out to the ffmpeg tools.

pub mod error;
pub mod ffmpeg;
pub mod ladder;
pub mod probe;
pub mod thumbnail;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use error::{EncodeError, ProbeError};
pub use ladder::{Dimensions, Ladder, LadderRung};
pub use probe::VideoMetadata;

pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "128k";
pub const PRESET: &str = "medium";
pub const CRF: u8 = 23;

/// Everything the encoder needs for one ladder rung.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub output: PathBuf,
    pub dimensions: Dimensions,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub preset: String,
    pub crf: u8,
    /// Move the moov atom up front so playback can start before download ends
    pub fast_start: bool,
}

impl EncodeParams {
    pub fn for_rung(rung: &LadderRung, dimensions: Dimensions, output: PathBuf) -> Self {
        Self {
            output,
            dimensions,
            video_codec: VIDEO_CODEC.to_string(),
            audio_codec: AUDIO_CODEC.to_string(),
            video_bitrate: rung.bitrate.as_str().to_string(),
            audio_bitrate: AUDIO_BITRATE.to_string(),
            preset: PRESET.to_string(),
            crf: CRF,
            fast_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub size: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaCodec: Send + Sync {
    /// Read stream metadata from a source file.
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, ProbeError>;

    /// Write the frame at `seek_secs` to `output` as a still image.
    async fn extract_frame(
        &self,
        source: &Path,
        seek_secs: f64,
        output: &Path,
    ) -> Result<(), EncodeError>;

    /// Re-encode `source` per `params`. Blocks until the encode finishes.
    async fn encode(&self, source: &Path, params: &EncodeParams) -> Result<EncodedFile, EncodeError>;
}

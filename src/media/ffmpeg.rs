use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::error::{EncodeError, ProbeError};
use super::probe::{parse_probe_output, VideoMetadata};
use super::{EncodeParams, EncodedFile, MediaCodec};

/// [`MediaCodec`] backed by the `ffmpeg` / `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCodec {
    /// Resolve both tools on `PATH` (or accept absolute paths as-is).
    pub fn locate(ffmpeg: &str, ffprobe: &str) -> Result<Self, which::Error> {
        Ok(Self {
            ffmpeg: which::which(ffmpeg)?,
            ffprobe: which::which(ffprobe)?,
        })
    }
}

#[async_trait]
impl MediaCodec for FfmpegCodec {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, ProbeError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(ProbeError::FileNotFound(source.to_path_buf()));
        }

        let output = Command::new(&self.ffprobe)
            .args(metadata_args(source))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::failed(output.status.code(), &output.stderr));
        }

        parse_probe_output(&output.stdout)
    }

    async fn extract_frame(
        &self,
        source: &Path,
        seek_secs: f64,
        output: &Path,
    ) -> Result<(), EncodeError> {
        let args = frame_args(source, seek_secs, output);
        run_ffmpeg(&self.ffmpeg, &args).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(EncodeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }

    async fn encode(&self, source: &Path, params: &EncodeParams) -> Result<EncodedFile, EncodeError> {
        let dims = params.dimensions;
        if dims.width < 2 || dims.height < 2 {
            return Err(EncodeError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            });
        }

        let args = encode_args(source, params);
        run_ffmpeg(&self.ffmpeg, &args).await?;

        let size = match tokio::fs::metadata(&params.output).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(EncodeError::MissingOutput(params.output.clone())),
        };

        Ok(EncodedFile {
            path: params.output.clone(),
            size,
        })
    }
}

async fn run_ffmpeg(ffmpeg: &Path, args: &[OsString]) -> Result<(), EncodeError> {
    debug!("Running {} {:?}", ffmpeg.display(), args);

    let output = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(EncodeError::failed(output.status.code(), &output.stderr));
    }
    Ok(())
}

/// JSON on stdout; only real errors reach stderr, which ends up in `error_message`.
fn metadata_args(source: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(source.into());
    args
}

fn frame_args(source: &Path, seek_secs: f64, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format!("{:.3}", seek_secs).into());
    args.push("-i".into());
    args.push(source.into());
    for arg in ["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg"] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

fn encode_args(source: &Path, params: &EncodeParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        source.into(),
        "-c:v".into(),
        params.video_codec.clone().into(),
        "-c:a".into(),
        params.audio_codec.clone().into(),
        "-b:v".into(),
        params.video_bitrate.clone().into(),
        "-b:a".into(),
        params.audio_bitrate.clone().into(),
        "-vf".into(),
        format!("scale={}:{}", params.dimensions.width, params.dimensions.height).into(),
        "-preset".into(),
        params.preset.clone().into(),
        "-crf".into(),
        params.crf.to_string().into(),
    ];
    if params.fast_start {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
    args.push(params.output.clone().into());
    args
}

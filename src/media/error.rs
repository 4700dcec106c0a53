use std::path::PathBuf;
use thiserror::Error;

/// Metadata extraction failures. Always fatal for the job.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Source file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Video stream has no usable dimensions")]
    MissingDimensions,

    #[error("Invalid frame rate '{0}'")]
    InvalidFrameRate(String),
}

/// Frame extraction and re-encode failures.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error during encode: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg reported success but produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Cannot encode to {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EncodeError {
    pub fn failed(exit_code: Option<i32>, stderr: &[u8]) -> Self {
        Self::Failed {
            exit_code,
            stderr: tail(stderr),
        }
    }
}

impl ProbeError {
    pub fn failed(exit_code: Option<i32>, stderr: &[u8]) -> Self {
        Self::Failed {
            exit_code,
            stderr: tail(stderr),
        }
    }
}

// ffmpeg stderr runs to megabytes on long encodes; keep what fits on the record.
const STDERR_TAIL: usize = 2048;

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_is_truncated_to_tail() {
        let mut stderr = vec![b'x'; 10_000];
        stderr.extend_from_slice(b"Conversion failed!");
        let EncodeError::Failed { stderr, .. } = EncodeError::failed(Some(1), &stderr) else {
            panic!("expected Failed");
        };
        assert_eq!(stderr.len(), STDERR_TAIL);
        assert!(stderr.ends_with("Conversion failed!"));
    }

    #[test]
    fn test_short_stderr_kept_whole() {
        let err = ProbeError::failed(Some(1), b"  moov atom not found\n");
        assert_eq!(err.to_string(), "ffprobe exited with Some(1): moov atom not found");
    }
}

//! FFprobe output parsing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::ProbeError;

/// Technical metadata for a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Bits per second; stream-level when reported, otherwise container-level
    pub bitrate: Option<u64>,
    /// Seconds, from the container
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
}

/// Frame rate as ffprobe reports it, `num/den`, kept reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u64,
    pub denominator: u64,
}

impl FrameRate {
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl FromStr for FrameRate {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProbeError::InvalidFrameRate(s.to_string());

        let (numerator, denominator) = match s.trim().split_once('/') {
            Some((num, den)) => (
                num.trim().parse::<u64>().map_err(|_| invalid())?,
                den.trim().parse::<u64>().map_err(|_| invalid())?,
            ),
            None => (s.trim().parse::<u64>().map_err(|_| invalid())?, 1),
        };

        if denominator == 0 {
            return Err(invalid());
        }

        let divisor = gcd(numerator, denominator).max(1);
        Ok(Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        })
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoMetadata, ProbeError> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ProbeError::MissingDimensions),
    };

    let fps = stream
        .r_frame_rate
        .as_deref()
        .unwrap_or("0/1")
        .parse::<FrameRate>()?
        .as_f64();

    let format = probe.format.as_ref();
    let bitrate = parse_number::<u64>(stream.bit_rate.as_deref())
        .or_else(|| parse_number::<u64>(format.and_then(|f| f.bit_rate.as_deref())));
    let duration = parse_number::<f64>(format.and_then(|f| f.duration.as_deref()));

    Ok(VideoMetadata {
        width,
        height,
        fps,
        codec: stream.codec_name.clone().unwrap_or_default(),
        bitrate,
        duration,
    })
}

// ffprobe emits "N/A" for unknown numeric fields
fn parse_number<T: FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

//! Preview frame selection and post-processing.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::error::EncodeError;
use super::ladder::Dimensions;

pub const THUMBNAIL_MAX_WIDTH: u32 = 320;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 180;
pub const THUMBNAIL_QUALITY: u8 = 85;

const MAX_SEEK_SECS: f64 = 5.0;

/// 10% into the video, capped at five seconds. Unknown duration seeks the cap.
pub fn seek_time(duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 => (d * 0.1).min(MAX_SEEK_SECS),
        _ => MAX_SEEK_SECS,
    }
}

/// Downscale an extracted frame in place to fit the preview box and
/// re-encode it as JPEG. Frames already inside the box keep their size.
pub fn fit_thumbnail(path: &Path) -> Result<Dimensions, EncodeError> {
    let img = image::open(path)?;

    let img = if img.width() > THUMBNAIL_MAX_WIDTH || img.height() > THUMBNAIL_MAX_HEIGHT {
        img.resize(THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, THUMBNAIL_QUALITY))?;
    std::fs::write(path, buf.into_inner())?;

    Ok(Dimensions {
        width: img.width(),
        height: img.height(),
    })
}

/// [`fit_thumbnail`] on the blocking pool.
pub async fn fit_thumbnail_blocking(path: PathBuf) -> Result<Dimensions, EncodeError> {
    tokio::task::spawn_blocking(move || fit_thumbnail(&path)).await?
}

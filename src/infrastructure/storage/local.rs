use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const VIDEOS_DIR: &str = "videos";
const THUMBNAILS_DIR: &str = "thumbnails";
const PROCESSED_DIR: &str = "processed";

/// Path scheme for everything stored under the upload root:
/// `videos/<uuid-hex>.<ext>` (written by the upload side), `thumbnails/<uuid-hex>.jpg`,
/// `processed/<original-basename>_<rung>.mp4`.
#[derive(Clone, Debug)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [VIDEOS_DIR, THUMBNAILS_DIR, PROCESSED_DIR] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        info!("✅ Storage ready at {}", self.root.display());
        Ok(())
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn new_thumbnail_path(&self) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!("{}.jpg", Uuid::new_v4().as_simple()))
    }

    /// `filename` is the stored name of the original, e.g. `3f2a...9c.mov`.
    pub fn variant_path(&self, filename: &str, rung_name: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        self.root
            .join(PROCESSED_DIR)
            .join(format!("{}_{}.mp4", stem, rung_name))
    }
}

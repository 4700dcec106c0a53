use std::path::PathBuf;
use thiserror::Error;

use crate::config::env::{self, EnvKey};
use crate::media::ladder::{Ladder, LadderError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not set: {source}")]
    Missing {
        key: &'static str,
        source: std::env::VarError,
    },

    #[error("Invalid VIDEO_RESOLUTIONS: {0}")]
    Ladder(#[from] LadderError),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,
    pub amqp_url: String,
    pub transcode_queue: String,
    pub upload_folder: PathBuf,
    pub worker_concurrency: usize,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub lock_ttl_secs: u64,
    pub ladder: Ladder,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: required(EnvKey::DatabaseUrl)?,
            db_max_connections: env::get_parsed(EnvKey::DbMaxConnections, 10),
            redis_url: required(EnvKey::RedisUrl)?,
            amqp_url: required(EnvKey::AmqpUrl)?,
            transcode_queue: env::get_or(EnvKey::TranscodeQueue, "transcoding_tasks"),
            upload_folder: PathBuf::from(env::get_or(EnvKey::UploadFolder, "/app/uploads")),
            worker_concurrency: env::get_parsed(EnvKey::WorkerConcurrency, 2usize).max(1),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            lock_ttl_secs: env::get_parsed(EnvKey::LockTtlSecs, 60u64).max(3),
            ladder: ladder_from(env::get(EnvKey::VideoResolutions).ok())?,
        })
    }
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|source| ConfigError::Missing { key: name, source })
}

/// Unset or blank falls back to the built-in ladder.
fn ladder_from(raw: Option<String>) -> Result<Ladder, ConfigError> {
    match raw.as_deref().map(str::trim) {
        Some(json) if !json.is_empty() => Ok(Ladder::from_json(json)?),
        _ => Ok(Ladder::default()),
    }
}

use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    AmqpUrl,
    TranscodeQueue,
    UploadFolder,
    WorkerConcurrency,
    FfmpegPath,
    FfprobePath,
    LockTtlSecs,
    VideoResolutions,
    DbMaxConnections,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::TranscodeQueue => "TRANSCODE_QUEUE",
            EnvKey::UploadFolder => "UPLOAD_FOLDER",
            EnvKey::WorkerConcurrency => "WORKER_CONCURRENCY",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::LockTtlSecs => "LOCK_TTL_SECS",
            EnvKey::VideoResolutions => "VIDEO_RESOLUTIONS",
            EnvKey::DbMaxConnections => "DB_MAX_CONNECTIONS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

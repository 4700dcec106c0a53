use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod media;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool;
use infrastructure::queue::RabbitMqService;
use infrastructure::redis::{RedisJobLock, RedisService};
use infrastructure::storage::StorageLayout;
use media::ffmpeg::FfmpegCodec;
use media::MediaCodec;
use modules::video::repository::{PgVideoRepository, VideoRepository};
use state::AppState;
use workers::dispatcher::{JobHandler, LeasePolicy};
use workers::pipeline::TranscodePipeline;
use workers::single_flight::JobLock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,lapin=warn")),
        )
        .init();

    info!("Starting transcoder...");

    let config = AppConfig::new().context("Failed to load configuration")?;

    let db = pool::connect_to_db(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    pool::run_migrations(&db)
        .await
        .context("Failed to run migrations")?;

    let redis = RedisService::new(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let queue = RabbitMqService::new(&config.amqp_url, &config.transcode_queue)
        .await
        .context("Failed to connect to RabbitMQ")?;

    let codec = FfmpegCodec::locate(&config.ffmpeg_path, &config.ffprobe_path)
        .context("ffmpeg/ffprobe not found")?;

    let layout = StorageLayout::new(&config.upload_folder);
    layout
        .ensure_dirs()
        .await
        .context("Failed to prepare upload folder")?;

    let repo: Arc<dyn VideoRepository> = Arc::new(PgVideoRepository::new(db.clone()));
    let codec: Arc<dyn MediaCodec> = Arc::new(codec);
    let lock: Arc<dyn JobLock> = Arc::new(RedisJobLock::new(redis.clone(), config.lock_ttl_secs));

    info!(
        "Ladder: {}",
        config
            .ladder
            .rungs()
            .iter()
            .map(|r| format!("{}@{}", r.name, r.bitrate))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let pipeline = TranscodePipeline::new(repo.clone(), codec, config.ladder.clone(), layout);
    let handler = Arc::new(JobHandler::new(
        pipeline,
        lock.clone(),
        LeasePolicy::for_ttl(config.lock_ttl_secs),
    ));
    tokio::spawn(workers::transcoder::start_transcoder_worker(
        queue.clone(),
        handler,
        config.worker_concurrency,
    ));

    let state = AppState::new(db, redis, queue, repo, lock);
    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

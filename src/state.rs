use std::sync::Arc;

use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::queue::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::modules::video::events::JobPublisher;
use crate::modules::video::repository::VideoRepository;
use crate::modules::video::service::VideoService;
use crate::workers::single_flight::JobLock;

pub type VideoApi = VideoService<dyn VideoRepository, dyn JobPublisher, dyn JobLock>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub redis: RedisService,
    pub queue: RabbitMqService,
    pub videos: Arc<VideoApi>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        redis: RedisService,
        queue: RabbitMqService,
        repo: Arc<dyn VideoRepository>,
        lock: Arc<dyn JobLock>,
    ) -> Self {
        let publisher: Arc<dyn JobPublisher> = Arc::new(queue.clone());
        Self {
            db,
            redis,
            queue,
            videos: Arc::new(VideoService::new(repo, publisher, lock)),
        }
    }
}

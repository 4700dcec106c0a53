use async_trait::async_trait;
use redis::Script;
use tracing::debug;
use uuid::Uuid;

use super::client::RedisService;
use crate::workers::single_flight::{JobLock, Lease, LockError};

const LOCK_KEY_PREFIX: &str = "transcode:lock";

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

const EXTEND_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Redis lease shared by every worker process.
///
/// A live run keeps extending its lease, so the TTL only bounds how long a
/// crashed worker can keep a video locked.
#[derive(Clone)]
pub struct RedisJobLock {
    redis: RedisService,
    ttl_secs: u64,
}

impl RedisJobLock {
    pub fn new(redis: RedisService, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    fn key(video_id: Uuid) -> String {
        format!("{}:{}", LOCK_KEY_PREFIX, video_id)
    }
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn try_acquire(&self, video_id: Uuid) -> Result<Option<Lease>, LockError> {
        let key = Self::key(video_id);
        let lease = Lease::new(video_id);
        let mut conn = self.redis.get_conn().await?;

        // SET NX returns "OK" when set, nil when the key exists
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&lease.token)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;

        let acquired = result.is_some();
        debug!(lock_key = %key, acquired, "Transcode lock acquisition attempt");

        Ok(acquired.then_some(lease))
    }

    async fn extend(&self, lease: &Lease) -> Result<bool, LockError> {
        let key = Self::key(lease.video_id);
        let mut conn = self.redis.get_conn().await?;

        let extended: i32 = Script::new(EXTEND_SCRIPT)
            .key(&key)
            .arg(&lease.token)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        debug!(lock_key = %key, extended, "Transcode lock extended");
        Ok(extended == 1)
    }

    async fn is_held(&self, video_id: Uuid) -> Result<bool, LockError> {
        let mut conn = self.redis.get_conn().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(video_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn release(&self, lease: Lease) -> Result<(), LockError> {
        let key = Self::key(lease.video_id);
        let mut conn = self.redis.get_conn().await?;

        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;

        debug!(lock_key = %key, deleted, "Transcode lock released");
        Ok(())
    }
}

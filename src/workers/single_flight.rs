//! At most one active run per video id.
//!
//! Queue delivery is at-least-once and reprocess triggers can fire while a
//! run is in flight, so a worker must hold the video's lease before it moves
//! the record to `processing`.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Proof of ownership for one video id. Hand it back to [`JobLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub video_id: Uuid,
    pub token: String,
}

impl Lease {
    pub fn new(video_id: Uuid) -> Self {
        Self {
            video_id,
            token: format!("worker:{}", Uuid::new_v4()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobLock: Send + Sync {
    /// `None` when another run holds the lease.
    async fn try_acquire(&self, video_id: Uuid) -> Result<Option<Lease>, LockError>;

    /// Push the expiry of a lease we still own. `false` when it already
    /// lapsed or belongs to someone else.
    async fn extend(&self, lease: &Lease) -> Result<bool, LockError>;

    /// Whether any run currently holds the lease for `video_id`.
    async fn is_held(&self, video_id: Uuid) -> Result<bool, LockError>;

    /// Releasing a lease that already expired or was taken over is a no-op.
    async fn release(&self, lease: Lease) -> Result<(), LockError>;
}

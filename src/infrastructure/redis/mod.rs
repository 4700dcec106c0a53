pub mod client;
pub mod lock;

pub use client::RedisService;
pub use lock::RedisJobLock;

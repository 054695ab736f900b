//! Redis connection pool.

use super::error::StoreError;
use deadpool_redis::{Config, Pool, Runtime};
use std::time::Duration;

/// Redis-backed job and preset store.
#[derive(Clone)]
pub struct RedisPool {
    pub(super) pool: Pool,
    pub(super) retention: Duration,
}

impl RedisPool {
    /// Create a new RedisPool with connection pool.
    pub fn new(redis_url: &str, retention: Duration) -> Result<Self, StoreError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, retention })
    }

    pub(super) fn retention_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

//! Redis adapter.
//!
//! Implements `JobRepository` and `PresetRepository` on a pooled Redis
//! connection. Job records are written with an expiry so retention is
//! enforced by Redis itself.

mod error;
mod pool;
mod repository;

pub use error::StoreError;
pub use pool::RedisPool;

/// Redis key constants
const JOB_PREFIX: &str = "maestro:job:";
const PRESETS_KEY: &str = "maestro:presets";

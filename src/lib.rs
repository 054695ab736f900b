//! Maestro - media transcoding orchestration
//!
//! Hexagonal Architecture:
//! - domain/: Job, preset and status models, downmix, stage graphs, HLS playlists
//! - ports/: Provider and repository traits
//! - adapters/: Storage back-ends, the local ffmpeg provider, HTTP API
//! - application/: Provider registry, orchestrator, splice
//! - config: Environment configuration
//!
//! # Features
//! - `redis`: Redis job and preset store (default)
//! - `aws`: DynamoDB job and preset store

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::orchestrator::{OrchestratorError, OrchestratorService};
pub use application::registry::ProviderRegistry;
pub use config::Config;

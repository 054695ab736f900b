//! Adapters - Concrete implementations of ports.

pub mod ffmpeg;
pub mod http;
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "aws")]
pub mod aws;

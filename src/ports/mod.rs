//! Ports - trait definitions the application talks to.

pub mod provider;
pub mod repository;

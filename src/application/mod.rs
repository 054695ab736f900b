//! Application layer - Services built on the ports.

pub mod orchestrator;
pub mod registry;
pub mod splice;

//! Domain layer - canonical model and the pure algorithms.

pub mod downmix;
pub mod hls;
pub mod job;
pub mod pipeline;
pub mod preset;
pub mod status;

pub use job::{File, Job, JobOutput};
pub use preset::Preset;
pub use status::{Capabilities, State, Status};

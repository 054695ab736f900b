//! Local execution with the ffmpeg command line tools.

pub mod args;
pub mod probe;
pub mod provider;
pub mod runner;
pub mod splice;

pub use provider::{factory, FfmpegProvider, FfmpegSettings, NAME};
pub use runner::{CommandRunner, ProcessRunner};

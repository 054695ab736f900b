use super::downmix::Downmix;
use super::pipeline::ComputeClass;
use super::preset::Preset;
use super::status::Opaque;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum JobError {
    #[error("job {job_id} already has provider job id {existing}")]
    ProviderJobAlreadySet { job_id: String, existing: String },
    #[error("job must declare at least one output")]
    NoOutputs,
    #[error("invalid output file name {0:?}")]
    InvalidOutputName(String),
    #[error("invalid playlist file name {0:?}")]
    InvalidPlaylistName(String),
    #[error("invalid splice range #{position}: start {start} must be before end {end}")]
    InvalidSplice { position: usize, start: f64, end: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSpec {
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub bitrate: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSpec {
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub channels: u32,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub bitrate: u64,
}

/// A time range, in seconds, kept from the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpliceRange {
    pub start: f64,
    pub end: f64,
}

impl SpliceRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A media file, either the job source or a description of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub uri: String,
    #[serde(default)]
    pub size: u64,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splice: Vec<SpliceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downmix: Option<Downmix>,
    /// Seconds at which keyframes must be placed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframe_offsets: Vec<f64>,
}

impl File {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }
}

/// One requested output: a file name and the preset that produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub file_name: String,
    pub preset_name: String,
    /// Filled in by the orchestrator when the preset is resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingProtocol {
    Hls,
    Dash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingParams {
    /// Seconds per segment.
    pub segment_duration: u32,
    pub protocol: StreamingProtocol,
    pub playlist_file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnv {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_alias: Option<String>,
    /// Routing tags per compute class.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<ComputeClass, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarKind {
    Caption,
    DolbyVisionMetadata,
}

/// One transcode request, as persisted by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<String>,
    /// When the provider accepted the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    pub input: File,
    #[serde(default)]
    pub output_destination: String,
    pub outputs: Vec<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Opaque>,
    #[serde(default)]
    pub env: ExecutionEnv,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sidecars: HashMap<SidecarKind, String>,
}

impl Job {
    pub fn new(provider: impl Into<String>, input: File, outputs: Vec<JobOutput>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            created_at: Utc::now(),
            labels: Vec::new(),
            provider: provider.into(),
            provider_job_id: None,
            creation_time: None,
            input,
            output_destination: String::new(),
            outputs,
            streaming: None,
            features: None,
            env: ExecutionEnv::default(),
            sidecars: HashMap::new(),
        }
    }

    /// Record the provider's id for this job. Succeeds only once.
    pub fn attach_provider_job(
        &mut self,
        provider_job_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if let Some(existing) = &self.provider_job_id {
            return Err(JobError::ProviderJobAlreadySet {
                job_id: self.id.clone(),
                existing: existing.clone(),
            });
        }
        self.provider_job_id = Some(provider_job_id.into());
        self.creation_time = Some(at);
        Ok(())
    }

    /// Structural checks that do not depend on any provider.
    ///
    /// A job about to be submitted must not carry a provider job id yet.
    pub fn validate(&self) -> Result<(), JobError> {
        if let Some(existing) = &self.provider_job_id {
            return Err(JobError::ProviderJobAlreadySet {
                job_id: self.id.clone(),
                existing: existing.clone(),
            });
        }
        if self.outputs.is_empty() {
            return Err(JobError::NoOutputs);
        }
        for output in &self.outputs {
            if !is_safe_file_name(&output.file_name) {
                return Err(JobError::InvalidOutputName(output.file_name.clone()));
            }
        }
        if let Some(streaming) = &self.streaming {
            if !is_safe_file_name(&streaming.playlist_file_name) {
                return Err(JobError::InvalidPlaylistName(
                    streaming.playlist_file_name.clone(),
                ));
            }
        }
        for (position, range) in self.input.splice.iter().enumerate() {
            if !(range.start >= 0.0 && range.start < range.end) {
                return Err(JobError::InvalidSplice {
                    position,
                    start: range.start,
                    end: range.end,
                });
            }
        }
        Ok(())
    }
}

fn is_safe_file_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') {
        return false;
    }
    !std::path::Path::new(name)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str) -> JobOutput {
        JobOutput {
            file_name: name.to_string(),
            preset_name: "720p".to_string(),
            preset: None,
        }
    }

    #[test]
    fn test_attach_provider_job_only_once() {
        let mut job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("out.mp4")]);
        let now = Utc::now();

        assert!(job.attach_provider_job("abc", now).is_ok());
        assert_eq!(job.provider_job_id.as_deref(), Some("abc"));
        assert_eq!(job.creation_time, Some(now));

        let err = job.attach_provider_job("def", Utc::now()).unwrap_err();
        assert!(matches!(err, JobError::ProviderJobAlreadySet { .. }));
        assert_eq!(job.provider_job_id.as_deref(), Some("abc"));
        assert_eq!(job.creation_time, Some(now));
    }

    #[test]
    fn test_validate_requires_outputs() {
        let job = Job::new("ffmpeg", File::new("in.mp4"), vec![]);
        assert_eq!(job.validate(), Err(JobError::NoOutputs));
    }

    #[test]
    fn test_validate_rejects_traversal() {
        let job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("../etc/passwd")]);
        assert!(matches!(
            job.validate(),
            Err(JobError::InvalidOutputName(_))
        ));

        let job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("/abs.mp4")]);
        assert!(job.validate().is_err());

        let job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("hd/out.mp4")]);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_splice_range() {
        let mut input = File::new("in.mp4");
        input.splice = vec![
            SpliceRange {
                start: 0.0,
                end: 5.0,
            },
            SpliceRange {
                start: 9.0,
                end: 9.0,
            },
        ];
        let job = Job::new("ffmpeg", input, vec![output("out.mp4")]);
        assert!(matches!(
            job.validate(),
            Err(JobError::InvalidSplice { position: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_preset_provider_job_id() {
        let mut job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("out.mp4")]);
        job.provider_job_id = Some("stale".to_string());
        assert!(matches!(
            job.validate(),
            Err(JobError::ProviderJobAlreadySet { ref existing, .. }) if existing == "stale"
        ));
    }

    #[test]
    fn test_validate_rejects_playlist_traversal() {
        let mut job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("out.mp4")]);
        job.streaming = Some(StreamingParams {
            segment_duration: 6,
            protocol: StreamingProtocol::Hls,
            playlist_file_name: "../../master.m3u8".to_string(),
        });
        assert!(matches!(
            job.validate(),
            Err(JobError::InvalidPlaylistName(_))
        ));

        job.streaming.as_mut().unwrap().playlist_file_name = "master.m3u8".to_string();
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_job_json_roundtrip_keeps_provider_job_id() {
        let mut job = Job::new("ffmpeg", File::new("in.mp4"), vec![output("out.mp4")]);
        job.labels = vec!["news".to_string()];
        job.attach_provider_job("xyz", Utc::now()).unwrap();

        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}

use super::args;
use super::probe;
use super::runner::{run_checked, CommandRunner, ProcessRunner};
use super::splice::FfmpegSplicer;
use crate::application::splice::splice;
use crate::config::{ConfigError, ProviderSettings};
use crate::domain::hls::MasterPlaylist;
use crate::domain::job::{File, StreamingProtocol};
use crate::domain::pipeline::{assemble, ComputeClass, Plan, Stage};
use crate::domain::status::{clamp_progress, Opaque, OutputFile, StatusOutput};
use crate::domain::{Capabilities, Job, State, Status};
use crate::ports::provider::{Provider, ProviderError};
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const NAME: &str = "ffmpeg";

const STATUS_SCHEMA: &str = "ffmpeg.local.v1";

/// Finished records are dropped this long after they end.
const RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegSettings {
    pub work_dir: PathBuf,
    pub binary: String,
    pub ffprobe: String,
    pub max_concurrency: usize,
}

impl FfmpegSettings {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let work_dir = PathBuf::from(settings.require("work_dir")?);
        let max_concurrency = settings.parse_or("max_concurrency", 2usize)?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: settings.var_name("max_concurrency"),
                value: "0".to_string(),
            });
        }
        Ok(Self {
            work_dir,
            binary: settings.get_or("binary", "ffmpeg").to_string(),
            ffprobe: settings.get_or("ffprobe", "ffprobe").to_string(),
            max_concurrency,
        })
    }
}

/// Registry entry point.
pub fn factory(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let settings = FfmpegSettings::from_settings(settings)
        .map_err(|e| ProviderError::Configuration(e.to_string()))?;
    Ok(Arc::new(FfmpegProvider::new(ProcessRunner, settings)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Probe,
    Splice,
    Transcode(usize),
    Package,
}

struct Record {
    state: State,
    progress: f64,
    message: String,
    stage: Option<String>,
    input: Option<File>,
    destination: String,
    outputs: Vec<OutputFile>,
    cancel: CancellationToken,
    ended_at: Option<Instant>,
}

struct Shared<R> {
    runner: Arc<R>,
    settings: FfmpegSettings,
    permits: Semaphore,
    records: Mutex<HashMap<String, Record>>,
}

impl<R> Shared<R> {
    fn records(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<F: FnOnce(&mut Record)>(&self, id: &str, f: F) {
        if let Some(record) = self.records().get_mut(id) {
            f(record);
        }
    }

    /// Apply `next` if the record may move there.
    fn transition(&self, id: &str, next: State, message: String) -> bool {
        let mut records = self.records();
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        if !record.state.can_transition_to(next) {
            debug!(provider_job_id = %id, from = %record.state, to = %next, "Transition ignored");
            return false;
        }
        record.state = next;
        record.message = message;
        if next == State::Finished {
            record.progress = 100.0;
        }
        if next.is_terminal() {
            record.stage = None;
            record.ended_at = Some(Instant::now());
        }
        true
    }

    fn advance(&self, id: &str, progress: f64) {
        self.update(id, |record| {
            record.progress = record.progress.max(clamp_progress(progress));
        });
    }

    fn prune(&self) {
        let now = Instant::now();
        self.records()
            .retain(|_, r| r.ended_at.map_or(true, |at| now.duration_since(at) < RECORD_TTL));
    }
}

/// Runs jobs with ffmpeg on this host.
///
/// Each accepted job is tracked in an in-process table that plays the part
/// of a remote service's job store; the orchestrator still only sees the
/// provider job id.
pub struct FfmpegProvider<R> {
    shared: Arc<Shared<R>>,
}

impl<R: CommandRunner + 'static> FfmpegProvider<R> {
    pub fn new(runner: R, settings: FfmpegSettings) -> Self {
        Self::with_runner(Arc::new(runner), settings)
    }

    pub fn with_runner(runner: Arc<R>, settings: FfmpegSettings) -> Self {
        let permits = Semaphore::new(settings.max_concurrency);
        Self {
            shared: Arc::new(Shared {
                runner,
                settings,
                permits,
                records: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reject what this host cannot run before anything is spawned.
    fn check(&self, job: &Job) -> Result<(), ProviderError> {
        local_source(&job.input.uri)?;
        if !job.output_destination.is_empty() {
            local_destination(&job.output_destination)?;
        }
        if let Some(streaming) = &job.streaming {
            if streaming.protocol == StreamingProtocol::Dash {
                return Err(ProviderError::Unsupported("DASH packaging".to_string()));
            }
        }
        if !job.sidecars.is_empty() {
            return Err(ProviderError::Unsupported("sidecar files".to_string()));
        }
        for output in &job.outputs {
            let preset = output.preset.as_ref().ok_or_else(|| {
                ProviderError::Unsupported(format!(
                    "output {} has no resolved preset",
                    output.file_name
                ))
            })?;
            args::transcode("input", Path::new(&output.file_name), preset, &job.input)?;
        }
        Ok(())
    }
}

fn stages(job: &Job) -> Vec<Stage<Step>> {
    let transcode = ComputeClass::new("transcode");
    let mut stages = vec![Stage::new("probe", Step::Probe).on(ComputeClass::new("analysis"))];

    let mut upstream = "probe";
    if !job.input.splice.is_empty() {
        stages.push(
            Stage::new("splice", Step::Splice)
                .on(transcode.clone())
                .after([upstream]),
        );
        upstream = "splice";
    }
    for index in 0..job.outputs.len() {
        stages.push(
            Stage::new(format!("transcode-{}", index), Step::Transcode(index))
                .on(transcode.clone())
                .after([upstream]),
        );
    }
    if job.streaming.is_some() {
        stages.push(
            Stage::new("package", Step::Package)
                .after((0..job.outputs.len()).map(|i| format!("transcode-{}", i))),
        );
    }
    stages
}

fn local_source(uri: &str) -> Result<String, ProviderError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(path.to_string());
    }
    match uri.split_once("://") {
        Some((scheme, _)) if !matches!(scheme, "http" | "https") => Err(
            ProviderError::Unsupported(format!("{} sources", scheme)),
        ),
        _ => Ok(uri.to_string()),
    }
}

fn local_destination(uri: &str) -> Result<PathBuf, ProviderError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    match uri.split_once("://") {
        Some((scheme, _)) => Err(ProviderError::Unsupported(format!(
            "{} destinations",
            scheme
        ))),
        None => Ok(PathBuf::from(uri)),
    }
}

/// One accepted job while it executes.
struct Run<R> {
    shared: Arc<Shared<R>>,
    id: String,
    job: Job,
    scratch: PathBuf,
    destination: PathBuf,
    cancel: CancellationToken,
    source: Mutex<String>,
    probed: Mutex<Option<File>>,
    rendered: Mutex<Vec<Option<OutputFile>>>,
    packaged: Mutex<Option<OutputFile>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<R: CommandRunner + 'static> Run<R> {
    async fn execute(self: Arc<Self>, plan: Plan<Step>) {
        self.shared
            .transition(&self.id, State::Started, "running".to_string());

        match self.run(&plan).await {
            Ok(()) => {
                let mut files: Vec<OutputFile> = lock(&self.rendered).iter().flatten().cloned().collect();
                files.extend(lock(&self.packaged).clone());
                self.shared.update(&self.id, |record| record.outputs = files);
                if self
                    .shared
                    .transition(&self.id, State::Finished, "completed".to_string())
                {
                    info!(job_id = %self.job.id, provider_job_id = %self.id, "Job finished");
                }
            }
            Err(_) if self.cancel.is_cancelled() => {
                self.shared
                    .transition(&self.id, State::Canceled, "canceled".to_string());
                info!(job_id = %self.job.id, provider_job_id = %self.id, "Job canceled");
            }
            Err((stage, err)) => {
                error!(job_id = %self.job.id, provider_job_id = %self.id, stage = %stage, "Stage failed: {}", err);
                self.shared
                    .transition(&self.id, State::Failed, format!("{}: {}", stage, err));
            }
        }
    }

    async fn run(&self, plan: &Plan<Step>) -> Result<(), (String, ProviderError)> {
        for dir in [&self.scratch, &self.destination] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ("setup".to_string(), ProviderError::from(e)))?;
        }

        let total = plan.stage_count().max(1);
        let mut finished = 0;
        for wave in &plan.waves {
            let results = join_all(wave.iter().map(|stage| self.stage(stage))).await;
            for (stage, result) in wave.iter().zip(results) {
                result.map_err(|e| (stage.id.clone(), e))?;
            }
            finished += wave.len();
            self.shared
                .advance(&self.id, finished as f64 * 100.0 / total as f64);
        }
        Ok(())
    }

    async fn stage(&self, stage: &Stage<Step>) -> Result<(), ProviderError> {
        let _permit = self
            .shared
            .permits
            .acquire()
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Canceled);
        }

        self.shared
            .update(&self.id, |record| record.stage = Some(stage.id.clone()));
        debug!(
            provider_job_id = %self.id,
            stage = %stage.id,
            compute_class = %stage.compute_class,
            tags = ?self.job.env.tags.get(&stage.compute_class),
            "Stage started"
        );

        match stage.payload {
            Step::Probe => self.probe().await,
            Step::Splice => self.splice().await,
            Step::Transcode(index) => self.transcode(index).await,
            Step::Package => self.package().await,
        }
    }

    fn source(&self) -> String {
        lock(&self.source).clone()
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let settings = &self.shared.settings;
        let output = run_checked(
            self.shared.runner.as_ref(),
            &settings.ffprobe,
            probe::args(&self.source()),
            self.cancel.clone(),
        )
        .await?;
        let file = probe::parse(&self.job.input, &output.stdout)
            .map_err(|e| ProviderError::Backend(format!("unreadable ffprobe output: {}", e)))?;

        self.shared
            .update(&self.id, |record| record.input = Some(file.clone()));
        *lock(&self.probed) = Some(file);
        Ok(())
    }

    async fn splice(&self) -> Result<(), ProviderError> {
        let source = self.source();
        let extension = Path::new(&source)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();
        let dir = self.scratch.join("splice");
        tokio::fs::create_dir_all(&dir).await?;

        let splicer = Arc::new(FfmpegSplicer {
            runner: self.shared.runner.clone(),
            binary: self.shared.settings.binary.clone(),
            source,
            dir,
            extension,
            cancel: self.cancel.clone(),
        });
        let spliced = splice(splicer, &self.job.input.splice).await?;
        debug!(provider_job_id = %self.id, path = %spliced, "Source spliced");
        *lock(&self.source) = spliced;
        Ok(())
    }

    async fn transcode(&self, index: usize) -> Result<(), ProviderError> {
        let output = self
            .job
            .outputs
            .get(index)
            .ok_or_else(|| ProviderError::Backend(format!("no output #{}", index)))?;
        let preset = output.preset.as_ref().ok_or_else(|| {
            ProviderError::Unsupported(format!("output {} has no resolved preset", output.file_name))
        })?;

        let path = self.destination.join(&output.file_name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = args::transcode(&self.source(), &path, preset, &self.job.input)?;
        run_checked(
            self.shared.runner.as_ref(),
            &self.shared.settings.binary,
            args,
            self.cancel.clone(),
        )
        .await?;

        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let video = preset.video.as_ref();
        let file = OutputFile {
            path: path.to_string_lossy().into_owned(),
            container: preset.container.clone(),
            width: video.map(|v| v.width).filter(|w| *w > 0),
            height: video.map(|v| v.height).filter(|h| *h > 0),
            size,
        };
        if let Some(slot) = lock(&self.rendered).get_mut(index) {
            *slot = Some(file);
        }
        Ok(())
    }

    async fn package(&self) -> Result<(), ProviderError> {
        let streaming = self
            .job
            .streaming
            .as_ref()
            .ok_or_else(|| ProviderError::Backend("nothing to package".to_string()))?;
        let duration = lock(&self.probed).as_ref().map_or(0.0, |f| f.duration);
        let rendered = lock(&self.rendered).clone();

        let mut master = MasterPlaylist::new();
        for (index, output) in self.job.outputs.iter().enumerate() {
            let Some(rendition) = rendered.get(index).cloned().flatten() else {
                return Err(ProviderError::Backend(format!("output #{} was not rendered", index)));
            };
            // Keyed by position: outputs in different folders may share a stem.
            let name = match Path::new(&output.file_name).file_stem().and_then(|s| s.to_str()) {
                Some(stem) => format!("{}_{}", index, stem),
                None => format!("rendition_{}", index),
            };
            let dir = self.destination.join(&name);
            tokio::fs::create_dir_all(&dir).await?;

            let args = vec![
                "-y".to_string(),
                "-i".to_string(),
                rendition.path.clone(),
                "-c".to_string(),
                "copy".to_string(),
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                streaming.segment_duration.to_string(),
                "-hls_playlist_type".to_string(),
                "vod".to_string(),
                "-hls_segment_filename".to_string(),
                dir.join("segment_%05d.ts").to_string_lossy().into_owned(),
                dir.join("index.m3u8").to_string_lossy().into_owned(),
            ];
            run_checked(
                self.shared.runner.as_ref(),
                &self.shared.settings.binary,
                args,
                self.cancel.clone(),
            )
            .await?;

            let preset = output.preset.as_ref();
            let declared = preset
                .and_then(|p| p.video.as_ref())
                .map_or(0, |v| v.bitrate)
                .saturating_add(preset.and_then(|p| p.audio.as_ref()).map_or(0, |a| a.bitrate));
            let bandwidth = if declared > 0 {
                declared
            } else if duration > 0.0 {
                (rendition.size as f64 * 8.0 / duration) as u64
            } else {
                warn!(provider_job_id = %self.id, output = %output.file_name, "No bitrate for variant");
                1
            };
            let resolution = rendition.width.zip(rendition.height);
            master.add_variant(bandwidth, resolution, format!("{}/index.m3u8", name));
        }

        let path = self.destination.join(&streaming.playlist_file_name);
        master.write_to(&path).await?;
        *lock(&self.packaged) = Some(OutputFile {
            path: path.to_string_lossy().into_owned(),
            container: "m3u8".to_string(),
            ..OutputFile::default()
        });
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> Provider for FfmpegProvider<R> {
    async fn create(&self, job: &Job) -> Result<Status, ProviderError> {
        self.check(job)?;
        let plan = assemble(stages(job))?;
        self.shared.prune();

        let id = Uuid::new_v4().to_string();
        let scratch = self.shared.settings.work_dir.join(&id);
        let destination = if job.output_destination.is_empty() {
            scratch.join("output")
        } else {
            local_destination(&job.output_destination)?
        };
        let cancel = CancellationToken::new();

        self.shared.records().insert(
            id.clone(),
            Record {
                state: State::Queued,
                progress: 0.0,
                message: String::new(),
                stage: None,
                input: None,
                destination: destination.to_string_lossy().into_owned(),
                outputs: Vec::new(),
                cancel: cancel.clone(),
                ended_at: None,
            },
        );

        let run = Arc::new(Run {
            shared: self.shared.clone(),
            id: id.clone(),
            job: job.clone(),
            scratch,
            destination: destination.clone(),
            cancel,
            source: Mutex::new(local_source(&job.input.uri)?),
            probed: Mutex::new(None),
            rendered: Mutex::new(vec![None; job.outputs.len()]),
            packaged: Mutex::new(None),
        });
        info!(
            job_id = %job.id,
            provider_job_id = %id,
            stages = plan.stage_count(),
            waves = plan.waves.len(),
            "Job accepted"
        );
        tokio::spawn(run.execute(plan));

        let mut status = Status::queued(NAME, &id);
        status.output.destination = destination.to_string_lossy().into_owned();
        Ok(status)
    }

    async fn status(&self, job: &Job) -> Result<Status, ProviderError> {
        let id = job
            .provider_job_id
            .as_deref()
            .ok_or_else(|| ProviderError::JobNotFound(job.id.clone()))?;
        let records = self.shared.records();
        let record = records
            .get(id)
            .ok_or_else(|| ProviderError::JobNotFound(id.to_string()))?;

        Ok(Status {
            id: job.id.clone(),
            labels: job.labels.clone(),
            state: record.state,
            progress: clamp_progress(record.progress),
            message: record.message.clone(),
            input: record.input.clone(),
            output: StatusOutput {
                destination: record.destination.clone(),
                files: record.outputs.clone(),
            },
            provider_name: NAME.to_string(),
            provider_job_id: id.to_string(),
            provider_status: Some(Opaque::new(
                STATUS_SCHEMA,
                json!({ "stage": record.stage, "state": record.state }),
            )),
        })
    }

    async fn cancel(&self, provider_job_id: &str) -> Result<(), ProviderError> {
        let mut records = self.shared.records();
        let record = records
            .get_mut(provider_job_id)
            .ok_or_else(|| ProviderError::JobNotFound(provider_job_id.to_string()))?;
        if record.state.is_terminal() {
            debug!(provider_job_id, state = %record.state, "Cancel after end");
            return Ok(());
        }
        record.cancel.cancel();
        record.state = State::Canceled;
        record.message = "canceled by request".to_string();
        record.stage = None;
        record.ended_at = Some(Instant::now());
        info!(provider_job_id, "Cancel requested");
        Ok(())
    }

    async fn healthcheck(&self) -> Result<(), ProviderError> {
        let binary = &self.shared.settings.binary;
        let output = run_checked(
            self.shared.runner.as_ref(),
            binary,
            vec!["-version".to_string()],
            CancellationToken::new(),
        )
        .await?;
        let re = Regex::new(r"ffmpeg version (\S+)").map_err(|e| ProviderError::Backend(e.to_string()))?;
        let version = re
            .captures(&output.stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ProviderError::Command {
                program: binary.clone(),
                message: "unrecognized -version output".to_string(),
            })?;
        debug!(version = %version, "ffmpeg available");
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Capabilities {
            input_formats: list(&["mp4", "mov", "mkv", "webm", "ts"]),
            output_formats: list(&["mp4", "mov", "webm", "mkv", "ts", "hls"]),
            destinations: list(&["local"]),
        }
    }
}

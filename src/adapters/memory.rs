//! In-process job and preset store.

use crate::domain::{Job, Preset};
use crate::ports::repository::{JobRepository, PresetRepository, RepositoryError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, (Instant, Job)>,
    presets: BTreeMap<String, Preset>,
}

/// Keeps records in memory; jobs expire `retention` after their last write.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    retention: Duration,
}

impl MemoryStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop expired jobs, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, (expires_at, _)| *expires_at > now);
        before - inner.jobs.len()
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn get_job(&self, id: &str) -> Result<Job, RepositoryError> {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired = match inner.jobs.get(id) {
            Some((expires_at, job)) if *expires_at > now => return Ok(job.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.jobs.remove(id);
        }
        Err(RepositoryError::JobNotFound(id.to_string()))
    }

    async fn put_job(&self, id: &str, job: &Job) -> Result<(), RepositoryError> {
        let expires_at = Instant::now() + self.retention;
        self.lock()
            .jobs
            .insert(id.to_string(), (expires_at, job.clone()));
        Ok(())
    }
}

#[async_trait]
impl PresetRepository for MemoryStore {
    async fn put_preset(&self, preset: &Preset) -> Result<(), RepositoryError> {
        self.lock()
            .presets
            .insert(preset.name.clone(), preset.clone());
        Ok(())
    }

    async fn get_preset(&self, name: &str) -> Result<Preset, RepositoryError> {
        self.lock()
            .presets
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::PresetNotFound(name.to_string()))
    }

    async fn delete_preset(&self, name: &str) -> Result<(), RepositoryError> {
        self.lock()
            .presets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::PresetNotFound(name.to_string()))
    }

    async fn list_presets(&self) -> Result<Vec<Preset>, RepositoryError> {
        Ok(self.lock().presets.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{File, JobOutput};

    fn job() -> Job {
        Job::new(
            "ffmpeg",
            File::new("in.mp4"),
            vec![JobOutput {
                file_name: "out.mp4".to_string(),
                preset_name: "720p".to_string(),
                preset: None,
            }],
        )
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let mut record = job();
        store.put_job(&record.id, &record).await.unwrap();

        record.labels.push("second write".to_string());
        store.put_job(&record.id, &record).await.unwrap();

        let back = store.get_job(&record.id).await.unwrap();
        assert_eq!(back.labels, vec!["second write"]);
    }

    #[tokio::test]
    async fn test_expired_job_reads_not_found() {
        let store = MemoryStore::new(Duration::from_millis(30));
        let record = job();
        store.put_job(&record.id, &record).await.unwrap();
        assert!(store.get_job(&record.id).await.is_ok());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            store.get_job(&record.id).await,
            Err(RepositoryError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new(Duration::from_millis(10));
        let record = job();
        store.put_job(&record.id, &record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_presets_sorted_by_name() {
        let store = MemoryStore::new(Duration::from_secs(60));
        for name in ["webm_480p", "1080p", "720p"] {
            store
                .put_preset(&Preset {
                    name: name.to_string(),
                    container: "mp4".to_string(),
                    ..Preset::default()
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .list_presets()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["1080p", "720p", "webm_480p"]);

        assert!(store.delete_preset("720p").await.is_ok());
        assert!(matches!(
            store.delete_preset("720p").await,
            Err(RepositoryError::PresetNotFound(_))
        ));
    }
}

//! Redis repository implementations.

use super::error::StoreError;
use super::pool::RedisPool;
use super::{JOB_PREFIX, PRESETS_KEY};
use crate::domain::{Job, Preset};
use crate::ports::repository::{JobRepository, PresetRepository, RepositoryError};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

fn job_key(id: &str) -> String {
    format!("{}{}", JOB_PREFIX, id)
}

#[async_trait]
impl JobRepository for RedisPool {
    async fn get_job(&self, id: &str) -> Result<Job, RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json: Option<String> = conn.get(job_key(id)).await.map_err(StoreError::from)?;
        match json {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(RepositoryError::JobNotFound(id.to_string())),
        }
    }

    async fn put_job(&self, id: &str, job: &Job) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json = serde_json::to_string(job)?;
        conn.set_ex::<_, _, ()>(job_key(id), json, self.retention_secs())
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl PresetRepository for RedisPool {
    async fn put_preset(&self, preset: &Preset) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json = serde_json::to_string(preset)?;
        conn.hset::<_, _, _, ()>(PRESETS_KEY, &preset.name, json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_preset(&self, name: &str) -> Result<Preset, RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json: Option<String> = conn
            .hget(PRESETS_KEY, name)
            .await
            .map_err(StoreError::from)?;
        match json {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(RepositoryError::PresetNotFound(name.to_string())),
        }
    }

    async fn delete_preset(&self, name: &str) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let removed: i64 = conn
            .hdel(PRESETS_KEY, name)
            .await
            .map_err(StoreError::from)?;
        if removed == 0 {
            return Err(RepositoryError::PresetNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn list_presets(&self) -> Result<Vec<Preset>, RepositoryError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let values: Vec<String> = conn.hvals(PRESETS_KEY).await.map_err(StoreError::from)?;
        let mut presets = values
            .iter()
            .map(|data| serde_json::from_str::<Preset>(data))
            .collect::<Result<Vec<_>, _>>()?;
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(presets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key() {
        assert_eq!(job_key("abc"), "maestro:job:abc");
    }
}

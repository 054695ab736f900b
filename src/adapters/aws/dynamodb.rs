use crate::domain::{Job, Preset};
use crate::ports::repository::{JobRepository, PresetRepository, RepositoryError};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

const JOB_PREFIX: &str = "job#";
const PRESET_PREFIX: &str = "preset#";

type Item = HashMap<String, AttributeValue>;

/// DynamoAdapter implements the repositories on a single DynamoDB table.
///
/// Items are keyed by `pk` and carry the JSON record in `body`. Jobs also get
/// an `expires_at` epoch attribute, meant to be the table's TTL attribute;
/// since DynamoDB deletes expired items lazily, reads check it too.
#[derive(Clone)]
pub struct DynamoAdapter {
    client: Client,
    table_name: String,
    retention: Duration,
}

impl DynamoAdapter {
    pub fn new(client: Client, table_name: String, retention: Duration) -> Self {
        Self {
            client,
            table_name,
            retention,
        }
    }

    async fn get_item(&self, pk: String) -> Result<Option<Item>, RepositoryError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(pk))
            .send()
            .await
            .map_err(backend)?;
        Ok(resp.item)
    }
}

fn backend<E: std::fmt::Display>(err: E) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

fn body(item: &Item) -> Result<&str, RepositoryError> {
    item.get("body")
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| RepositoryError::Backend("item has no body".to_string()))
}

fn is_expired(item: &Item, now: i64) -> bool {
    item.get("expires_at")
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .map_or(false, |expires_at| expires_at <= now)
}

#[async_trait]
impl JobRepository for DynamoAdapter {
    async fn get_job(&self, id: &str) -> Result<Job, RepositoryError> {
        let item = self
            .get_item(format!("{}{}", JOB_PREFIX, id))
            .await?
            .filter(|item| !is_expired(item, Utc::now().timestamp()))
            .ok_or_else(|| RepositoryError::JobNotFound(id.to_string()))?;
        Ok(serde_json::from_str(body(&item)?)?)
    }

    async fn put_job(&self, id: &str, job: &Job) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(job)?;
        let expires_at = Utc::now().timestamp() + self.retention.as_secs() as i64;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("pk", AttributeValue::S(format!("{}{}", JOB_PREFIX, id)))
            .item("body", AttributeValue::S(json))
            .item("provider", AttributeValue::S(job.provider.clone()))
            .item("expires_at", AttributeValue::N(expires_at.to_string()))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl PresetRepository for DynamoAdapter {
    async fn put_preset(&self, preset: &Preset) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(preset)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(
                "pk",
                AttributeValue::S(format!("{}{}", PRESET_PREFIX, preset.name)),
            )
            .item("body", AttributeValue::S(json))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_preset(&self, name: &str) -> Result<Preset, RepositoryError> {
        let item = self
            .get_item(format!("{}{}", PRESET_PREFIX, name))
            .await?
            .ok_or_else(|| RepositoryError::PresetNotFound(name.to_string()))?;
        Ok(serde_json::from_str(body(&item)?)?)
    }

    async fn delete_preset(&self, name: &str) -> Result<(), RepositoryError> {
        let resp = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(format!("{}{}", PRESET_PREFIX, name)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(backend)?;

        match resp.attributes {
            Some(old) if !old.is_empty() => Ok(()),
            _ => Err(RepositoryError::PresetNotFound(name.to_string())),
        }
    }

    async fn list_presets(&self) -> Result<Vec<Preset>, RepositoryError> {
        let mut presets = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("begins_with(pk, :prefix)")
                .expression_attribute_values(":prefix", AttributeValue::S(PRESET_PREFIX.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend)?;

            for item in resp.items.unwrap_or_default() {
                presets.push(serde_json::from_str::<Preset>(body(&item)?)?);
            }
            match resp.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(presets)
    }
}

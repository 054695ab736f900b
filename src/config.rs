//! Configuration loaded from the environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix of per-provider variables: `PROVIDER_<NAME>_<KEY>`.
const PROVIDER_PREFIX: &str = "PROVIDER_";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: String },
    #[error("{var}: invalid value {value:?}")]
    Invalid { var: String, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Redis,
    DynamoDb,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            "dynamodb" => Ok(StoreKind::DynamoDb),
            _ => Err(ConfigError::Invalid {
                var: "STORE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Free-form settings handed to a provider factory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderSettings {
    pub provider: String,
    values: HashMap<String, String>,
}

impl ProviderSettings {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing {
                var: self.var_name(key),
            })
    }

    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: self.var_name(key),
                value: raw.to_string(),
            }),
        }
    }

    /// Environment variable a key is read from.
    pub fn var_name(&self, key: &str) -> String {
        format!(
            "{}{}_{}",
            PROVIDER_PREFIX,
            self.provider.to_ascii_uppercase(),
            key.to_ascii_uppercase()
        )
    }
}

/// Service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    pub store: StoreKind,
    /// Redis connection URL
    pub redis_url: String,
    /// DynamoDB table holding jobs and presets
    pub dynamodb_table: Option<String>,
    /// How long job records are kept
    pub job_retention: Duration,
    /// Upper bound on each provider or repository call
    pub call_timeout: Duration,
    providers: HashMap<String, ProviderSettings>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let var = |name: &str, default: &str| -> String {
            vars.get(name)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let store: StoreKind = var("STORE", "memory").parse()?;
        let dynamodb_table = vars.get("DYNAMODB_TABLE").cloned();
        if store == StoreKind::DynamoDb && dynamodb_table.is_none() {
            return Err(ConfigError::Missing {
                var: "DYNAMODB_TABLE".to_string(),
            });
        }

        let mut providers: HashMap<String, ProviderSettings> = HashMap::new();
        for (name, value) in &vars {
            let Some(rest) = name.strip_prefix(PROVIDER_PREFIX) else {
                continue;
            };
            let Some((provider, key)) = rest.split_once('_') else {
                continue;
            };
            if provider.is_empty() || key.is_empty() {
                continue;
            }
            let provider = provider.to_ascii_lowercase();
            let settings = providers
                .remove(&provider)
                .unwrap_or_else(|| ProviderSettings::new(provider.clone()));
            providers.insert(provider, settings.with(key, value.clone()));
        }

        Ok(Self {
            addr: var("ADDR", "127.0.0.1"),
            port: var("PORT", "3000"),
            store,
            redis_url: var("REDIS_URL", "redis://127.0.0.1/"),
            dynamodb_table,
            job_retention: Duration::from_secs(parse_var(&vars, "JOB_RETENTION_SECS", 86_400)?),
            call_timeout: Duration::from_secs(parse_var(&vars, "CALL_TIMEOUT_SECS", 30)?),
            providers,
        })
    }

    /// Settings for `provider`; empty when nothing was configured.
    pub fn provider(&self, provider: &str) -> ProviderSettings {
        self.providers
            .get(provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::new(provider))
    }
}

fn parse_var(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var: name.to_string(),
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.addr, "127.0.0.1");
        assert_eq!(config.port, "3000");
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.job_retention, Duration::from_secs(86_400));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_provider_settings_grouped_by_name() {
        let config = Config::from_vars(vars(&[
            ("PROVIDER_FFMPEG_WORK_DIR", "/tmp/maestro"),
            ("PROVIDER_FFMPEG_MAX_CONCURRENCY", "4"),
            ("PROVIDER_OTHER_TOKEN", "secret"),
        ]))
        .unwrap();

        let ffmpeg = config.provider("ffmpeg");
        assert_eq!(ffmpeg.get("work_dir"), Some("/tmp/maestro"));
        assert_eq!(ffmpeg.parse_or("max_concurrency", 2usize), Ok(4));
        assert_eq!(config.provider("other").get("token"), Some("secret"));
        assert_eq!(config.provider("missing").get("token"), None);
    }

    #[test]
    fn test_require_reports_variable_name() {
        let settings = ProviderSettings::new("ffmpeg");
        assert_eq!(
            settings.require("work_dir"),
            Err(ConfigError::Missing {
                var: "PROVIDER_FFMPEG_WORK_DIR".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_vars(vars(&[("STORE", "postgres")])).is_err());
        assert!(Config::from_vars(vars(&[("JOB_RETENTION_SECS", "soon")])).is_err());
        assert_eq!(
            Config::from_vars(vars(&[("STORE", "dynamodb")])).unwrap_err(),
            ConfigError::Missing {
                var: "DYNAMODB_TABLE".to_string()
            }
        );
    }
}

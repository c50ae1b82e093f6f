// snapshotdump/src/config/mod.rs
pub mod credentials;

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, Result};
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE_PATH: &str = "/run/secrets/config.json";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_INSTANCE_CLASS: &str = "db.t2.micro";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_OUTPUT_DIR: &str = "/out";
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
pub const DEFAULT_DUMP_RETRIES: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_AVAILABILITY_TIMEOUT_SECS: u64 = 7200;

// Structs for deserializing the config file. Keys match the environment variable names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    #[serde(rename = "AWS_REGION")]
    pub region: Option<String>,
    #[serde(rename = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,
    #[serde(rename = "AWS_SECRET_ACCESS_KEY")]
    pub secret_access_key: Option<String>,
    #[serde(rename = "DB_INSTANCE_CLASS")]
    pub instance_class: Option<String>,
    #[serde(rename = "MAX_RETRIES")]
    pub max_retries: Option<u32>,
    #[serde(rename = "DB_SUBNET_GROUP_NAME")]
    pub subnet_group: Option<String>,
    #[serde(rename = "DB_USER")]
    pub db_user: Option<String>,
    #[serde(rename = "DB_PASSWORD")]
    pub db_password: Option<String>,
    #[serde(rename = "DB_PUBLICLY_ACCESSIBLE")]
    pub publicly_accessible: Option<serde_json::Value>,
    #[serde(rename = "VPC_SECURITY_GROUP_IDS")]
    pub security_group_ids: Option<serde_json::Value>,
    #[serde(rename = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
    #[serde(rename = "RETRY_DELAY_SECS")]
    pub retry_delay_secs: Option<u64>,
    #[serde(rename = "DUMP_RETRIES")]
    pub dump_retries: Option<u32>,
    #[serde(rename = "POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,
    #[serde(rename = "AVAILABILITY_TIMEOUT_SECS")]
    pub availability_timeout_secs: Option<u64>,
    pub databases: Option<serde_json::Value>,
}

impl RawJsonConfig {
    /// Reads the config file if it exists. A missing file is an empty config.
    pub fn load_optional(config_path: &Path) -> Result<Self> {
        if !config_path.is_file() {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;
        Ok(raw)
    }
}

/// Per-database credential override. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DatabaseCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub name: String,
    pub credentials: DatabaseCredentials,
}

/// Static AWS keys. When absent the default provider chain is used.
#[derive(Debug, Clone)]
pub struct AwsKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub aws_keys: Option<AwsKeys>,
    pub instance_class: String,
    pub subnet_group: Option<String>,
    pub security_group_ids: Vec<String>,
    pub publicly_accessible: bool,
    pub max_retries: u32,
    pub db_user: String,
    pub db_password: String,
    pub databases: Vec<DatabaseEntry>,
    pub output_dir: PathBuf,
    pub retry_delay: Duration,
    pub dump_retries: u32,
    pub poll_interval: Duration,
    pub availability_timeout: Duration,
}

impl AppConfig {
    /// Loads `$CONFIG_FILE_PATH` (or the default secrets path) layered over the
    /// process environment.
    pub fn load() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let config_path = env
            .get("CONFIG_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_PATH));
        let raw = RawJsonConfig::load_optional(&config_path)?;
        Self::from_sources(raw, &env)
    }

    /// Builds the configuration: file value, then environment, then default.
    pub fn from_sources(file: RawJsonConfig, env: &HashMap<String, String>) -> Result<Self> {
        let env_str = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();

        let region = file
            .region
            .or_else(|| env_str("AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let access_key_id = file.access_key_id.or_else(|| env_str("AWS_ACCESS_KEY_ID"));
        let secret_access_key = file
            .secret_access_key
            .or_else(|| env_str("AWS_SECRET_ACCESS_KEY"));
        let aws_keys = match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key))
                if !access_key_id.is_empty() && !secret_access_key.is_empty() =>
            {
                Some(AwsKeys {
                    access_key_id,
                    secret_access_key,
                })
            }
            _ => None,
        };

        let instance_class = file
            .instance_class
            .or_else(|| env_str("DB_INSTANCE_CLASS"))
            .unwrap_or_else(|| DEFAULT_INSTANCE_CLASS.to_string());

        let subnet_group = file
            .subnet_group
            .or_else(|| env_str("DB_SUBNET_GROUP_NAME"))
            .filter(|s| !s.is_empty());

        let security_group_ids = match file.security_group_ids {
            Some(value) => parse_security_group_value(&value)?,
            None => env_str("VPC_SECURITY_GROUP_IDS")
                .map(|s| split_security_groups(&s))
                .unwrap_or_default(),
        };

        let publicly_accessible = match file.publicly_accessible {
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::String(s)) => str_to_bool(&s),
            Some(serde_json::Value::Null) | None => env_str("DB_PUBLICLY_ACCESSIBLE")
                .map(|s| str_to_bool(&s))
                .unwrap_or(false),
            Some(other) => {
                return Err(AppError::Config(format!(
                    "DB_PUBLICLY_ACCESSIBLE must be a boolean or string, got {}",
                    other
                )));
            }
        };

        let max_retries = match file.max_retries {
            Some(n) => n,
            None => env_number("MAX_RETRIES", env_str("MAX_RETRIES"))?.unwrap_or(DEFAULT_MAX_RETRIES),
        };
        let dump_retries = match file.dump_retries {
            Some(n) => n,
            None => env_number("DUMP_RETRIES", env_str("DUMP_RETRIES"))?.unwrap_or(DEFAULT_DUMP_RETRIES),
        };
        let retry_delay_secs = match file.retry_delay_secs {
            Some(n) => n,
            None => env_number("RETRY_DELAY_SECS", env_str("RETRY_DELAY_SECS"))?
                .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        };
        let poll_interval_secs = match file.poll_interval_secs {
            Some(n) => n,
            None => env_number("POLL_INTERVAL_SECS", env_str("POLL_INTERVAL_SECS"))?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        };
        if poll_interval_secs == 0 {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be greater than zero".to_string()));
        }
        let availability_timeout_secs = match file.availability_timeout_secs {
            Some(n) => n,
            None => env_number("AVAILABILITY_TIMEOUT_SECS", env_str("AVAILABILITY_TIMEOUT_SECS"))?
                .unwrap_or(DEFAULT_AVAILABILITY_TIMEOUT_SECS),
        };

        let output_dir = file
            .output_dir
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| env_str("OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(AppConfig {
            region,
            aws_keys,
            instance_class,
            subnet_group,
            security_group_ids,
            publicly_accessible,
            max_retries,
            db_user: file.db_user.or_else(|| env.get("DB_USER").cloned()).unwrap_or_default(),
            db_password: file
                .db_password
                .or_else(|| env.get("DB_PASSWORD").cloned())
                .unwrap_or_default(),
            databases: parse_database_list(&file.databases)?,
            output_dir,
            retry_delay: Duration::from_secs(retry_delay_secs),
            dump_retries,
            poll_interval: Duration::from_secs(poll_interval_secs),
            availability_timeout: Duration::from_secs(availability_timeout_secs),
        })
    }

    /// Retry policy for single administrative calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Retry policy for dump processes, which outlast the freshly restored
    /// instance's warm-up.
    pub fn dump_retry_policy(&self) -> RetryPolicy {
        self.retry_policy().with_attempts(self.dump_retries)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|db| db.name.clone()).collect()
    }
}

fn env_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be a non-negative integer, got \"{}\"", key, raw))),
        None => Ok(None),
    }
}

/// "yes", "true", "t" and "1" are true; anything else is false.
pub fn str_to_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "yes" | "true" | "t" | "1")
}

fn split_security_groups(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_security_group_value(value: &serde_json::Value) -> Result<Vec<String>> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(split_security_groups(s)),
        serde_json::Value::Array(_) => {
            let groups: Vec<String> = serde_json::from_value(value.clone()).map_err(|e| {
                AppError::Config(format!("VPC_SECURITY_GROUP_IDS must be a list of strings: {}", e))
            })?;
            Ok(groups.into_iter().filter(|s| !s.trim().is_empty()).collect())
        }
        other => Err(AppError::Config(format!(
            "VPC_SECURITY_GROUP_IDS must be a list or comma-separated string, got {}",
            other
        ))),
    }
}

/// Parses the `databases` section.
/// Accepts `["db1", "db2"]` or `{"db1": {"user": "..", "password": ".."}, "db2": null}`.
/// A null or empty section yields no entries.
fn parse_database_list(database_list: &Option<serde_json::Value>) -> Result<Vec<DatabaseEntry>> {
    match database_list {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(name) => Ok(DatabaseEntry {
                    name: name.clone(),
                    credentials: DatabaseCredentials::default(),
                }),
                other => Err(AppError::Config(format!(
                    "databases list entries must be strings, got {}",
                    other
                ))),
            })
            .collect(),
        Some(serde_json::Value::Object(mapping)) => mapping
            .iter()
            .map(|(name, value)| {
                let credentials = match value {
                    serde_json::Value::Null => DatabaseCredentials::default(),
                    serde_json::Value::Object(_) => serde_json::from_value(value.clone()).map_err(|e| {
                        AppError::Config(format!("Invalid credentials for database \"{}\": {}", name, e))
                    })?,
                    other => {
                        return Err(AppError::Config(format!(
                            "Credentials for database \"{}\" must be an object, got {}",
                            name, other
                        )));
                    }
                };
                Ok(DatabaseEntry {
                    name: name.clone(),
                    credentials,
                })
            })
            .collect(),
        Some(_) => Err(AppError::Config(
            "databases must be either an array of database names or a mapping object".to_string(),
        )),
    }
}

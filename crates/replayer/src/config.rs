//! Replayer Configuration
//!
//! Resolves the replay run from environment variables. Broker and blob
//! settings are required; pacing and column selection have defaults
//! that replay every numeric column once per half second, looping.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use event_stream::MqttPublisherConfig;

use crate::replay::ReplaySettings;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Full replayer configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Broker connection for the outgoing event stream.
    pub publisher: MqttPublisherConfig,
    /// Base URL of the blob store holding the dataset.
    pub blob_endpoint: String,
    /// Optional bearer token for the blob store.
    pub blob_token: Option<String>,
    /// Blob container holding the Parquet dataset.
    pub dataset_container: String,
    /// Path of the dataset within the container.
    pub dataset_path: String,
    /// Explicit feature column names; `None` selects by numeric dtype.
    pub feature_keys: Option<Vec<String>>,
    /// With no explicit keys, take the first N numeric columns; 0 takes
    /// them all.
    pub feature_count: usize,
    /// Column carrying per-row sensor ids.
    pub sensor_column: Option<String>,
    /// Column carrying per-row timestamps.
    pub timestamp_column: Option<String>,
    /// Pacing and payload settings.
    pub settings: ReplaySettings,
}

impl ReplayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let publisher = MqttPublisherConfig {
            broker_host: require("MQTT_BROKER_HOST")?,
            broker_port: parse_or("MQTT_BROKER_PORT", 1883u16)?,
            client_id: env::var("MQTT_CLIENT_ID").unwrap_or_else(|_| "replayer".to_string()),
            topic: require("EVENT_TOPIC")?,
        };

        let batch_size = parse_or("BATCH_SIZE", 100usize)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        let delay_sec = parse_or("DELAY_SEC", 0.5f64)?;
        // Duration::from_secs_f64 panics on negative or NaN input; the
        // negated comparison catches both.
        if !(delay_sec >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "DELAY_SEC must not be negative".to_string(),
            ));
        }
        let loop_replay = parse_flag("LOOP", true)?;

        let sensor_ids =
            parse_key_list(env::var("SENSOR_IDS").unwrap_or_else(|_| "sim-1".to_string()));
        if sensor_ids.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SENSOR_IDS must name at least one sensor".to_string(),
            ));
        }

        Ok(Self {
            publisher,
            blob_endpoint: require("BLOB_ENDPOINT")?,
            blob_token: optional("BLOB_TOKEN"),
            dataset_container: require("DATASET_CONTAINER")?,
            dataset_path: require("DATASET_PATH")?,
            feature_keys: optional("FEATURE_KEYS")
                .map(parse_key_list)
                .filter(|keys| !keys.is_empty()),
            feature_count: parse_or("FEATURE_COUNT", 0usize)?,
            sensor_column: optional("SENSOR_ID_COLUMN"),
            timestamp_column: optional("TIMESTAMP_COLUMN"),
            settings: ReplaySettings {
                batch_size,
                delay: Duration::from_secs_f64(delay_sec),
                loop_replay,
                sensor_ids,
                output_prefix: env::var("OUTPUT_FEATURE_PREFIX")
                    .unwrap_or_else(|_| "feature_".to_string()),
            },
        })
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" => Ok(true),
            "0" | "false" | "no" | "n" => Ok(false),
            other => Err(ConfigError::InvalidValue(format!(
                "{}: not a boolean: {}",
                name, other
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn parse_key_list(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

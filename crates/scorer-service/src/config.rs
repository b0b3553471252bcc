//! Service Configuration
//!
//! Resolves the full scorer configuration from environment variables at
//! startup. Connection settings for the broker, the blob store and the
//! sink are required; extraction knobs all have defaults.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use event_stream::MqttSourceConfig;
use influx_sink::InfluxConfig;
use signal_features::{
    ExtractorConfig, FrequencyBand, DEFAULT_FEATURE_COUNT, DEFAULT_SAMPLE_RATE_HZ,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Full service configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Broker connection and batching settings for the event source.
    pub source: MqttSourceConfig,
    /// Base URL of the blob store holding the model artifact.
    pub blob_endpoint: String,
    /// Optional bearer token for the blob store.
    pub blob_token: Option<String>,
    /// Blob container holding the model artifact.
    pub model_container: String,
    /// Path of the model artifact within the container.
    pub model_path: String,
    /// InfluxDB connection settings.
    pub influx: InfluxConfig,
    /// Measurement receiving anomaly scores (pass-through events).
    pub score_measurement: String,
    /// Measurement receiving DSP features (raw waveform events).
    pub feature_measurement: String,
    /// Feature extraction settings.
    pub extractor: ExtractorConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let broker_host = require("MQTT_BROKER_HOST")?;
        let broker_port = parse_or("MQTT_BROKER_PORT", 1883u16)?;
        let client_id =
            env::var("MQTT_CLIENT_ID").unwrap_or_else(|_| "anomaly-scorer".to_string());
        let topic = require("EVENT_TOPIC")?;
        let max_batch_size = parse_or("MAX_BATCH_SIZE", 100usize)?;
        if max_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        let batch_wait_ms = parse_or("BATCH_WAIT_MS", 2_000u64)?;

        let feature_keys = optional("FEATURE_KEYS")
            .map(parse_key_list)
            .filter(|keys| !keys.is_empty());
        let feature_count = parse_or("FEATURE_COUNT", DEFAULT_FEATURE_COUNT)?;
        if feature_keys.is_none() && feature_count == 0 {
            return Err(ConfigError::InvalidValue(
                "FEATURE_COUNT must be at least 1".to_string(),
            ));
        }

        let default_sample_rate_hz = parse_or("SAMPLE_RATE_HZ", DEFAULT_SAMPLE_RATE_HZ)?;
        if default_sample_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "SAMPLE_RATE_HZ must be positive".to_string(),
            ));
        }
        let band_low_hz = parse_or("BAND_LOW_HZ", 0.0f64)?;
        let band_high_hz = parse_or("BAND_HIGH_HZ", 200.0f64)?;
        if band_high_hz < band_low_hz {
            return Err(ConfigError::InvalidValue(
                "BAND_HIGH_HZ must not be below BAND_LOW_HZ".to_string(),
            ));
        }

        // Tokens pasted from a dashboard tend to carry stray whitespace,
        // which the Authorization header rejects.
        let influx = InfluxConfig {
            url: require("INFLUX_URL")?,
            org: require("INFLUX_ORG")?,
            bucket: require("INFLUX_BUCKET")?,
            token: require("INFLUX_TOKEN")?.trim().to_string(),
        };

        Ok(Self {
            source: MqttSourceConfig {
                broker_host,
                broker_port,
                client_id,
                topic,
                max_batch_size,
                batch_wait: Duration::from_millis(batch_wait_ms),
            },
            blob_endpoint: require("BLOB_ENDPOINT")?,
            blob_token: optional("BLOB_TOKEN"),
            model_container: require("MODEL_CONTAINER")?,
            model_path: require("MODEL_PATH")?,
            influx,
            score_measurement: env::var("SCORE_MEASUREMENT")
                .unwrap_or_else(|_| "anomaly_score".to_string()),
            feature_measurement: env::var("FEATURE_MEASUREMENT")
                .unwrap_or_else(|_| "signal_features".to_string()),
            extractor: ExtractorConfig {
                feature_keys,
                feature_count,
                default_sample_rate_hz,
                band: FrequencyBand {
                    low_hz: band_low_hz,
                    high_hz: band_high_hz,
                },
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

fn parse_key_list(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

//! Dual-mode Feature Extraction

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::fft::{FrequencyBand, SpectrumAnalyzer};
use crate::payload;

/// Default width of the derived pass-through key list
pub const DEFAULT_FEATURE_COUNT: usize = 32;

/// Default sample rate (Hz) for events that do not declare `fs`
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 6400.0;

/// Per-event extraction error types
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("feature vector has {got} values, model expects {expected}")]
    FeatureCount { got: usize, expected: usize },

    #[error("no usable signal: sample rate {sample_rate_hz} Hz, {samples} samples")]
    NoSignal { sample_rate_hz: f64, samples: usize },

    #[error("all computed features were non-finite")]
    NoFiniteFeatures,

    #[error("payload carries neither feature keys nor axis samples")]
    MalformedPayload,
}

/// How a vector was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Pre-computed features copied from the payload
    PassThrough,
    /// RMS and spectral features computed from raw axis samples
    Dsp,
}

/// Ordered named feature values, all finite
#[derive(Debug, Clone)]
pub struct FeatureVector {
    fields: Vec<(String, f64)>,
    mode: ExtractionMode,
}

impl FeatureVector {
    pub fn from_fields(fields: Vec<(String, f64)>, mode: ExtractionMode) -> Self {
        Self { fields, mode }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Named values in extraction order.
    pub fn fields(&self) -> &[(String, f64)] {
        &self.fields
    }

    /// Bare values in extraction order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.fields.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Extractor configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Explicit pass-through key list; `None` derives `feature_1..feature_N`
    pub feature_keys: Option<Vec<String>>,
    /// N for the derived key list
    pub feature_count: usize,
    /// Fallback sample rate for events without `fs`
    pub default_sample_rate_hz: f64,
    /// Band integrated into the `bandE_*` fields
    pub band: FrequencyBand,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            feature_keys: None,
            feature_count: DEFAULT_FEATURE_COUNT,
            default_sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            band: FrequencyBand::default(),
        }
    }
}

/// Root mean square of a sample window; `None` when the window is empty.
pub fn rms(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mean_square = samples.iter().map(|v| v * v).sum::<f64>() / samples.len() as f64;
    Some(mean_square.sqrt())
}

/// Resolve the identifier an event's output is tagged with.
///
/// Payload keys first (`device_id`, `sensor_id`, `id`); DSP events fall
/// back to a partition-derived name, pass-through events to `"unknown"`.
pub fn resolve_device_id(
    payload: &Map<String, Value>,
    mode: ExtractionMode,
    partition_id: &str,
) -> String {
    match payload::device_id(payload) {
        Some(id) => id,
        None => match mode {
            ExtractionMode::Dsp => format!("partition-{partition_id}"),
            ExtractionMode::PassThrough => "unknown".to_string(),
        },
    }
}

/// Dual-mode feature extractor.
///
/// Pass-through mode copies the configured feature keys in order,
/// substituting 0.0 for anything missing, non-numeric or non-finite.
/// DSP mode derives `rms_*`, `peak_freq_*` and `bandE_*` per present
/// axis. Mode is chosen per event by payload shape, pass-through first.
pub struct SignalFeatureExtractor {
    keys: Vec<String>,
    default_sample_rate_hz: f64,
    /// Model-declared input width; gates pass-through vectors only.
    expected_features: Option<usize>,
    analyzer: SpectrumAnalyzer,
}

impl SignalFeatureExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let keys = match &config.feature_keys {
            Some(keys) => keys.clone(),
            None => (1..=config.feature_count)
                .map(|i| format!("feature_{i}"))
                .collect(),
        };
        Self {
            keys,
            default_sample_rate_hz: config.default_sample_rate_hz,
            expected_features: None,
            analyzer: SpectrumAnalyzer::new(config.band),
        }
    }

    /// Gate pass-through vectors to the model's declared input width.
    pub fn with_expected_features(mut self, expected: Option<usize>) -> Self {
        self.expected_features = expected;
        self
    }

    /// Derive the feature vector for one decoded payload.
    pub fn extract(&mut self, payload: &Map<String, Value>) -> Result<FeatureVector, ExtractError> {
        if self.keys.iter().any(|key| payload.contains_key(key)) {
            return self.pass_through(payload);
        }
        self.dsp(payload)
    }

    fn pass_through(&self, payload: &Map<String, Value>) -> Result<FeatureVector, ExtractError> {
        let mut fields: Vec<(String, f64)> = self
            .keys
            .iter()
            .map(|key| {
                let value = payload
                    .get(key)
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0);
                (key.clone(), value)
            })
            .collect();

        if let Some(expected) = self.expected_features {
            if fields.len() < expected {
                return Err(ExtractError::FeatureCount {
                    got: fields.len(),
                    expected,
                });
            }
            if fields.len() > expected {
                warn!(
                    got = fields.len(),
                    expected, "truncating feature vector to model width"
                );
                fields.truncate(expected);
            }
        }

        Ok(FeatureVector::from_fields(
            fields,
            ExtractionMode::PassThrough,
        ))
    }

    fn dsp(&mut self, payload: &Map<String, Value>) -> Result<FeatureVector, ExtractError> {
        let axes: Vec<(&str, Vec<f64>)> = payload::AXES
            .iter()
            .filter_map(|(axis, names)| {
                payload::axis_samples(payload, names).map(|samples| (*axis, samples))
            })
            .collect();

        if axes.is_empty() {
            return Err(ExtractError::MalformedPayload);
        }

        let sample_rate_hz =
            payload::sample_rate(payload).unwrap_or(self.default_sample_rate_hz);
        let total_samples: usize = axes.iter().map(|(_, samples)| samples.len()).sum();
        if sample_rate_hz <= 0.0 || total_samples == 0 {
            return Err(ExtractError::NoSignal {
                sample_rate_hz,
                samples: total_samples,
            });
        }

        let mut fields = Vec::new();
        for (axis, samples) in &axes {
            if let Some(value) = rms(samples).filter(|v| v.is_finite()) {
                fields.push((format!("rms_{axis}"), value));
            }
            if let Some(spectrum) = self.analyzer.analyze(samples, sample_rate_hz) {
                if spectrum.peak_frequency.is_finite() {
                    fields.push((format!("peak_freq_{axis}"), spectrum.peak_frequency));
                }
                if spectrum.band_energy.is_finite() {
                    fields.push((format!("bandE_{axis}"), spectrum.band_energy));
                }
            }
        }

        if fields.is_empty() {
            return Err(ExtractError::NoFiniteFeatures);
        }

        Ok(FeatureVector::from_fields(fields, ExtractionMode::Dsp))
    }
}

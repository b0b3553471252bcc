//! Signal Feature Extraction
//!
//! Turns one decoded vibration event into an ordered, all-finite feature
//! vector. Two modes, chosen per event by payload shape:
//! - Pass-through: pre-computed feature keys copied in configured order
//! - DSP: RMS, peak frequency and band energy derived per axis from raw
//!   tri-axial sample arrays
//!
//! Pure computation; no I/O and no transport types.

pub mod extractor;
pub mod fft;
pub mod payload;

pub use extractor::{
    resolve_device_id, rms, ExtractError, ExtractionMode, ExtractorConfig, FeatureVector,
    SignalFeatureExtractor, DEFAULT_FEATURE_COUNT, DEFAULT_SAMPLE_RATE_HZ,
};
pub use fft::{FrequencyBand, SpectrumAnalyzer, SpectrumFeatures};

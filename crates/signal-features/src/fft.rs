//! FFT-based Frequency Analysis

use rustfft::{num_complex::Complex, FftPlanner};

/// Frequency band (Hz), both edges inclusive
#[derive(Debug, Clone, Copy)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl Default for FrequencyBand {
    fn default() -> Self {
        Self {
            low_hz: 0.0,
            high_hz: 200.0,
        }
    }
}

/// Spectral summary of one axis window
#[derive(Debug, Clone, Copy)]
pub struct SpectrumFeatures {
    /// Frequency (Hz) of the first strongest magnitude bin
    pub peak_frequency: f64,
    /// Sum of squared magnitudes over bins inside the band
    pub band_energy: f64,
}

/// FFT analyzer over real-valued sample windows
pub struct SpectrumAnalyzer {
    /// FFT planner, reused across windows
    planner: FftPlanner<f64>,
    /// Band integrated into the energy feature
    band: FrequencyBand,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer for the given band
    pub fn new(band: FrequencyBand) -> Self {
        Self {
            planner: FftPlanner::new(),
            band,
        }
    }

    /// Analyze one sample window.
    ///
    /// Real input: only the non-negative frequency bins `0..=n/2` are
    /// kept. Magnitudes are raw DFT outputs; no window function and no
    /// normalization. `None` for an empty window or non-positive rate.
    pub fn analyze(&mut self, signal: &[f64], sample_rate_hz: f64) -> Option<SpectrumFeatures> {
        if signal.is_empty() || sample_rate_hz <= 0.0 {
            return None;
        }

        let n = signal.len();
        let mut buffer: Vec<Complex<f64>> =
            signal.iter().map(|&v| Complex::new(v, 0.0)).collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let magnitudes: Vec<f64> = buffer.iter().take(n / 2 + 1).map(|c| c.norm()).collect();
        let freq_resolution = sample_rate_hz / n as f64;

        let mut peak_idx = 0;
        let mut peak = magnitudes[0];
        for (i, &magnitude) in magnitudes.iter().enumerate().skip(1) {
            if magnitude > peak {
                peak = magnitude;
                peak_idx = i;
            }
        }

        let mut band_energy = 0.0;
        for (i, &magnitude) in magnitudes.iter().enumerate() {
            let freq = i as f64 * freq_resolution;
            if freq >= self.band.low_hz && freq <= self.band.high_hz {
                band_energy += magnitude * magnitude;
            }
        }

        Some(SpectrumFeatures {
            peak_frequency: peak_idx as f64 * freq_resolution,
            band_energy,
        })
    }
}

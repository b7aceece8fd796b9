//! In-memory pipeline configuration.
//!
//! The core never persists configuration to disk — that is the (out of scope)
//! configuration collaborator's job. `Parameters` only holds the semantic option
//! groups the core itself observes, mirroring `original_source/Software/state.py`'s
//! `_get_default_parameters` defaults.

use std::collections::HashMap;

/// Default packet payload size, in samples (P).
pub const DEFAULT_PACKET_SAMPLES: usize = 128;
/// Default FFT length, in samples (N).
pub const DEFAULT_FFT_LENGTH: usize = 512;
/// Bytes per payload sample (32-bit float).
pub const BYTES_PER_SAMPLE: usize = 4;

/// A flat `(group, name) -> value` table for the options in SPEC_FULL.md §6.
///
/// Anything not in the table returns the caller-supplied default; anything set
/// that the core doesn't recognize is stored but otherwise ignored, matching
/// "anything else is ignored" in §6.
#[derive(Debug, Clone)]
pub struct Parameters {
    values: HashMap<(String, String), f64>,
}

impl Default for Parameters {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert(("FFT".into(), "Length".into()), DEFAULT_FFT_LENGTH as f64);
        values.insert(("FFT".into(), "Decimation_factor".into()), 100.0);
        values.insert(("FFT".into(), "Centre_frequency(MHz)".into()), 2400.0);
        values.insert(("FFT".into(), "bandwidth(MHz)".into()), 100.0);
        values.insert(("UI".into(), "spectum_left_freq(MHz)".into()), 2350.0);
        values.insert(("UI".into(), "spectum_right_freq(MHz)".into()), 2450.0);
        values.insert(("Detection".into(), "conf_threshold".into()), 0.25);
        values.insert(("Detection".into(), "iou_threshold".into()), 0.45);
        Self { values }
    }
}

impl Parameters {
    pub fn get(&self, group: &str, name: &str, default: f64) -> f64 {
        self.values
            .get(&(group.to_string(), name.to_string()))
            .copied()
            .unwrap_or(default)
    }

    pub fn set(&mut self, group: &str, name: &str, value: f64) -> Option<f64> {
        self.values
            .insert((group.to_string(), name.to_string()), value)
    }

    pub fn decimation_factor(&self) -> f64 {
        self.get("FFT", "Decimation_factor", 100.0)
    }

    /// Derived sample rate: ADC rate (5 GHz) divided by the decimation factor.
    pub fn sample_rate_hz(&self) -> f64 {
        5e9 / self.decimation_factor()
    }

    pub fn centre_frequency_mhz(&self) -> f64 {
        self.get("FFT", "Centre_frequency(MHz)", 2400.0)
    }

    pub fn bandwidth_mhz(&self) -> f64 {
        self.get("FFT", "bandwidth(MHz)", 100.0)
    }

    pub fn spectrum_left_freq_mhz(&self) -> f64 {
        self.get("UI", "spectum_left_freq(MHz)", 2350.0)
    }

    pub fn spectrum_right_freq_mhz(&self) -> f64 {
        self.get("UI", "spectum_right_freq(MHz)", 2450.0)
    }

    pub fn conf_threshold(&self) -> f64 {
        self.get("Detection", "conf_threshold", 0.25)
    }

    pub fn iou_threshold(&self) -> f64 {
        self.get("Detection", "iou_threshold", 0.45)
    }
}

/// Static pipeline configuration: endpoint and framing geometry.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub host: String,
    pub port: u16,
    /// FFT length in samples (N).
    pub fft_length: usize,
    /// Packet payload size in samples (P). N must be a positive multiple of P.
    pub packet_samples: usize,
    pub parameters: Parameters,
}

impl PipelineConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            fft_length: DEFAULT_FFT_LENGTH,
            packet_samples: DEFAULT_PACKET_SAMPLES,
            parameters: Parameters::default(),
        }
    }

    pub fn with_fft_length(mut self, fft_length: usize) -> Self {
        self.fft_length = fft_length;
        self
    }

    pub fn with_packet_samples(mut self, packet_samples: usize) -> Self {
        self.packet_samples = packet_samples;
        self
    }

    /// Frame size in bytes: N samples * 4 bytes/sample.
    pub fn frame_size_bytes(&self) -> usize {
        self.fft_length * BYTES_PER_SAMPLE
    }

    /// Packets per frame: N / P. Caller must have validated N is a multiple of P.
    pub fn packets_per_frame(&self) -> usize {
        self.fft_length / self.packet_samples
    }

    pub fn validate(&self) -> Result<(), crate::error::PipelineError> {
        if self.packet_samples == 0
            || self.fft_length == 0
            || self.fft_length % self.packet_samples != 0
        {
            return Err(crate::error::PipelineError::InvalidFftLength {
                n: self.fft_length,
                packet_size: self.packet_samples,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_implementation() {
        let params = Parameters::default();
        assert_eq!(params.get("FFT", "Length", 0.0), 512.0);
        assert_eq!(params.decimation_factor(), 100.0);
        assert_eq!(params.sample_rate_hz(), 5e9 / 100.0);
        assert_eq!(params.conf_threshold(), 0.25);
        assert_eq!(params.iou_threshold(), 0.45);
    }

    #[test]
    fn unrecognized_parameter_is_stored_but_has_no_effect() {
        let mut params = Parameters::default();
        params.set("Exotic", "Unused", 42.0);
        assert_eq!(params.get("Exotic", "Unused", 0.0), 42.0);
    }

    #[test]
    fn validate_rejects_non_multiple() {
        let cfg = PipelineConfig::new("127.0.0.1", 5000)
            .with_fft_length(500)
            .with_packet_samples(128);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_multiple() {
        let cfg = PipelineConfig::new("127.0.0.1", 5000)
            .with_fft_length(512)
            .with_packet_samples(128);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.packets_per_frame(), 4);
        assert_eq!(cfg.frame_size_bytes(), 2048);
    }
}
